//! Observable collections for weft.
//!
//! Single-threaded containers that tell their subscribers exactly what
//! changed: an index-addressed add/update/remove/move, or a reset that means
//! "throw away what you derived and re-read". Derived collections (the tile
//! list, a room list view) are built by subscribing to one of these and
//! republishing their own deltas.
//!
//! Observers are held as `Rc<RefCell<dyn …Observer>>`. Delivery is synchronous
//! and in subscription order. An observer must not call back into the
//! collection that is notifying it; such a re-entrant delivery is skipped
//! with a warning rather than panicking.
//!
//! Work that only matters while someone is watching hangs off the
//! [`Activation`] transitions returned by [`Observers`].

mod map;
mod observers;
mod list;
mod sorted_array;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use list::{ListObserver, ObservableList};
pub use map::{MapObserver, ObservableMap};
pub use observers::{Activation, Observers, SubscriptionId, Transition, UpdateParams};
pub use sorted_array::SortedArray;
