//! Index-addressed list deltas.

use std::cell::RefCell;
use std::rc::Rc;

use crate::observers::{SubscriptionId, UpdateParams};

/// Receiver of list deltas.
///
/// Indices refer to positions *after* the change for add/update, and
/// *before* the change for remove.
pub trait ListObserver<T> {
    /// The list changed wholesale. Derived state must be rebuilt from `items`.
    fn on_reset(&mut self, items: &mut dyn Iterator<Item = &T>);

    fn on_add(&mut self, index: usize, item: &T);

    fn on_update(&mut self, index: usize, item: &T, params: Option<&UpdateParams>);

    fn on_remove(&mut self, index: usize, item: &T);

    /// Reserved: sorted lists never move items, their keys are immutable.
    fn on_move(&mut self, _from: usize, _to: usize, _item: &T) {}
}

/// A list that can be subscribed to.
pub trait ObservableList<T> {
    fn subscribe(&self, observer: Rc<RefCell<dyn ListObserver<T>>>) -> SubscriptionId;

    /// Returns false if `id` was not subscribed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
