//! Subscriber bookkeeping shared by every observable collection.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

/// Handle returned by `subscribe`, passed back to `unsubscribe`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Whether a collection currently has anyone listening.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    Inactive,
    Active,
}

/// Result of adding or removing a subscriber.
///
/// `Activated` is returned exactly once per Inactive→Active edge and
/// `Deactivated` once per Active→Inactive edge, so callers can hang setup and
/// teardown off these without tracking counts themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Activated,
    Deactivated,
    Unchanged,
}

/// Hint attached to an update delta describing what changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateParams {
    /// A single named field of the item changed.
    Field(&'static str),
    /// Free-form change description.
    Other(String),
}

impl UpdateParams {
    pub fn field(&self) -> Option<&'static str> {
        match self {
            UpdateParams::Field(name) => Some(name),
            UpdateParams::Other(_) => None,
        }
    }
}

impl fmt::Display for UpdateParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateParams::Field(name) => write!(f, "field:{name}"),
            UpdateParams::Other(desc) => f.write_str(desc),
        }
    }
}

/// Ordered set of observers plus the activation state machine.
pub struct Observers<O: ?Sized> {
    next_id: u64,
    state: Activation,
    observers: Vec<(SubscriptionId, Rc<RefCell<O>>)>,
}

impl<O: ?Sized> Default for Observers<O> {
    fn default() -> Self {
        Self {
            next_id: 0,
            state: Activation::Inactive,
            observers: Vec::new(),
        }
    }
}

impl<O: ?Sized> Observers<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Rc<RefCell<O>>) -> (SubscriptionId, Transition) {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        let transition = match self.state {
            Activation::Inactive => {
                self.state = Activation::Active;
                trace!(subscription = id.0, "observable activated");
                Transition::Activated
            }
            Activation::Active => Transition::Unchanged,
        };
        (id, transition)
    }

    /// Remove a subscriber. `None` if the id was unknown (already removed).
    pub fn remove(&mut self, id: SubscriptionId) -> Option<Transition> {
        let pos = self.observers.iter().position(|(sid, _)| *sid == id)?;
        self.observers.remove(pos);
        if self.observers.is_empty() && self.state == Activation::Active {
            self.state = Activation::Inactive;
            trace!(subscription = id.0, "observable deactivated");
            Some(Transition::Deactivated)
        } else {
            Some(Transition::Unchanged)
        }
    }

    pub fn state(&self) -> Activation {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == Activation::Active
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver to every observer in subscription order.
    pub fn for_each(&self, mut deliver: impl FnMut(&mut O)) {
        for (id, observer) in &self.observers {
            match observer.try_borrow_mut() {
                Ok(mut observer) => deliver(&mut *observer),
                Err(_) => warn!(subscription = id.0, "skipping re-entrant delta delivery"),
            }
        }
    }
}
