//! A list kept sorted by a comparator, with set-semantics on equal rank.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::list::{ListObserver, ObservableList};
use crate::observers::{Observers, SubscriptionId, UpdateParams};

type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering>;

/// Sorted observable list.
///
/// Items that compare `Equal` occupy the same slot: [`set`](Self::set)
/// replaces in place and emits an update instead of inserting a duplicate.
pub struct SortedArray<T> {
    items: Vec<T>,
    comparator: Comparator<T>,
    observers: RefCell<Observers<dyn ListObserver<T>>>,
}

impl<T> SortedArray<T> {
    pub fn new(comparator: impl Fn(&T, &T) -> Ordering + 'static) -> Self {
        Self {
            items: Vec::new(),
            comparator: Box::new(comparator),
            observers: RefCell::new(Observers::new()),
        }
    }

    /// Insert `item`, or replace the item of equal rank.
    ///
    /// Returns the index the item ended up at.
    pub fn set(&mut self, item: T, params: Option<UpdateParams>) -> usize {
        let comparator = &self.comparator;
        let index = self
            .items
            .partition_point(|existing| comparator(existing, &item) == Ordering::Less);
        let replaces = self
            .items
            .get(index)
            .is_some_and(|existing| comparator(existing, &item) == Ordering::Equal);

        if replaces {
            self.items[index] = item;
            let item = &self.items[index];
            trace!(index, "sorted array update");
            self.observers
                .borrow()
                .for_each(|o| o.on_update(index, item, params.as_ref()));
        } else {
            self.items.insert(index, item);
            let item = &self.items[index];
            trace!(index, "sorted array add");
            self.observers.borrow().for_each(|o| o.on_add(index, item));
        }
        index
    }

    /// Insert a run of items. Each one goes through [`set`](Self::set), so
    /// the caller doesn't have to guarantee they're sorted, only that
    /// listeners tolerate one delta per item.
    pub fn set_many_sorted(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.set(item, None);
        }
    }

    /// Replace the whole contents and emit a single reset. Of several
    /// equal-ranked items the last one wins, as with [`set`](Self::set).
    pub fn replace_all(&mut self, items: impl IntoIterator<Item = T>) {
        let mut items: Vec<T> = items.into_iter().collect();
        let comparator = &self.comparator;
        // stable sort after reversing puts the latest of each rank first
        items.reverse();
        items.sort_by(|a, b| comparator(a, b));
        items.dedup_by(|a, b| comparator(a, b) == Ordering::Equal);
        self.items = items;
        trace!(len = self.items.len(), "sorted array reset");
        let all = &self.items;
        self.observers
            .borrow()
            .for_each(|o| o.on_reset(&mut all.iter()));
    }

    /// Removal is not supported on a sorted array.
    ///
    /// # Panics
    ///
    /// Always. Callers that need removal must use a different collection.
    pub fn remove(&mut self, _item: &T) -> ! {
        unimplemented!("SortedArray does not support removal")
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// First item (in sort order) matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        self.items.iter().find(|item| predicate(item))
    }

    /// Index of the item of equal rank to `target`, if present.
    pub fn index_of(&self, target: &T) -> Option<usize> {
        self.items
            .binary_search_by(|existing| (self.comparator)(existing, target))
            .ok()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> ObservableList<T> for SortedArray<T> {
    fn subscribe(&self, observer: Rc<RefCell<dyn ListObserver<T>>>) -> SubscriptionId {
        let (id, _) = self.observers.borrow_mut().add(observer);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.borrow_mut().remove(id).is_some()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl<'a, T> IntoIterator for &'a SortedArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for SortedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortedArray")
            .field("items", &self.items)
            .field("observers", &self.observers.borrow().len())
            .finish()
    }
}
