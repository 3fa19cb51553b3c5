//! Delta recorders for tests.
//!
//! Subscribe a recorder, poke the collection, then `take()` what it saw.

use std::cell::RefCell;
use std::rc::Rc;

use crate::list::ListObserver;
use crate::map::MapObserver;
use crate::observers::UpdateParams;

#[derive(Clone, Debug, PartialEq)]
pub enum ListEvent<T> {
    Reset(Vec<T>),
    Add(usize, T),
    Update(usize, T, Option<UpdateParams>),
    Remove(usize, T),
    Move(usize, usize, T),
}

#[derive(Debug)]
pub struct ListRecorder<T> {
    events: Vec<ListEvent<T>>,
}

impl<T: Clone> ListRecorder<T> {
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self { events: Vec::new() }))
    }

    pub fn take(&mut self) -> Vec<ListEvent<T>> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[ListEvent<T>] {
        &self.events
    }
}

impl<T: Clone> ListObserver<T> for ListRecorder<T> {
    fn on_reset(&mut self, items: &mut dyn Iterator<Item = &T>) {
        self.events.push(ListEvent::Reset(items.cloned().collect()));
    }

    fn on_add(&mut self, index: usize, item: &T) {
        self.events.push(ListEvent::Add(index, item.clone()));
    }

    fn on_update(&mut self, index: usize, item: &T, params: Option<&UpdateParams>) {
        self.events
            .push(ListEvent::Update(index, item.clone(), params.cloned()));
    }

    fn on_remove(&mut self, index: usize, item: &T) {
        self.events.push(ListEvent::Remove(index, item.clone()));
    }

    fn on_move(&mut self, from: usize, to: usize, item: &T) {
        self.events.push(ListEvent::Move(from, to, item.clone()));
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MapEvent<K, V> {
    Reset,
    Add(K, V),
    Update(K, V, Option<UpdateParams>),
    Remove(K, V),
}

#[derive(Debug)]
pub struct MapRecorder<K, V> {
    events: Vec<MapEvent<K, V>>,
}

impl<K: Clone, V: Clone> MapRecorder<K, V> {
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self { events: Vec::new() }))
    }

    pub fn take(&mut self) -> Vec<MapEvent<K, V>> {
        std::mem::take(&mut self.events)
    }
}

impl<K: Clone, V: Clone> MapObserver<K, V> for MapRecorder<K, V> {
    fn on_reset(&mut self) {
        self.events.push(MapEvent::Reset);
    }

    fn on_add(&mut self, key: &K, value: &V) {
        self.events.push(MapEvent::Add(key.clone(), value.clone()));
    }

    fn on_update(&mut self, key: &K, value: &V, params: Option<&UpdateParams>) {
        self.events
            .push(MapEvent::Update(key.clone(), value.clone(), params.cloned()));
    }

    fn on_remove(&mut self, key: &K, value: &V) {
        self.events.push(MapEvent::Remove(key.clone(), value.clone()));
    }
}
