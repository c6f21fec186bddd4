//! Event-backed map.
//!
//! A keyed collection whose insertions and removals fan out over
//! [`EventSource`] channels. Overwriting a key is modeled as delete-then-
//! insert: listeners see one delete emission for the displaced value followed
//! by one add emission for the new one. Deleting an absent key is a no-op and
//! emits nothing.
//!
//! All methods take `&self`; the map is interior-mutable so listeners may
//! read it (or even mutate it) re-entrantly from inside an emission. Borrows
//! are always released before a channel fires.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;

use crate::event::{EventSource, Subscription};

pub struct EventMap<K, V> {
    items: RefCell<HashMap<K, V>>,
    add_event: EventSource<(K, V)>,
    delete_event: EventSource<(K, V)>,
}

impl<K, V> Default for EventMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> EventMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            items: RefCell::new(HashMap::new()),
            add_event: EventSource::new(),
            delete_event: EventSource::new(),
        }
    }

    /// Register a handler for every future insertion (including overwrites).
    #[must_use = "dropping the subscription immediately revokes the handler"]
    pub fn on_add(&self, mut handler: impl FnMut(&K, &V) + 'static) -> Subscription {
        self.add_event.on(move |(key, value)| handler(key, value))
    }

    /// Register a handler for every future removal (including overwrites).
    #[must_use = "dropping the subscription immediately revokes the handler"]
    pub fn on_delete(&self, mut handler: impl FnMut(&K, &V) + 'static) -> Subscription {
        self.delete_event.on(move |(key, value)| handler(key, value))
    }

    /// Insert a value, displacing (and emitting a delete for) any previous
    /// value under the same key.
    pub fn set(&self, key: K, value: V) {
        self.delete(&key);

        self.items.borrow_mut().insert(key.clone(), value.clone());

        self.add_event.emit(&(key, value));
    }

    /// Remove a key if present, emitting the removed value.
    pub fn delete(&self, key: &K) {
        let removed = self.items.borrow_mut().remove(key);

        if let Some(value) = removed {
            self.delete_event.emit(&(key.clone(), value));
        }
    }

    /// Re-key an entry without emitting on either channel.
    ///
    /// Used by identity re-keying, where the value is the same live object
    /// and listeners must not observe a spurious remove/add pair. No-op if
    /// `old` is absent; an existing entry under `new` is displaced silently.
    pub fn rekey(&self, old: &K, new: K) {
        let mut items = self.items.borrow_mut();
        if let Some(value) = items.remove(old) {
            items.insert(new, value);
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.items.borrow().get(key).cloned()
    }

    pub fn has(&self, key: &K) -> bool {
        self.items.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Snapshot of current keys.
    pub fn keys(&self) -> Vec<K> {
        self.items.borrow().keys().cloned().collect()
    }

    /// Snapshot of current values.
    pub fn values(&self) -> Vec<V> {
        self.items.borrow().values().cloned().collect()
    }

    /// Snapshot of current entries.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.items
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn populate(map: &EventMap<i64, Option<&'static str>>) {
        map.set(0, Some("wyvern"));
        map.set(1, Some("amphitheater"));
        map.delete(&1);
        map.set(1, Some("amphithere"));
        map.set(2, Some("zmei"));
        map.set(2, Some("dragon"));
        map.set(2, Some("knucker"));
        map.set(5, None);
    }

    #[test]
    fn has_returns_true_for_present_keys() {
        let map = EventMap::new();
        populate(&map);

        assert!(map.has(&0));
        assert!(map.has(&1));
        assert!(map.has(&2));
        assert!(map.has(&5));
    }

    #[test]
    fn has_returns_false_for_absent_keys() {
        let map = EventMap::new();
        populate(&map);

        assert!(!map.has(&3));
        assert!(!map.has(&-1));
        assert!(!map.has(&7));
    }

    #[test]
    fn get_returns_latest_value() {
        let map = EventMap::new();
        populate(&map);

        assert_eq!(map.get(&0), Some(Some("wyvern")));
        assert_eq!(map.get(&1), Some(Some("amphithere")));
        assert_eq!(map.get(&2), Some(Some("knucker")));
        assert_eq!(map.get(&5), Some(None));
        assert_eq!(map.get(&3), None);
        assert_eq!(map.entries().len(), 4);
    }

    #[test]
    fn on_add_emits_for_every_set() {
        let map = EventMap::new();
        let items = Rc::new(RefCell::new(Vec::new()));

        let items_clone = Rc::clone(&items);
        map.on_add(move |key, value| items_clone.borrow_mut().push((*key, *value)))
            .forget();
        populate(&map);

        assert_eq!(
            *items.borrow(),
            vec![
                (0, Some("wyvern")),
                (1, Some("amphitheater")),
                (1, Some("amphithere")),
                (2, Some("zmei")),
                (2, Some("dragon")),
                (2, Some("knucker")),
                (5, None),
            ]
        );
    }

    #[test]
    fn on_delete_emits_for_removals_and_overwrites() {
        let map = EventMap::new();
        let items = Rc::new(RefCell::new(Vec::new()));

        let items_clone = Rc::clone(&items);
        map.on_delete(move |key, value| items_clone.borrow_mut().push((*key, *value)))
            .forget();
        populate(&map);

        assert_eq!(
            *items.borrow(),
            vec![
                (1, Some("amphitheater")),
                (2, Some("zmei")),
                (2, Some("dragon")),
            ]
        );
    }

    #[test]
    fn delete_of_absent_key_emits_nothing() {
        let map: EventMap<i64, Option<&'static str>> = EventMap::new();
        let deletions = Rc::new(RefCell::new(0));

        let deletions_clone = Rc::clone(&deletions);
        map.on_delete(move |_, _| *deletions_clone.borrow_mut() += 1)
            .forget();

        map.delete(&42);
        assert_eq!(*deletions.borrow(), 0);
    }

    #[test]
    fn rekey_moves_entry_without_emitting() {
        let map = EventMap::new();
        let emissions = Rc::new(RefCell::new(0));

        map.set(1, Some("wyrm"));

        let add_count = Rc::clone(&emissions);
        map.on_add(move |_, _| *add_count.borrow_mut() += 1).forget();
        let del_count = Rc::clone(&emissions);
        map.on_delete(move |_, _| *del_count.borrow_mut() += 1)
            .forget();

        map.rekey(&1, 9);

        assert_eq!(*emissions.borrow(), 0);
        assert!(!map.has(&1));
        assert_eq!(map.get(&9), Some(Some("wyrm")));
    }
}
