use std::collections::HashMap;

use super::Handle;

/// Append-only store with an optional name index. Items are never removed
/// individually; `drain` empties the whole cache at teardown.
pub struct AssetCache<T> {
    items: Vec<T>,
    names: HashMap<String, Handle<T>>,
}

impl<T> AssetCache<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            names: HashMap::new(),
        }
    }

    pub fn insert(&mut self, item: T) -> Handle<T> {
        let index = self.items.len();
        self.items.push(item);
        Handle::new(index)
    }

    /// Inserts under `name`. A second insert with the same name replaces the
    /// name mapping; the earlier item stays alive until `drain`.
    pub fn insert_named(&mut self, name: impl Into<String>, item: T) -> Handle<T> {
        let handle = self.insert(item);
        if let Some(previous) = self.names.insert(name.into(), handle) {
            log::warn!(
                "Asset name reused; {:?} is now shadowed by {:?}",
                previous,
                handle
            );
        }
        handle
    }

    pub fn handle(&self, name: &str) -> Option<Handle<T>> {
        self.names.get(name).copied()
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.index())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.items.get_mut(handle.index())
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.handle(name).and_then(|handle| self.get(handle))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Removes every item, invalidating all handles handed out so far.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.names.clear();
        self.items.drain(..)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for AssetCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_lookup_returns_inserted_item() {
        let mut cache = AssetCache::new();
        let anon = cache.insert(1);
        let named = cache.insert_named("two", 2);
        assert_ne!(anon, named);
        assert_eq!(cache.handle("two"), Some(named));
        assert_eq!(cache.get_by_name("two"), Some(&2));
        assert_eq!(cache.get_by_name("missing"), None);
    }

    #[test]
    fn drain_empties_items_and_names() {
        let mut cache = AssetCache::new();
        cache.insert_named("a", 'a');
        cache.insert_named("b", 'b');
        let drained: Vec<char> = cache.drain().collect();
        assert_eq!(drained, vec!['a', 'b']);
        assert!(cache.is_empty());
        assert_eq!(cache.handle("a"), None);
    }
}
