use std::collections::BTreeMap;

use anyhow::Result;

/// Objects addressed by their ID, but iterated in the order they were inserted. Removing from
/// the middle doesn't shift anything.
#[derive(Clone)]
pub(crate) struct Arena<K: Ord, V> {
    by_id: BTreeMap<K, (usize, V)>,
    order: BTreeMap<usize, K>,
    next_seq: usize,
}

impl<K: Clone + std::fmt::Display + Ord, V> Arena<K, V> {
    pub fn new() -> Self {
        Self {
            by_id: BTreeMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub fn insert_new(&mut self, id: K, value: V) -> Result<()> {
        if self.by_id.contains_key(&id) {
            bail!("{} already exists", id);
        }
        self.insert_or_replace(id, value);
        Ok(())
    }

    /// A replaced value moves to the end of the iteration order.
    pub fn insert_or_replace(&mut self, id: K, value: V) {
        self.remove(&id);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, id.clone());
        self.by_id.insert(id, (seq, value));
    }

    pub fn remove(&mut self, id: &K) -> Option<V> {
        let (seq, value) = self.by_id.remove(id)?;
        self.order.remove(&seq);
        Some(value)
    }

    pub fn get(&self, id: &K) -> Option<&V> {
        self.by_id.get(id).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, id: &K) -> Option<&mut V> {
        self.by_id.get_mut(id).map(|(_, v)| v)
    }

    pub fn lookup(&self, id: &K) -> Result<&V> {
        match self.get(id) {
            Some(v) => Ok(v),
            None => bail!("{} doesn't exist", id),
        }
    }

    pub fn contains(&self, id: &K) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.order.values().filter_map(|id| self.get(id))
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order() {
        let mut arena: Arena<String, usize> = Arena::new();
        arena.insert_new("c".to_string(), 1).unwrap();
        arena.insert_new("a".to_string(), 2).unwrap();
        arena.insert_new("b".to_string(), 3).unwrap();
        assert!(arena.insert_new("a".to_string(), 4).is_err());
        assert_eq!(arena.values().cloned().collect::<Vec<_>>(), vec![1, 2, 3]);

        assert_eq!(arena.remove(&"a".to_string()), Some(2));
        assert_eq!(arena.values().cloned().collect::<Vec<_>>(), vec![1, 3]);

        arena.insert_or_replace("c".to_string(), 5);
        assert_eq!(arena.values().cloned().collect::<Vec<_>>(), vec![3, 5]);
        assert_eq!(arena.len(), 2);
        assert!(arena.lookup(&"a".to_string()).is_err());
    }
}
