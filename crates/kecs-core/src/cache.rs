use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

/// Per-cluster state owned by a single engine or runtime instance.
///
/// Keys are ECS cluster names. Values are whatever the owner needs to remember about a
/// cluster between calls: a client handle, a set of provisioned namespaces, recorded pods.
pub struct ClusterTable<T> {
    inner: RwLock<HashMap<String, T>>,
}

impl<T> ClusterTable<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, cluster: impl Into<String>, value: T) -> Option<T> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.insert(cluster.into(), value)
    }

    pub fn remove(&self, cluster: &str) -> Option<T> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.remove(cluster)
    }

    pub fn contains(&self, cluster: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.contains_key(cluster)
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` against the entry for `cluster`, creating it with `T::default()` first.
    pub fn with_entry<R>(&self, cluster: &str, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Default,
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = inner.entry(cluster.to_string()).or_default();
        f(entry)
    }

    /// Runs `f` against the entry for `cluster` if it exists.
    pub fn with_existing<R>(&self, cluster: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(cluster).map(f)
    }
}

impl<T: Clone> ClusterTable<T> {
    pub fn get(&self, cluster: &str) -> Option<T> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(cluster).cloned()
    }
}

impl<T> Default for ClusterTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn entries_are_isolated_per_cluster() {
        let table: ClusterTable<BTreeSet<String>> = ClusterTable::new();

        table.with_entry("a", |set| set.insert("ns-a".to_string()));
        table.with_entry("b", |set| set.insert("ns-b".to_string()));
        table.with_entry("a", |set| set.insert("ns-a2".to_string()));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("a").unwrap().len(), 2);
        assert_eq!(table.get("b").unwrap().len(), 1);
        assert!(table.get("c").is_none());
    }

    #[test]
    fn insert_replace_and_remove() {
        let table = ClusterTable::new();
        assert!(table.insert("prod", 1).is_none());
        assert_eq!(table.insert("prod", 2), Some(1));
        assert!(table.contains("prod"));

        assert_eq!(table.with_existing("prod", |v| *v * 10), Some(20));
        assert_eq!(table.remove("prod"), Some(2));
        assert!(table.is_empty());
        assert_eq!(table.with_existing("prod", |v| *v), None);
    }
}
