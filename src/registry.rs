use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult, HandleKind};

/// Maps opaque handles to live objects of one kind.
///
/// Handles are random UUIDv4 strings and are never reused: once removed a
/// handle fails with `HandleNotFound` forever.
pub struct HandleRegistry<T> {
    kind: HandleKind,
    entries: DashMap<String, Arc<T>>,
}

impl<T> HandleRegistry<T> {
    pub fn new(kind: HandleKind) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
        }
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Register an object and return its new handle
    pub fn put(&self, value: T) -> String {
        self.put_arc(Arc::new(value))
    }

    pub fn put_arc(&self, value: Arc<T>) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            // never overwrite a live handle
            if let Entry::Vacant(slot) = self.entries.entry(id.clone()) {
                slot.insert(value);
                return id;
            }
        }
    }

    pub fn get(&self, id: &str) -> GatewayResult<Arc<T>> {
        self.entries
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GatewayError::not_found(self.kind, id))
    }

    pub fn remove(&self, id: &str) -> GatewayResult<Arc<T>> {
        self.entries
            .remove(id)
            .map(|(_, value)| value)
            .ok_or_else(|| GatewayError::not_found(self.kind, id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_put_get_remove() {
        let registry = HandleRegistry::new(HandleKind::Statement);
        let id = registry.put("select 1".to_string());

        assert_eq!(registry.get(&id).unwrap().as_str(), "select 1");
        assert_eq!(registry.len(), 1);

        let removed = registry.remove(&id).unwrap();
        assert_eq!(removed.as_str(), "select 1");

        assert!(matches!(
            registry.get(&id),
            Err(GatewayError::HandleNotFound {
                kind: HandleKind::Statement,
                ..
            })
        ));
        assert!(registry.remove(&id).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_handle() {
        let registry: HandleRegistry<u32> = HandleRegistry::new(HandleKind::ResultSet);
        assert!(registry.get("").is_err());
        assert!(registry.get("not-a-uuid").is_err());
        assert!(!registry.contains("not-a-uuid"));
    }

    #[test]
    fn test_handles_are_unique() {
        let registry = HandleRegistry::new(HandleKind::Connection);
        let mut seen = HashSet::new();
        for i in 0..100_000u32 {
            assert!(seen.insert(registry.put(i)));
        }
        assert_eq!(registry.len(), 100_000);
    }

    #[test]
    fn test_concurrent_access() {
        let registry = Arc::new(HandleRegistry::new(HandleKind::Statement));
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..1_000u32 {
                        let id = registry.put(t * 10_000 + i);
                        assert_eq!(*registry.get(&id).unwrap(), t * 10_000 + i);
                        if i % 2 == 0 {
                            registry.remove(&id).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 8 * 500);
    }
}
