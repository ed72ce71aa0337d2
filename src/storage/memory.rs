use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ObservationStore, StoreError, StoreResult};
use crate::model::Observation;

#[derive(Debug)]
struct Table {
    // keyed by id; iteration order carries no meaning
    rows: HashMap<i64, Observation>,
    next_id: i64,
}

/// In-memory store. One lock guards the map and the id counter together and
/// is held for the whole of each operation.
#[derive(Debug)]
pub struct MemoryStore {
    table: Mutex<Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table { rows: HashMap::new(), next_id: 1 }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn add(&self, ob: Observation) -> StoreResult<i64> {
        let mut table = self.table.lock().await;
        let id = table.next_id;
        table.next_id += 1;
        table.rows.insert(id, ob.with_id(id));
        Ok(id)
    }

    async fn get(&self, id: i64) -> StoreResult<Observation> {
        let table = self.table.lock().await;
        table.rows.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, ob: Observation) -> StoreResult<()> {
        let mut table = self.table.lock().await;
        match table.rows.get_mut(&ob.id) {
            Some(slot) => {
                *slot = ob;
                Ok(())
            }
            None => Err(StoreError::NotFound(ob.id)),
        }
    }

    async fn delete(&self, id: i64) -> StoreResult<Observation> {
        let mut table = self.table.lock().await;
        table.rows.remove(&id).ok_or(StoreError::NotFound(id))
    }

    async fn list(&self) -> StoreResult<Vec<Observation>> {
        let table = self.table.lock().await;
        let mut out: Vec<Observation> = table.rows.values().cloned().collect();
        out.sort_unstable_by_key(|ob| ob.id);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Location, Wind};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn sample(city: &str, temperature: f64) -> Observation {
        Observation {
            location: Location {
                city: city.to_string(),
                country: "Finland".to_string(),
                ..Location::default()
            },
            temperature,
            humidity: 60.0,
            pressure: 1020.0,
            wind: Wind { speed: 4.0, direction: 90.0 },
            weather_status: "Snowy".to_string(),
            ..Observation::default()
        }
    }

    #[tokio::test]
    async fn add_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let mut last = 0;
        for i in 0..10 {
            let id = store.add(sample("Helsinki", i as f64)).await.unwrap();
            assert!(id > last);
            last = id;
        }
        assert_eq!(last, 10);
    }

    #[tokio::test]
    async fn add_ignores_caller_id() {
        let store = MemoryStore::new();
        let id = store.add(sample("Oulu", 1.0).with_id(42)).await.unwrap();
        assert_eq!(id, 1);
        assert!(store.get(42).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn add_then_get_returns_same_record() {
        let store = MemoryStore::new();
        let ob = sample("Helsinki", -5.0);
        let id = store.add(ob.clone()).await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), ob.with_id(id));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get(1234).await.unwrap_err();
        assert_eq!(err.not_found_id(), Some(1234));
    }

    #[tokio::test]
    async fn update_replaces_whole_record() {
        let store = MemoryStore::new();
        let id = store.add(sample("Helsinki", -5.0)).await.unwrap();

        let replacement = Observation { temperature: -10.0, ..Observation::default() }.with_id(id);
        store.update(replacement.clone()).await.unwrap();

        let stored = store.get(id).await.unwrap();
        assert_eq!(stored, replacement);
        assert!(stored.location.city.is_empty());
        assert_eq!(stored.wind, Wind::default());
    }

    #[tokio::test]
    async fn update_missing_leaves_others_untouched() {
        let store = MemoryStore::new();
        let id = store.add(sample("Helsinki", -5.0)).await.unwrap();
        let before = store.list().await.unwrap();

        let err = store.update(sample("Nowhere", 0.0).with_id(10)).await.unwrap_err();
        assert_eq!(err.not_found_id(), Some(10));
        assert_eq!(store.list().await.unwrap(), before);
        assert_eq!(store.get(id).await.unwrap().location.city, "Helsinki");
    }

    #[tokio::test]
    async fn delete_returns_value_and_id_is_not_reused() {
        let store = MemoryStore::new();
        let ob = sample("Singapore", 28.0);
        let id = store.add(ob.clone()).await.unwrap();

        assert_eq!(store.delete(id).await.unwrap(), ob.with_id(id));
        assert!(store.get(id).await.unwrap_err().is_not_found());
        assert!(store.delete(id).await.unwrap_err().is_not_found());

        let next = store.add(sample("Singapore", 29.0)).await.unwrap();
        assert!(next > id);
    }

    #[tokio::test]
    async fn list_is_sorted_and_stable() {
        let store = MemoryStore::new();
        assert!(store.list().await.unwrap().is_empty());

        for i in 0..20 {
            store.add(sample("Paris", i as f64)).await.unwrap();
        }
        store.delete(3).await.unwrap();
        store.delete(17).await.unwrap();

        let first = store.list().await.unwrap();
        let second = store.list().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 18);
        assert!(first.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_get_distinct_ids() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.add(sample("Berlin", i as f64)).await }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().unwrap());
        }
        assert_eq!(ids.len(), 64);

        let listed: HashSet<i64> = store.list().await.unwrap().iter().map(|ob| ob.id).collect();
        assert_eq!(listed, ids);
    }
}
