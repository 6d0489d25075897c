mod postgrest;

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use breedscan_contracts::breeds::{Breed, BreedCatalog, BreedType};
use breedscan_contracts::recognition::HistoryRecord;
use breedscan_contracts::RecognitionError;

pub use postgrest::RestStore;

/// Which breed rows to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreedQuery {
    pub breed_type: Option<BreedType>,
    pub order_by_name: bool,
}

impl BreedQuery {
    /// Every row, store order.
    pub fn all() -> Self {
        Self::default()
    }

    /// Every row of `breed_type` (or all rows), sorted by name.
    pub fn listing(breed_type: Option<BreedType>) -> Self {
        Self {
            breed_type,
            order_by_name: true,
        }
    }
}

/// Remote (or in-memory) home of the breed catalog and recognition history.
pub trait BreedStore: Send + Sync {
    fn name(&self) -> &str;

    /// Read failures surface as `CatalogUnavailable`.
    fn fetch_breeds(&self, query: BreedQuery) -> Result<Vec<Breed>, RecognitionError>;

    fn insert_history(&self, record: &HistoryRecord) -> Result<()>;

    /// Newest rows first.
    fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRecord>>;
}

/// Store held entirely in memory, optionally seeded from a JSON file holding
/// an array of breed rows.
#[derive(Debug, Default)]
pub struct MemoryStore {
    catalog: BreedCatalog,
    history: Mutex<Vec<HistoryRecord>>,
}

impl MemoryStore {
    pub fn new(breeds: Vec<Breed>) -> Self {
        Self {
            catalog: BreedCatalog::new(breeds),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let breeds: Vec<Breed> = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON array of breeds", path.display()))?;
        Ok(Self::new(breeds))
    }

    pub fn history(&self) -> Vec<HistoryRecord> {
        self.history
            .lock()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }
}

impl BreedStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch_breeds(&self, query: BreedQuery) -> Result<Vec<Breed>, RecognitionError> {
        let mut breeds = BreedCatalog::new(self.catalog.filtered(query.breed_type));
        if query.order_by_name {
            breeds.sort_by_name();
        }
        Ok(breeds.into_vec())
    }

    fn insert_history(&self, record: &HistoryRecord) -> Result<()> {
        let mut rows = self
            .history
            .lock()
            .map_err(|_| anyhow::anyhow!("history lock poisoned"))?;
        let mut stored = record.clone();
        stored.id = Some(format!("memory-{}", rows.len() + 1));
        stored
            .recognition_date
            .get_or_insert_with(|| chrono::Utc::now().to_rfc3339());
        rows.push(stored);
        Ok(())
    }

    fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let rows = self
            .history
            .lock()
            .map_err(|_| anyhow::anyhow!("history lock poisoned"))?;
        Ok(rows.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use breedscan_contracts::breeds::{Breed, BreedType};
    use breedscan_contracts::recognition::{HistoryMetadata, HistoryRecord};

    use super::{BreedQuery, BreedStore, MemoryStore};

    fn store() -> MemoryStore {
        MemoryStore::new(vec![
            Breed::new("1", "Sahiwal", BreedType::Cattle),
            Breed::new("2", "Murrah", BreedType::Buffalo),
            Breed::new("3", "Gir", BreedType::Cattle),
        ])
    }

    #[test]
    fn listing_filters_and_orders_by_name() -> anyhow::Result<()> {
        let store = store();
        let cattle = store.fetch_breeds(BreedQuery::listing(Some(BreedType::Cattle)))?;
        assert_eq!(
            cattle.iter().map(|b| b.name.as_str()).collect::<Vec<_>>(),
            vec!["Gir", "Sahiwal"]
        );
        let all = store.fetch_breeds(BreedQuery::all())?;
        assert_eq!(
            all.iter().map(|b| b.name.as_str()).collect::<Vec<_>>(),
            vec!["Sahiwal", "Murrah", "Gir"]
        );
        Ok(())
    }

    #[test]
    fn history_is_returned_newest_first() -> anyhow::Result<()> {
        let store = store();
        for (breed, confidence) in [("1", 40.0), ("2", 60.0), ("3", 80.0)] {
            store.insert_history(&HistoryRecord::new(
                breed,
                confidence,
                "data:image/jpeg;base64,AAAA",
                HistoryMetadata::default(),
            ))?;
        }
        let recent = store.recent_history(2)?;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].breed_id.as_deref(), Some("3"));
        assert_eq!(recent[0].id.as_deref(), Some("memory-3"));
        assert!(recent[0].recognition_date.is_some());
        assert_eq!(store.history().len(), 3);
        Ok(())
    }

    #[test]
    fn json_file_seeds_catalog() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("breeds.json");
        fs::write(
            &path,
            r#"[{"id":"a","name":"Ongole","type":"cattle","primary_use":"draft"},
                {"id":"b","name":"Jaffarabadi","type":"buffalo"}]"#,
        )?;
        let store = MemoryStore::from_json_file(&path)?;
        assert_eq!(store.fetch_breeds(BreedQuery::listing(None))?.len(), 2);

        fs::write(&path, "{\"not\": \"a list\"}")?;
        assert!(MemoryStore::from_json_file(&path).is_err());
        Ok(())
    }
}
