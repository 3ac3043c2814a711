use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, LangIdError, Result};

/// Bijection between label names and dense ids, with an instance count per id
///
/// Ids are assigned in first-seen order and iterating `0..len()` reproduces
/// that order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelIndex {
    #[serde(with = "indexmap::map::serde_seq")]
    labels: IndexMap<String, u64>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `name`, inserting it with a zero count when unseen
    pub fn id_or_insert(&mut self, name: &str) -> u32 {
        match self.labels.get_index_of(name) {
            Some(idx) => idx as u32,
            None => self.labels.insert_full(name.to_string(), 0).0 as u32,
        }
    }

    pub fn add_count(&mut self, id: u32, n: u64) {
        if let Some((_, count)) = self.labels.get_index_mut(id as usize) {
            *count += n;
        }
    }

    pub fn id(&self, name: &str) -> Option<u32> {
        self.labels.get_index_of(name).map(|i| i as u32)
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.labels.get_index(id as usize).map(|(k, _)| k.as_str())
    }

    pub fn count(&self, id: u32) -> u64 {
        self.labels.get_index(id as usize).map_or(0, |(_, &c)| c)
    }

    /// Instance count per id, the class distribution used by IG
    pub fn counts(&self) -> Vec<u64> {
        self.labels.values().copied().collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `name,count` rows in id order
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
        for (name, count) in &self.labels {
            writer.write_record([name.as_str(), count.to_string().as_str()])?;
        }
        writer.flush().at(path)
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().has_headers(false).from_path(path)?;
        let mut index = Self::new();
        for record in reader.records() {
            let record = record?;
            let (name, count) = match (record.get(0), record.get(1)) {
                (Some(name), Some(count)) => (name, count),
                _ => return Err(LangIdError::corrupt(format!("short row in {}", path.display()))),
            };
            let count = count
                .parse::<u64>()
                .map_err(|e| LangIdError::corrupt(format!("bad count {count:?}: {e}")))?;
            let id = index.id_or_insert(name);
            index.add_count(id, count);
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_insertion_order() {
        let mut index = LabelIndex::new();
        assert_eq!(index.id_or_insert("en"), 0);
        assert_eq!(index.id_or_insert("de"), 1);
        assert_eq!(index.id_or_insert("en"), 0);
        index.add_count(0, 2);
        index.add_count(1, 1);
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["en", "de"]);
        assert_eq!(index.counts(), vec![2, 1]);
        assert_eq!(index.name(1), Some("de"));
        assert_eq!(index.id("fr"), None);
    }

    #[test]
    fn csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lang_index");
        let mut index = LabelIndex::new();
        for (name, n) in [("en", 3), ("zh,tw", 1)] {
            let id = index.id_or_insert(name);
            index.add_count(id, n);
        }
        index.write_csv(&path).unwrap();
        assert_eq!(LabelIndex::read_csv(&path).unwrap(), index);
    }
}
