use indexmap::IndexMap;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    bucket::{read_bucket, BucketSet, RecordWriter, TermRecord, DOCFREQ_FILE, DOMAIN_SUFFIX},
    error::{LangIdError, Result},
    utils::sort::top_k,
    Feature,
};

/// Number of documents each feature occurs in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocFrequency {
    #[serde(with = "indexmap::map::serde_seq")]
    doc_counts: IndexMap<Feature, u64>,
}

impl DocFrequency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` documents to `feature`
    pub fn add(&mut self, feature: &[u8], n: u64) {
        match self.doc_counts.get_mut(feature) {
            Some(count) => *count += n,
            None => {
                self.doc_counts.insert(feature.into(), n);
            }
        }
    }

    pub fn get_count(&self, feature: &[u8]) -> u64 {
        self.doc_counts.get(feature).copied().unwrap_or(0)
    }

    /// Number of distinct features
    #[inline]
    pub fn vocab_size(&self) -> usize {
        self.doc_counts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], u64)> {
        self.doc_counts.iter().map(|(f, &c)| (&**f, c))
    }

    /// Merge another tally into self
    pub fn merge(&mut self, other: DocFrequency) {
        for (feature, count) in other.doc_counts {
            *self.doc_counts.entry(feature).or_insert(0) += count;
        }
    }
}

/// Sum the `.domain` counts of every bucket into one document frequency
///
/// Each bucket is tallied by its own task, which also leaves a `docfreq`
/// file in the bucket directory. Buckets are merged in ascending order.
pub fn df_tally(pool: &rayon::ThreadPool, buckets: &BucketSet) -> Result<DocFrequency> {
    let per_bucket: Vec<DocFrequency> = pool.install(|| {
        (0..buckets.num_buckets())
            .into_par_iter()
            .map(|b| tally_bucket(buckets, b).map_err(|e| LangIdError::worker(format!("bucket {b}"), e)))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut df = DocFrequency::new();
    for part in per_bucket {
        df.merge(part);
    }
    info!("[stage] document frequency over {} features", df.vocab_size());
    Ok(df)
}

fn tally_bucket(buckets: &BucketSet, bucket: usize) -> Result<DocFrequency> {
    let (records, bytes) = read_bucket::<TermRecord>(buckets, bucket, DOMAIN_SUFFIX)?;
    let mut df = DocFrequency::new();
    for r in &records {
        df.add(&r.feature, r.count as u64);
    }
    let mut writer = RecordWriter::append(&buckets.dir(bucket).join(DOCFREQ_FILE))?;
    for (feature, count) in df.iter() {
        writer.write(&(feature, count))?;
    }
    writer.finish()?;
    debug!("bucket {bucket}: {} features from {bytes} bytes", df.vocab_size());
    Ok(df)
}

/// How the prefilter picks features from the document frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfSelection {
    /// the `n` most frequent features overall
    Global(usize),
    /// the `k` most frequent features of each length in `[min_order, max_order]`
    PerOrder { min_order: usize, max_order: usize, k: usize },
}

/// Features ranked by document frequency, ties by bytes ascending
pub fn select_df(df: &DocFrequency, selection: DfSelection) -> Vec<Feature> {
    let ranked = |pred: &dyn Fn(&[u8]) -> bool, k: usize| -> Vec<Feature> {
        let entries: Vec<(&[u8], f64)> =
            df.iter().filter(|(f, _)| pred(*f)).map(|(f, c)| (f, c as f64)).collect();
        top_k(entries, k).into_iter().map(|(f, _)| Feature::from(f)).collect()
    };
    let selected = match selection {
        DfSelection::Global(n) => ranked(&|_| true, n),
        DfSelection::PerOrder { min_order, max_order, k } => (min_order..=max_order)
            .flat_map(|order| ranked(&|f: &[u8]| f.len() == order, k))
            .collect(),
    };
    info!("[stage] selected {} features by document frequency", selected.len());
    selected
}
