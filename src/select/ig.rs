use std::collections::HashSet;

use indexmap::IndexMap;
use log::{debug, info};
use rayon::prelude::*;

use crate::{
    bucket::{read_bucket, BucketSet, TermRecord},
    error::{LangIdError, Result},
    utils::math::entropy,
    Feature,
};

/// Information gain per feature
///
/// One value per feature when not binarised, one per event otherwise.
pub type IgWeights = Vec<(Feature, Vec<f64>)>;

/// Information gain together with the counts it was computed from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IgTable {
    pub weights: IgWeights,
    /// instances of each event containing the feature, aligned with `weights`
    pub counts: Vec<Vec<f64>>,
}

impl IgTable {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Information gain of `features` with respect to the events of `suffix`
///
/// `class_dist[e]` is the number of instances of event `e`. Buckets are
/// processed in parallel and concatenated in ascending order; within a
/// bucket features are sorted by bytes. Features that never occur in any
/// bucket get no row.
///
/// # Arguments
/// * `features` - only these features are scored
/// * `binarise` - one-vs-rest gain per event instead of one multiclass value
/// * `suffix` - which event shards to read, languages or domains
pub fn compute_ig(
    pool: &rayon::ThreadPool,
    buckets: &BucketSet,
    features: &[Feature],
    class_dist: &[u64],
    binarise: bool,
    suffix: &str,
) -> Result<IgTable> {
    let wanted: HashSet<&[u8]> = features.iter().map(|f| &**f).collect();
    let dist: Vec<f64> = class_dist.iter().map(|&c| c as f64).collect();

    let per_bucket: Vec<Vec<(Feature, Vec<f64>, Vec<f64>)>> = pool.install(|| {
        (0..buckets.num_buckets())
            .into_par_iter()
            .map(|b| {
                ig_bucket(buckets, b, &wanted, &dist, binarise, suffix)
                    .map_err(|e| LangIdError::worker(format!("bucket {b}"), e))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let mut table = IgTable::default();
    for (feature, weights, counts) in per_bucket.into_iter().flatten() {
        table.weights.push((feature, weights));
        table.counts.push(counts);
    }
    info!(
        "[stage] {} IG over {} features ({} events{})",
        suffix,
        table.len(),
        class_dist.len(),
        if binarise { ", binarised" } else { "" }
    );
    Ok(table)
}

fn ig_bucket(
    buckets: &BucketSet,
    bucket: usize,
    wanted: &HashSet<&[u8]>,
    dist: &[f64],
    binarise: bool,
    suffix: &str,
) -> Result<Vec<(Feature, Vec<f64>, Vec<f64>)>> {
    let (records, bytes) = read_bucket::<TermRecord>(buckets, bucket, suffix)?;
    let num_events = dist.len();

    // dense count row per in-bucket feature
    let mut term_freq: IndexMap<Feature, Vec<f64>> = IndexMap::new();
    for r in records {
        if !wanted.contains(&*r.feature) {
            continue;
        }
        let event = r.event as usize;
        if event >= num_events {
            return Err(LangIdError::corrupt(format!(
                "event id {event} out of range in bucket {bucket} ({suffix})"
            )));
        }
        let row = term_freq
            .entry(r.feature.into_boxed_slice())
            .or_insert_with(|| vec![0.0; num_events]);
        row[event] += r.count as f64;
    }
    term_freq.sort_unstable_keys();

    let rows: Vec<(Feature, Vec<f64>, Vec<f64>)> = term_freq
        .into_iter()
        .map(|(feature, counts)| {
            let w = if binarise {
                ig_binarised(&counts, dist)
            } else {
                vec![ig_multiclass(&counts, dist)]
            };
            (feature, w, counts)
        })
        .collect();
    debug!("bucket {bucket}: {} features from {bytes} bytes", rows.len());
    Ok(rows)
}

/// Negative counts: instances of each event that do not contain the feature
fn absent(counts: &[f64], dist: &[f64]) -> Vec<f64> {
    dist.iter().zip(counts).map(|(&d, &c)| (d - c).max(0.0)).collect()
}

/// `H(dist) - Σ_p P(p) H(class | p)` over presence `p ∈ {present, absent}`
pub fn ig_multiclass(counts: &[f64], dist: &[f64]) -> f64 {
    let neg = absent(counts, dist);
    let pos_total: f64 = counts.iter().sum();
    let neg_total: f64 = neg.iter().sum();
    let total = pos_total + neg_total;
    if !(total > 0.0) {
        return 0.0;
    }
    entropy(dist) - (pos_total / total) * entropy(counts) - (neg_total / total) * entropy(&neg)
}

/// One-vs-rest information gain for every event
pub fn ig_binarised(counts: &[f64], dist: &[f64]) -> Vec<f64> {
    let neg = absent(counts, dist);
    let n: f64 = dist.iter().sum();
    let pos_total: f64 = counts.iter().sum();
    let neg_total: f64 = neg.iter().sum();
    let total = pos_total + neg_total;
    (0..dist.len())
        .map(|e| {
            if !(total > 0.0) {
                return 0.0;
            }
            let prior = [n - dist[e], dist[e]];
            let pos = [pos_total - counts[e], counts[e]];
            let negp = [neg_total - neg[e], neg[e]];
            entropy(&prior) - (pos_total / total) * entropy(&pos) - (neg_total / total) * entropy(&negp)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{bucket_of, PendingBuckets, ShardWriter, LANG_SUFFIX};

    #[test]
    fn perfect_predictor_gains_full_entropy() {
        // feature occurs in every class-0 instance and nowhere else
        let dist = [4.0, 4.0];
        let ig = ig_multiclass(&[4.0, 0.0], &dist);
        assert!((ig - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn uninformative_feature_gains_nothing() {
        let dist = [4.0, 4.0];
        assert!(ig_multiclass(&[2.0, 2.0], &dist).abs() < 1e-12);
        assert!(ig_binarised(&[2.0, 2.0], &dist).iter().all(|g| g.abs() < 1e-12));
    }

    #[test]
    fn binarised_matches_multiclass_for_two_events() {
        let dist = [5.0, 3.0];
        let counts = [4.0, 1.0];
        let multi = ig_multiclass(&counts, &dist);
        let bin = ig_binarised(&counts, &dist);
        assert!((bin[0] - multi).abs() < 1e-12);
        assert!((bin[1] - multi).abs() < 1e-12);
    }

    #[test]
    fn binarised_singles_out_the_indicated_event() {
        let dist = [10.0, 10.0, 10.0];
        let bin = ig_binarised(&[10.0, 0.0, 0.0], &dist);
        assert!(bin[0] > bin[1]);
        assert!((bin[1] - bin[2]).abs() < 1e-12);
    }

    #[test]
    fn empty_distribution_is_zero() {
        assert_eq!(ig_multiclass(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(ig_binarised(&[0.0], &[0.0]), vec![0.0]);
    }

    #[test]
    fn buckets_are_concatenated_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let pending = PendingBuckets::create(dir.path().join("b"), 2).unwrap();
        let features: Vec<Feature> = ["zz", "ab", "q", "m", "unused"]
            .iter()
            .map(|s| s.as_bytes().into())
            .collect();
        {
            let mut w = ShardWriter::new(pending.layout(), LANG_SUFFIX);
            for f in &features[..4] {
                w.write(bucket_of(f, 2), &TermRecord { feature: f.to_vec(), event: 0, count: 1 }).unwrap();
            }
            w.write(0, &TermRecord { feature: b"ignored".to_vec(), event: 1, count: 1 }).unwrap();
            w.finish().unwrap();
        }
        let set = pending.commit().unwrap();
        let pool = crate::utils::thread_pool(Some(2)).unwrap();
        let table = compute_ig(&pool, &set, &features, &[2, 2], true, LANG_SUFFIX).unwrap();
        assert_eq!(table.len(), 4);
        assert!(table.weights.iter().all(|(_, w)| w.len() == 2));
        assert!(table.counts.iter().all(|c| c == &vec![1.0, 0.0]));

        let mut expected: Vec<(usize, Vec<u8>)> =
            features[..4].iter().map(|f| (bucket_of(f, 2), f.to_vec())).collect();
        expected.sort();
        let got: Vec<Vec<u8>> = table.weights.into_iter().map(|(f, _)| f.to_vec()).collect();
        assert_eq!(got, expected.into_iter().map(|(_, f)| f).collect::<Vec<_>>());
    }

    #[test]
    fn out_of_range_event_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let pending = PendingBuckets::create(dir.path().join("b"), 1).unwrap();
        {
            let mut w = ShardWriter::new(pending.layout(), LANG_SUFFIX);
            w.write(0, &TermRecord { feature: b"a".to_vec(), event: 7, count: 1 }).unwrap();
            w.finish().unwrap();
        }
        let set = pending.commit().unwrap();
        let pool = crate::utils::thread_pool(Some(1)).unwrap();
        let features: Vec<Feature> = vec![b"a".to_vec().into_boxed_slice()];
        let err = compute_ig(&pool, &set, &features, &[1, 1], false, LANG_SUFFIX).unwrap_err();
        match err {
            LangIdError::Worker { source, .. } => assert!(matches!(*source, LangIdError::Corrupt(_))),
            other => panic!("unexpected {other}"),
        }
    }
}
