use std::path::Path;

use indexmap::IndexMap;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::{
    bucket::{bucket_of_id, read_bucket, BucketSet, NbRecord, PendingBuckets, ShardWriter, NB_SUFFIX},
    corpus::Item,
    error::{LangIdError, Result},
    scanner::Scanner,
};

/// Parameters of the naive Bayes pass
#[derive(Debug, Clone, Copy)]
pub struct NbOptions {
    pub num_buckets: usize,
    pub chunksize: usize,
    pub line_level: bool,
}

/// Smoothed log-probabilities of a multinomial naive Bayes model
#[derive(Debug, Clone, PartialEq)]
pub struct NbParams {
    /// `|F| x num_langs`, row-major by feature
    pub log_ptc: Vec<f64>,
    pub log_pc: Vec<f64>,
}

/// What a pass-3 task reports about its chunk
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChunkReport {
    chunk_id: usize,
    num_docs: usize,
    bytes_written: u64,
    /// language of each instance, by local doc id
    labels: Vec<u32>,
}

/// Train the class priors and the feature likelihoods
///
/// Instances are tokenized with `scanner` into a bucket tree under
/// `work_dir/nb`, which is left in place for the caller. A pass that fails
/// in a worker is run once more on a fresh tree; configuration errors and
/// corruption are returned as they are.
///
/// # Arguments
/// * `items` - instances are read from these, in line mode one per line
/// * `num_langs` - columns of the result; every `lang_id` must be below it
/// * `scanner` / `num_features` - the feature set, ids `0..num_features`
/// * `work_dir` - parent of the `nb` bucket tree
pub fn train_nb(
    pool: &rayon::ThreadPool,
    items: &[Item],
    num_langs: usize,
    scanner: &Scanner,
    num_features: usize,
    work_dir: &Path,
    options: &NbOptions,
) -> Result<NbParams> {
    if options.chunksize == 0 {
        return Err(LangIdError::config("chunksize must be positive"));
    }
    match nb_pass(pool, items, num_langs, scanner, num_features, work_dir, options) {
        Err(e @ LangIdError::Worker { .. }) if !e.is_config() => {
            warn!("naive Bayes pass failed ({e}), retrying once");
            nb_pass(pool, items, num_langs, scanner, num_features, work_dir, options)
        }
        other => other,
    }
}

fn nb_pass(
    pool: &rayon::ThreadPool,
    items: &[Item],
    num_langs: usize,
    scanner: &Scanner,
    num_features: usize,
    work_dir: &Path,
    options: &NbOptions,
) -> Result<NbParams> {
    let pending = PendingBuckets::create(work_dir.join("nb"), options.num_buckets)?;
    let layout = pending.layout();
    let mut reports: Vec<ChunkReport> = pool.install(|| {
        items
            .par_chunks(options.chunksize)
            .enumerate()
            .map(|(chunk_id, chunk)| {
                tokenize_chunk(chunk_id, chunk, scanner, layout, options.line_level)
                    .map_err(|e| LangIdError::worker(format!("chunk {chunk_id}"), e))
            })
            .collect::<Result<Vec<_>>>()
    })?;
    let buckets = pending.commit()?;

    // global re-indexing: chunk offsets fix the instance order
    reports.sort_by_key(|r| r.chunk_id);
    let mut offsets = Vec::with_capacity(reports.len());
    let mut labels: Vec<u32> = Vec::new();
    let mut written = 0u64;
    for r in &reports {
        offsets.push(labels.len());
        labels.extend_from_slice(&r.labels);
        written += r.bytes_written;
    }
    let chunk_sizes: Vec<usize> = reports.iter().map(|r| r.num_docs).collect();
    info!("[stage] tokenized {} instances into {} bytes", labels.len(), written);

    let mut class_count = vec![0u64; num_langs];
    for &lang in &labels {
        let slot = class_count
            .get_mut(lang as usize)
            .ok_or_else(|| LangIdError::corrupt(format!("language id {lang} out of range")))?;
        *slot += 1;
    }

    let per_bucket: Vec<(Vec<(u32, Vec<u64>)>, u64)> = pool.install(|| {
        (0..buckets.num_buckets())
            .into_par_iter()
            .map(|b| {
                let ctx = Reindex { offsets: &offsets, chunk_sizes: &chunk_sizes, labels: &labels, num_langs };
                class_products(&buckets, b, &ctx).map_err(|e| LangIdError::worker(format!("bucket {b}"), e))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let read: u64 = per_bucket.iter().map(|(_, bytes)| bytes).sum();
    if read != written {
        return Err(LangIdError::corrupt(format!(
            "naive Bayes buckets hold {read} bytes but workers wrote {written}"
        )));
    }

    let mut prod = vec![0u64; num_features * num_langs];
    for (rows, _) in per_bucket {
        for (feature_id, row) in rows {
            let t = feature_id as usize;
            if t >= num_features {
                return Err(LangIdError::corrupt(format!("feature id {t} out of range")));
            }
            for (c, n) in row.into_iter().enumerate() {
                prod[t * num_langs + c] += n;
            }
        }
    }

    Ok(smooth(&prod, &class_count, num_features, num_langs))
}

fn tokenize_chunk(
    chunk_id: usize,
    chunk: &[Item],
    scanner: &Scanner,
    buckets: &BucketSet,
    line_level: bool,
) -> Result<ChunkReport> {
    let mut writer = ShardWriter::new(buckets, NB_SUFFIX);
    let mut labels = Vec::new();
    for item in chunk {
        for text in item.instances(line_level)? {
            let local_doc = labels.len() as u32;
            for (&feature_id, count) in scanner.count_features(&text).iter() {
                let record = NbRecord { feature_id, chunk_id: chunk_id as u32, local_doc, count };
                writer.write(bucket_of_id(feature_id, buckets.num_buckets()), &record)?;
            }
            labels.push(item.lang_id);
        }
    }
    let bytes_written = writer.finish()?;
    debug!("chunk {chunk_id}: {} instances, {bytes_written} bytes", labels.len());
    Ok(ChunkReport { chunk_id, num_docs: labels.len(), bytes_written, labels })
}

/// Shared read-only context of the bucket tasks
struct Reindex<'a> {
    offsets: &'a [usize],
    chunk_sizes: &'a [usize],
    labels: &'a [u32],
    num_langs: usize,
}

/// `X · M` for the features of one bucket, rows sorted by feature id
fn class_products(buckets: &BucketSet, bucket: usize, ctx: &Reindex) -> Result<(Vec<(u32, Vec<u64>)>, u64)> {
    let (records, bytes) = read_bucket::<NbRecord>(buckets, bucket, NB_SUFFIX)?;
    let mut rows: IndexMap<u32, Vec<u64>> = IndexMap::new();
    for r in records {
        let chunk = r.chunk_id as usize;
        let local = r.local_doc as usize;
        match (ctx.offsets.get(chunk), ctx.chunk_sizes.get(chunk)) {
            (Some(&offset), Some(&size)) if local < size => {
                let lang = ctx.labels[offset + local] as usize;
                rows.entry(r.feature_id).or_insert_with(|| vec![0; ctx.num_langs])[lang] += r.count as u64;
            }
            _ => {
                return Err(LangIdError::corrupt(format!(
                    "record for unknown instance {chunk}/{local} in bucket {bucket}"
                )))
            }
        }
    }
    rows.sort_unstable_keys();
    Ok((rows.into_iter().collect(), bytes))
}

/// `log_ptc[t, c] = ln(1 + prod[t, c]) - ln(|F| + Σ_t prod[t, c])`,
/// `log_pc[c] = ln(instances of c)`
fn smooth(prod: &[u64], class_count: &[u64], num_features: usize, num_langs: usize) -> NbParams {
    let mut col_sum = vec![0u64; num_langs];
    for row in prod.chunks(num_langs.max(1)) {
        for (c, &n) in row.iter().enumerate() {
            col_sum[c] += n;
        }
    }
    let denom: Vec<f64> = col_sum.iter().map(|&s| (num_features as f64 + s as f64).ln()).collect();
    let log_ptc = prod
        .iter()
        .enumerate()
        .map(|(i, &n)| (1.0 + n as f64).ln() - denom[i % num_langs])
        .collect();
    let log_pc = class_count.iter().map(|&n| (n as f64).ln()).collect();
    NbParams { log_ptc, log_pc }
}
