use std::path::Path;

use log::{debug, info};
use rayon::prelude::*;

use crate::{
    corpus::Item,
    error::{LangIdError, Result},
    frequency::{EventCounts, FeatureFrequency},
    tokenizer::{Tokenizer, WindowSampler},
};

use super::{bucket_of, BucketSet, PendingBuckets, ShardWriter, TermRecord, DOMAIN_SUFFIX, LANG_SUFFIX};

/// What a `(feature, event)` pair adds per document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    /// +1 per document containing the feature
    DocumentFrequency,
    /// the number of occurrences
    TermFrequency,
}

/// Parameters of one counting pass
#[derive(Debug, Clone, Copy)]
pub struct CounterOptions {
    pub num_buckets: usize,
    pub chunksize: usize,
    pub mode: CountMode,
    pub line_level: bool,
    pub sampler: Option<WindowSampler>,
}

/// Count `(feature, language)` and `(feature, domain)` pairs into a fresh
/// bucket tree at `target`
///
/// Runs on `pool`; each task handles one chunk of `items`. If any task fails
/// the partially written tree is discarded and nothing appears at `target`.
pub fn build_buckets(
    pool: &rayon::ThreadPool,
    items: &[Item],
    tokenizer: &dyn Tokenizer,
    target: &Path,
    options: &CounterOptions,
) -> Result<BucketSet> {
    if options.chunksize == 0 {
        return Err(LangIdError::config("chunksize must be positive"));
    }
    let pending = PendingBuckets::create(target, options.num_buckets)?;
    let layout = pending.layout();

    let written: u64 = pool.install(|| {
        items
            .par_chunks(options.chunksize)
            .enumerate()
            .map(|(chunk_id, chunk)| {
                let first = (chunk_id * options.chunksize) as u64;
                count_chunk(chunk, first, tokenizer, layout, options)
                    .map_err(|e| LangIdError::worker(format!("chunk {chunk_id}"), e))
            })
            .try_reduce(|| 0, |a, b| Ok(a + b))
    })?;

    let buckets = pending.commit()?;
    info!(
        "[stage] counted {} items into {} buckets ({} bytes) at {}",
        items.len(),
        options.num_buckets,
        written,
        buckets.root().display()
    );
    Ok(buckets)
}

/// Tokenize one chunk and shard its counts; returns the bytes written
fn count_chunk(
    chunk: &[Item],
    first_index: u64,
    tokenizer: &dyn Tokenizer,
    buckets: &BucketSet,
    options: &CounterOptions,
) -> Result<u64> {
    let mut lang_counts = EventCounts::new();
    let mut domain_counts = EventCounts::new();

    for (offset, item) in chunk.iter().enumerate() {
        let doc_index = first_index + offset as u64;
        for text in item.instances(options.line_level)? {
            let mut freq = FeatureFrequency::new();
            match &options.sampler {
                Some(sampler) => {
                    for window in sampler.windows(&text, doc_index) {
                        freq.add_tokens(tokenizer.tokenize(window));
                    }
                }
                None => {
                    freq.add_tokens(tokenizer.tokenize(&text));
                }
            }
            if options.mode == CountMode::DocumentFrequency {
                freq = freq.into_presence();
            }
            lang_counts.add_document(&freq, item.lang_id);
            domain_counts.add_document(&freq, item.domain_id);
        }
    }

    let written = shard(&lang_counts, buckets, LANG_SUFFIX)? + shard(&domain_counts, buckets, DOMAIN_SUFFIX)?;
    debug!(
        "{}: {} items, {} features, {} bytes",
        crate::utils::worker_name(),
        chunk.len(),
        lang_counts.len(),
        written
    );
    Ok(written)
}

fn shard(counts: &EventCounts, buckets: &BucketSet, suffix: &str) -> Result<u64> {
    let mut writer = ShardWriter::new(buckets, suffix);
    for (feature, event, count) in counts.triples() {
        let record = TermRecord { feature: feature.to_vec(), event, count };
        writer.write(bucket_of(feature, buckets.num_buckets()), &record)?;
    }
    writer.finish()
}
