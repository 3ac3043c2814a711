//! Hash-partitioned on-disk shuffle
//!
//! A bucket set is a directory of `num_buckets` subdirectories. Each worker
//! appends to its own file `<bucket>/<worker>.<suffix>`, one gzip member per
//! task, so no two workers ever share a file. A feature's bucket depends only
//! on its bytes, so every pass agrees on where a feature lives.

pub mod counter;
pub mod record;

use std::{
    fs,
    path::{Path, PathBuf},
};

use xxhash_rust::xxh64::xxh64;

use crate::error::{IoResultExt, LangIdError, Result};

pub use counter::{build_buckets, CountMode, CounterOptions};
pub use record::{read_bucket, NbRecord, RecordReader, RecordWriter, ShardWriter, TermRecord};

pub const LANG_SUFFIX: &str = "lang";
pub const DOMAIN_SUFFIX: &str = "domain";
pub const NB_SUFFIX: &str = "nb";
pub const DOCFREQ_FILE: &str = "docfreq";

const HASH_SEED: u64 = 0;

/// Bucket of a byte feature
#[inline]
pub fn bucket_of(feature: &[u8], num_buckets: usize) -> usize {
    (xxh64(feature, HASH_SEED) % num_buckets as u64) as usize
}

/// Bucket of a feature id, used by the naive Bayes pass
#[inline]
pub fn bucket_of_id(id: u32, num_buckets: usize) -> usize {
    bucket_of(&id.to_le_bytes(), num_buckets)
}

/// A committed bucket tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSet {
    root: PathBuf,
    num_buckets: usize,
}

impl BucketSet {
    /// Open an existing tree, checking that every bucket directory is there
    pub fn open(root: impl Into<PathBuf>, num_buckets: usize) -> Result<Self> {
        let set = Self { root: root.into(), num_buckets };
        for b in 0..num_buckets {
            let dir = set.dir(b);
            if !dir.is_dir() {
                return Err(LangIdError::corrupt(format!("missing bucket {}", dir.display())));
            }
        }
        Ok(set)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    pub fn dir(&self, bucket: usize) -> PathBuf {
        self.root.join(bucket.to_string())
    }

    /// Per-worker file of `bucket` for the calling thread
    pub fn worker_file(&self, bucket: usize, suffix: &str) -> PathBuf {
        self.dir(bucket).join(format!("{}.{suffix}", crate::utils::worker_name()))
    }

    /// All files in `bucket` with the given suffix, sorted by name
    pub fn files(&self, bucket: usize, suffix: &str) -> Result<Vec<PathBuf>> {
        let dir = self.dir(bucket);
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir).at(&dir)? {
            let path = entry.at(&dir)?.path();
            if path.extension().map_or(false, |ext| ext == suffix) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn remove(self) -> Result<()> {
        fs::remove_dir_all(&self.root).at(&self.root)
    }
}

/// A bucket tree under construction
///
/// Lives in a temporary directory beside its target and is moved into place
/// by `commit`. Dropping it uncommitted deletes everything written so far.
#[derive(Debug)]
pub struct PendingBuckets {
    tmp: tempfile::TempDir,
    target: PathBuf,
    layout: BucketSet,
}

impl PendingBuckets {
    pub fn create(target: impl Into<PathBuf>, num_buckets: usize) -> Result<Self> {
        let target = target.into();
        if num_buckets == 0 {
            return Err(LangIdError::config("bucket count must be positive"));
        }
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).at(&parent)?;
        let tmp = tempfile::Builder::new()
            .prefix(".buckets-")
            .tempdir_in(&parent)
            .at(&parent)?;
        let layout = BucketSet { root: tmp.path().to_path_buf(), num_buckets };
        for b in 0..num_buckets {
            let dir = layout.dir(b);
            fs::create_dir(&dir).at(&dir)?;
        }
        Ok(Self { tmp, target, layout })
    }

    /// Where workers write while the pass runs
    pub fn layout(&self) -> &BucketSet {
        &self.layout
    }

    /// Move the finished tree to its target, replacing any previous tree
    pub fn commit(self) -> Result<BucketSet> {
        if self.target.exists() {
            fs::remove_dir_all(&self.target).at(&self.target)?;
        }
        fs::rename(self.tmp.path(), &self.target).at(&self.target)?;
        // the temp dir is gone now, its drop finds nothing to remove
        Ok(BucketSet { root: self.target, num_buckets: self.layout.num_buckets })
    }
}
