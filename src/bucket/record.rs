use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, ErrorKind, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
};

use flate2::{read::MultiGzDecoder, write::GzEncoder, Compression};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{IoResultExt, LangIdError, Result};

use super::BucketSet;

/// `(feature, event, count)` written by the first pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRecord {
    pub feature: Vec<u8>,
    pub event: u32,
    pub count: u32,
}

/// `(feature_id, chunk_id, local_doc, count)` written by the naive Bayes pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NbRecord {
    pub feature_id: u32,
    pub chunk_id: u32,
    pub local_doc: u32,
    pub count: u32,
}

/// Appends bincode records to a file as one new gzip member
pub struct RecordWriter {
    path: PathBuf,
    encoder: GzEncoder<BufWriter<File>>,
    bytes: u64,
}

impl RecordWriter {
    pub fn append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .at(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            encoder: GzEncoder::new(BufWriter::new(file), Compression::fast()),
            bytes: 0,
        })
    }

    #[inline]
    pub fn write<R: Serialize>(&mut self, record: &R) -> Result<()> {
        bincode::serialize_into(&mut self.encoder, record)?;
        self.bytes += bincode::serialized_size(record)?;
        Ok(())
    }

    /// Close the gzip member; returns the uncompressed bytes written
    pub fn finish(self) -> Result<u64> {
        let mut inner = self.encoder.finish().at(&self.path)?;
        inner.flush().at(&self.path)?;
        Ok(self.bytes)
    }
}

/// Streams the records of one file, across all of its gzip members
///
/// Ends cleanly only on a record boundary; a record cut short is reported
/// as corruption and ends the stream.
pub struct RecordReader<R> {
    path: PathBuf,
    inner: BufReader<MultiGzDecoder<BufReader<File>>>,
    bytes: u64,
    done: bool,
    _record: PhantomData<R>,
}

impl<R: DeserializeOwned + Serialize> RecordReader<R> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).at(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: BufReader::new(MultiGzDecoder::new(BufReader::new(file))),
            bytes: 0,
            done: false,
            _record: PhantomData,
        })
    }

    /// Uncompressed bytes consumed so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    fn read_one(&mut self) -> Result<Option<R>> {
        if self.inner.fill_buf().at(&self.path)?.is_empty() {
            return Ok(None);
        }
        let record: R = bincode::deserialize_from(&mut self.inner).map_err(|e| {
            let truncated = matches!(&*e, bincode::ErrorKind::Io(io) if io.kind() == ErrorKind::UnexpectedEof);
            if truncated {
                LangIdError::corrupt(format!("truncated record in {}", self.path.display()))
            } else {
                LangIdError::from(e)
            }
        })?;
        self.bytes += bincode::serialized_size(&record)?;
        Ok(Some(record))
    }
}

impl<R: DeserializeOwned + Serialize> Iterator for RecordReader<R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Result<R>> {
        if self.done {
            return None;
        }
        match self.read_one() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read every record of `suffix` in one bucket
///
/// Returns the records in file-name order and the bytes consumed.
pub fn read_bucket<R: DeserializeOwned + Serialize>(
    buckets: &BucketSet,
    bucket: usize,
    suffix: &str,
) -> Result<(Vec<R>, u64)> {
    let mut records = Vec::new();
    let mut bytes = 0;
    for path in buckets.files(bucket, suffix)? {
        let mut reader = RecordReader::open(&path)?;
        for record in &mut reader {
            records.push(record?);
        }
        bytes += reader.bytes_read();
    }
    Ok((records, bytes))
}

/// One lazily opened writer per bucket for the calling worker
pub struct ShardWriter<'a> {
    buckets: &'a BucketSet,
    suffix: &'a str,
    writers: Vec<Option<RecordWriter>>,
}

impl<'a> ShardWriter<'a> {
    pub fn new(buckets: &'a BucketSet, suffix: &'a str) -> Self {
        Self {
            buckets,
            suffix,
            writers: (0..buckets.num_buckets()).map(|_| None).collect(),
        }
    }

    pub fn write<R: Serialize>(&mut self, bucket: usize, record: &R) -> Result<()> {
        let slot = &mut self.writers[bucket];
        if slot.is_none() {
            *slot = Some(RecordWriter::append(&self.buckets.worker_file(bucket, self.suffix))?);
        }
        match slot {
            Some(writer) => writer.write(record),
            None => Ok(()),
        }
    }

    /// Close every member; returns the total bytes written
    pub fn finish(self) -> Result<u64> {
        let mut total = 0;
        for writer in self.writers.into_iter().flatten() {
            total += writer.finish()?;
        }
        Ok(total)
    }
}
