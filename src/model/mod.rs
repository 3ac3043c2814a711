//! Trained model, its portable blob form and the runtime classifier

pub mod classifier;
pub mod global;

use std::{
    fs,
    io::{Read, Write},
    path::Path,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bzip2::{read::BzDecoder, write::BzEncoder, Compression};
use log::info;
use serde_cbor::Value;

use crate::{
    error::{IoResultExt, LangIdError, Result},
    scanner::{NextMove, Scanner, StateOutput},
};

pub use classifier::Classifier;

const MAGIC: &[u8; 4] = b"NGLD";
const FORMAT_VERSION: u8 = 1;
const ARITY: usize = 5;

/// Serialised field order of the blob payload
type BlobTuple = (Vec<f64>, Vec<f64>, Vec<String>, NextMove, StateOutput);

/// Naive Bayes parameters plus the scanner that extracts their features
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    log_ptc: Vec<f64>,
    log_pc: Vec<f64>,
    labels: Vec<String>,
    scanner: Scanner,
}

impl Model {
    /// Check that the tables agree with each other
    ///
    /// `log_ptc` is `|F| x |labels|` row-major and every id the scanner can
    /// emit must be a row of it.
    pub fn new(log_ptc: Vec<f64>, log_pc: Vec<f64>, labels: Vec<String>, scanner: Scanner) -> Result<Self> {
        if labels.is_empty() {
            return Err(LangIdError::model("model has no labels"));
        }
        if log_pc.len() != labels.len() {
            return Err(LangIdError::model(format!(
                "{} priors for {} labels",
                log_pc.len(),
                labels.len()
            )));
        }
        if log_ptc.len() % labels.len() != 0 {
            return Err(LangIdError::model(format!(
                "likelihood table of length {} does not split into {} columns",
                log_ptc.len(),
                labels.len()
            )));
        }
        let num_features = log_ptc.len() / labels.len();
        if let Some(id) = scanner.state_output().max_id() {
            if id as usize >= num_features {
                return Err(LangIdError::model(format!(
                    "scanner emits feature {id} but the model has {num_features} features"
                )));
            }
        }
        Ok(Self { log_ptc, log_pc, labels, scanner })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn num_langs(&self) -> usize {
        self.labels.len()
    }

    pub fn num_features(&self) -> usize {
        self.log_ptc.len() / self.labels.len()
    }

    pub fn log_ptc(&self) -> &[f64] {
        &self.log_ptc
    }

    pub fn log_pc(&self) -> &[f64] {
        &self.log_pc
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Encode as base64 text over bzip2 over a versioned CBOR tuple
    pub fn to_blob(&self) -> Result<String> {
        let tuple = (
            &self.log_ptc,
            &self.log_pc,
            &self.labels,
            self.scanner.nextmove(),
            self.scanner.state_output(),
        );
        let mut payload = Vec::with_capacity(MAGIC.len() + 1 + self.log_ptc.len() * 9);
        payload.extend_from_slice(MAGIC);
        payload.push(FORMAT_VERSION);
        serde_cbor::to_writer(&mut payload, &tuple)?;

        let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&payload)?;
        Ok(STANDARD.encode(encoder.finish()?))
    }

    /// Decode a blob produced by [`Model::to_blob`]
    ///
    /// Whitespace in the text is ignored, so wrapped blobs load as well.
    pub fn from_blob(blob: &str) -> Result<Self> {
        let text: String = blob.chars().filter(|c| !c.is_whitespace()).collect();
        let compressed = STANDARD
            .decode(text.as_bytes())
            .map_err(|e| LangIdError::model(format!("not base64: {e}")))?;
        let mut payload = Vec::new();
        BzDecoder::new(compressed.as_slice())
            .read_to_end(&mut payload)
            .map_err(|e| LangIdError::model(format!("not bzip2: {e}")))?;

        let body = payload
            .strip_prefix(MAGIC.as_slice())
            .ok_or_else(|| LangIdError::model("missing model magic"))?;
        let (&version, body) = body
            .split_first()
            .ok_or_else(|| LangIdError::model("missing format version"))?;
        if version != FORMAT_VERSION {
            return Err(LangIdError::model(format!("unsupported format version {version}")));
        }

        let value: Value = serde_cbor::from_slice(body)?;
        match &value {
            Value::Array(fields) if fields.len() == ARITY => {}
            Value::Array(fields) => {
                return Err(LangIdError::model(format!(
                    "model tuple has {} fields, expected {ARITY}",
                    fields.len()
                )))
            }
            _ => return Err(LangIdError::model("model payload is not a tuple")),
        }
        let (log_ptc, log_pc, labels, nextmove, output): BlobTuple = serde_cbor::value::from_value(value)?;
        let scanner = Scanner::from_parts(nextmove, output)?;
        Self::new(log_ptc, log_pc, labels, scanner)
    }

    /// Write the blob to `path`, replacing it atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let blob = self.to_blob()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).at(dir)?;
        tmp.write_all(blob.as_bytes()).at(tmp.path())?;
        tmp.persist(path).map_err(|e| LangIdError::io(path, e.error))?;
        info!(
            "model written to {} ({} features, {} languages)",
            path.display(),
            self.num_features(),
            self.num_langs()
        );
        Ok(())
    }
}

/// Write `model` to `path` as blob text
pub fn save_model(model: &Model, path: &Path) -> Result<()> {
    model.save(path)
}

/// Load a classifier from a blob file or from the blob text itself
pub fn load_model(path_or_blob: &str) -> Result<Classifier> {
    let path = Path::new(path_or_blob);
    let model = if path.is_file() {
        let text = fs::read_to_string(path).at(path)?;
        Model::from_blob(&text)?
    } else {
        Model::from_blob(path_or_blob)?
    };
    Ok(Classifier::new(model))
}
