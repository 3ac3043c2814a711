/// This crate trains and runs a byte n-gram naive Bayes language identifier.
pub mod bucket;
pub mod config;
pub mod corpus;
pub mod error;
pub mod frequency;
pub mod model;
pub mod scanner;
pub mod select;
pub mod tokenizer;
pub mod train;
pub mod utils;

/// A feature: an arbitrary byte string, usually a byte n-gram
pub type Feature = Box<[u8]>;

/// Training pipeline entry point
/// Indexes a corpus laid out as `<root>/<domain>/<language>/<doc>`, selects
/// features in three passes (document frequency, information gain, LD score)
/// and fits a multinomial naive Bayes model over them.
///
/// Every stage artefact is written into `out_dir`:
/// - `lang_index`, `domain_index`, `paths`
/// - `DFfeats`, `IGweights.lang.bin`, `IGweights.domain`
/// - `LDfeats`, `LDfeats.per_lang`
/// - `model`, the blob text read by [`load_model`]
/// - `options.cbor`, the options of the run
///
/// # Examples
/// ```no_run
/// use std::path::Path;
/// use ngram_langid::{train, TrainOptions};
///
/// let options = TrainOptions::new().orders(1, 4).feats_per_lang(300);
/// let model = train(Path::new("corpus"), Path::new("out"), &options).unwrap();
/// println!("{} features", model.num_features());
/// ```
pub use train::train;

/// Options of a training run
/// Plain serde data with chained setters; `validate()` rejects illegal
/// combinations before any stage runs.
pub use config::TrainOptions;

/// Trained model tables and the scanner that feeds them
///
/// # Serialization
/// `to_blob` / `from_blob` use a base64 text armour over a bzip2-compressed
/// CBOR record with a magic tag and a version number.
pub use model::Model;

/// Runtime classifier
/// Holds the full model behind an `Arc`, so it can be cloned and shared
/// between threads. Label subsets are applied by masking columns of the
/// full model.
pub use model::Classifier;

/// Load a classifier from a blob file path or from the blob text itself
pub use model::load_model;

/// Write a model blob atomically
pub use model::save_model;

/// Process-wide default classifier
/// Installed with `set_default_model`, or loaded on first use from the path
/// in the `NGRAM_LANGID_MODEL` environment variable.
pub use model::global::{classify, rank, set_default_model, set_languages};

/// Aho-Corasick scanner over a feature set
/// `step` advances one byte; every state reports the ids of all features
/// ending there, so overlapping matches are counted.
pub use scanner::{build_scanner, Scanner};

/// Count of each feature within one instance
pub use frequency::FeatureFrequency;

/// Tokenizers used by the counting passes
pub use tokenizer::{NGramTokenizer, Tokenizer, WordTokenizer};

pub use error::{LangIdError, Result};
