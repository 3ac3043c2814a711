use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, LangIdError, Result};

/// Default PRNG seed for document and window sampling
pub const DEFAULT_SEED: u64 = 61338;

/// Every knob of the training pipeline
///
/// Built with `TrainOptions::default()` and the chained setters below,
/// checked with `validate()` before any stage runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOptions {
    /// smallest byte n-gram order
    pub min_order: usize,
    /// largest byte n-gram order
    pub max_order: usize,
    /// whitespace word tokens instead of byte n-grams in the first pass
    pub word: bool,
    /// number of hash buckets
    pub buckets: usize,
    /// worker count, `None` uses rayon's default
    pub jobs: Option<usize>,
    /// items per worker task
    pub chunksize: usize,
    /// a language must be present in at least this many domains
    pub min_domain: usize,
    /// probability of keeping each document
    pub proportion: f64,
    pub seed: u64,
    /// language whitelist
    pub langs: Option<Vec<String>>,
    /// domain whitelist
    pub domains: Option<Vec<String>>,
    /// treat each line of a document as an instance
    pub line_level: bool,
    /// number of windows drawn per document in the first pass
    pub sample_count: Option<usize>,
    /// bytes per sampled window
    pub sample_size: usize,
    /// count occurrences instead of documents in the first pass
    pub term_freq: bool,
    /// global top-N document frequency selection
    pub df_tokens: Option<usize>,
    /// per-order top-K document frequency selection
    pub df_feats_per_order: Option<usize>,
    /// LD features kept per language
    pub feats_per_lang: usize,
    /// rank features by language IG alone
    pub no_domain_ig: bool,
    /// keep intermediate files
    pub debug: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            min_order: 1,
            max_order: 4,
            word: false,
            buckets: 64,
            jobs: None,
            chunksize: 50,
            min_domain: 1,
            proportion: 1.0,
            seed: DEFAULT_SEED,
            langs: None,
            domains: None,
            line_level: false,
            sample_count: None,
            sample_size: 140,
            term_freq: false,
            df_tokens: None,
            df_feats_per_order: Some(15000),
            feats_per_lang: 300,
            no_domain_ig: false,
            debug: false,
        }
    }
}

impl TrainOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(mut self, min_order: usize, max_order: usize) -> Self {
        self.min_order = min_order;
        self.max_order = max_order;
        self
    }

    pub fn word(mut self, word: bool) -> Self {
        self.word = word;
        self
    }

    pub fn buckets(mut self, buckets: usize) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn chunksize(mut self, chunksize: usize) -> Self {
        self.chunksize = chunksize;
        self
    }

    pub fn min_domain(mut self, min_domain: usize) -> Self {
        self.min_domain = min_domain;
        self
    }

    pub fn proportion(mut self, proportion: f64) -> Self {
        self.proportion = proportion;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn langs(mut self, langs: Option<Vec<String>>) -> Self {
        self.langs = langs;
        self
    }

    pub fn domains(mut self, domains: Option<Vec<String>>) -> Self {
        self.domains = domains;
        self
    }

    pub fn line_level(mut self, line_level: bool) -> Self {
        self.line_level = line_level;
        self
    }

    pub fn sample(mut self, sample_count: Option<usize>, sample_size: usize) -> Self {
        self.sample_count = sample_count;
        self.sample_size = sample_size;
        self
    }

    pub fn term_freq(mut self, term_freq: bool) -> Self {
        self.term_freq = term_freq;
        self
    }

    /// Select the top `n` features by document frequency over all orders
    pub fn df_tokens(mut self, n: usize) -> Self {
        self.df_tokens = Some(n);
        self.df_feats_per_order = None;
        self
    }

    /// Select the top `k` features by document frequency for each order
    pub fn df_feats_per_order(mut self, k: usize) -> Self {
        self.df_feats_per_order = Some(k);
        self.df_tokens = None;
        self
    }

    pub fn feats_per_lang(mut self, n: usize) -> Self {
        self.feats_per_lang = n;
        self
    }

    pub fn no_domain_ig(mut self, no_domain_ig: bool) -> Self {
        self.no_domain_ig = no_domain_ig;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Reject illegal values and incompatible combinations
    pub fn validate(&self) -> Result<()> {
        if self.min_order == 0 || self.min_order > self.max_order {
            return Err(LangIdError::config(format!(
                "invalid n-gram order range [{}, {}]",
                self.min_order, self.max_order
            )));
        }
        if self.buckets == 0 {
            return Err(LangIdError::config("number of buckets must be positive"));
        }
        if self.chunksize == 0 {
            return Err(LangIdError::config("chunksize must be positive"));
        }
        if self.jobs == Some(0) {
            return Err(LangIdError::config("job count must be positive"));
        }
        if self.min_domain == 0 {
            return Err(LangIdError::config("min_domain must be at least 1"));
        }
        if !(self.proportion > 0.0 && self.proportion <= 1.0) {
            return Err(LangIdError::config(format!(
                "proportion must lie in (0, 1], got {}",
                self.proportion
            )));
        }
        if self.line_level && self.proportion < 1.0 {
            return Err(LangIdError::config("document sampling cannot be combined with line mode"));
        }
        if self.line_level && self.sample_count.is_some() {
            return Err(LangIdError::config("window sampling cannot be combined with line mode"));
        }
        if self.sample_count == Some(0) || (self.sample_count.is_some() && self.sample_size == 0) {
            return Err(LangIdError::config("window sampling needs a positive count and size"));
        }
        match (self.df_tokens, self.df_feats_per_order) {
            (Some(_), Some(_)) => {
                return Err(LangIdError::config(
                    "global and per-order DF selection are mutually exclusive",
                ))
            }
            (None, None) => return Err(LangIdError::config("no DF selection mode given")),
            (Some(0), _) | (_, Some(0)) => {
                return Err(LangIdError::config("DF selection size must be positive"))
            }
            _ => {}
        }
        if self.word && self.df_tokens.is_none() {
            return Err(LangIdError::config("word tokens need global DF selection (df_tokens)"));
        }
        if self.feats_per_lang == 0 {
            return Err(LangIdError::config("feats_per_lang must be positive"));
        }
        Ok(())
    }

    /// Read options written by a previous run
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).at(path)?;
        Ok(serde_cbor::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_cbor::to_vec(self)?;
        fs::write(path, bytes).at(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TrainOptions::default().validate().is_ok());
    }

    #[test]
    fn line_mode_excludes_sampling() {
        let opts = TrainOptions::new().line_level(true).proportion(0.5);
        assert!(opts.validate().unwrap_err().is_config());
        let opts = TrainOptions::new().line_level(true).sample(Some(3), 10);
        assert!(opts.validate().unwrap_err().is_config());
    }

    #[test]
    fn df_modes_are_exclusive() {
        let mut opts = TrainOptions::new().df_tokens(100);
        assert!(opts.validate().is_ok());
        opts.df_feats_per_order = Some(10);
        assert!(opts.validate().is_err());
    }

    #[test]
    fn word_mode_needs_global_df() {
        assert!(TrainOptions::new().word(true).validate().is_err());
        assert!(TrainOptions::new().word(true).df_tokens(500).validate().is_ok());
    }

    #[test]
    fn bad_orders_rejected() {
        assert!(TrainOptions::new().orders(3, 2).validate().is_err());
        assert!(TrainOptions::new().orders(0, 2).validate().is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.cbor");
        let opts = TrainOptions::new().orders(2, 3).buckets(7).langs(Some(vec!["en".into()]));
        opts.save(&path).unwrap();
        assert_eq!(TrainOptions::load(&path).unwrap(), opts);
    }
}
