use std::sync::Arc;

use rayon::prelude::*;

use crate::{
    error::{LangIdError, Result},
    scanner::StateWidth,
    utils::math::{argmax, norm_probs},
};

use super::Model;

/// Runtime handle over a trained model
///
/// The full model is kept behind an `Arc`; restricting the label set only
/// rebuilds the reduced score tables, so clones are cheap to share and
/// [`Classifier::set_languages`] can always go back to every label.
///
/// # Examples
/// ```no_run
/// use ngram_langid::load_model;
/// let classifier = load_model("model").unwrap();
/// let (lang, confidence) = classifier.classify(b"hello world");
/// println!("{lang} {confidence:.3}");
/// ```
#[derive(Debug, Clone)]
pub struct Classifier {
    full: Arc<Model>,
    labels: Vec<String>,
    log_ptc: Vec<f64>,
    log_pc: Vec<f64>,
    normalise: bool,
}

impl Classifier {
    pub fn new(model: Model) -> Self {
        let all: Vec<usize> = (0..model.num_langs()).collect();
        let mut classifier = Self {
            full: Arc::new(model),
            labels: Vec::new(),
            log_ptc: Vec::new(),
            log_pc: Vec::new(),
            normalise: true,
        };
        classifier.restrict(&all);
        classifier
    }

    /// Report probabilities (the default) or raw log scores
    pub fn with_normalisation(mut self, normalise: bool) -> Self {
        self.normalise = normalise;
        self
    }

    /// The full model, whatever the active label set
    pub fn model(&self) -> &Model {
        &self.full
    }

    /// Active labels, in model order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn num_features(&self) -> usize {
        self.full.num_features()
    }

    pub fn num_states(&self) -> usize {
        self.full.scanner().num_states()
    }

    pub fn scanner_width(&self) -> StateWidth {
        self.full.scanner().width()
    }

    /// Restrict scoring to `langs`; an empty list restores every label
    ///
    /// Priors are not renormalised over the subset.
    pub fn set_languages<S: AsRef<str>>(&mut self, langs: &[S]) -> Result<()> {
        if langs.is_empty() {
            self.reset_languages();
            return Ok(());
        }
        let all = self.full.labels();
        for lang in langs {
            if !all.iter().any(|l| l == lang.as_ref()) {
                return Err(LangIdError::config(format!("unknown language {:?}", lang.as_ref())));
            }
        }
        let active: Vec<usize> = (0..all.len())
            .filter(|&c| langs.iter().any(|l| l.as_ref() == all[c]))
            .collect();
        self.restrict(&active);
        Ok(())
    }

    pub fn reset_languages(&mut self) {
        let all: Vec<usize> = (0..self.full.num_langs()).collect();
        self.restrict(&all);
    }

    /// Rebuild the score tables for the model columns in `active`
    fn restrict(&mut self, active: &[usize]) {
        let model = Arc::clone(&self.full);
        let n = model.num_langs();
        self.labels = active.iter().map(|&c| model.labels()[c].clone()).collect();
        self.log_pc = active.iter().map(|&c| model.log_pc()[c]).collect();
        self.log_ptc = model
            .log_ptc()
            .chunks(n)
            .flat_map(|row| active.iter().map(move |&c| row[c]))
            .collect();
    }

    /// Occurrence count of every model feature in `text`
    pub fn feature_vector(&self, text: &[u8]) -> Vec<u32> {
        self.full.scanner().feature_vector(text, self.num_features())
    }

    /// `v · log_ptc + log_pc` over the active labels
    fn scores(&self, text: &[u8]) -> Vec<f64> {
        let k = self.labels.len();
        let mut scores = vec![0.0; k];
        for (t, &n) in self.feature_vector(text).iter().enumerate() {
            if n == 0 {
                continue;
            }
            let row = &self.log_ptc[t * k..(t + 1) * k];
            for (s, &p) in scores.iter_mut().zip(row) {
                *s += n as f64 * p;
            }
        }
        for (s, &p) in scores.iter_mut().zip(&self.log_pc) {
            *s += p;
        }
        if self.normalise {
            norm_probs(&scores)
        } else {
            scores
        }
    }

    /// Most likely label and its confidence
    pub fn classify(&self, text: &[u8]) -> (String, f64) {
        let scores = self.scores(text);
        // the active set is never empty
        let best = argmax(&scores).unwrap_or(0);
        (self.labels[best].clone(), scores[best])
    }

    /// Every active label, most likely first
    pub fn rank(&self, text: &[u8]) -> Vec<(String, f64)> {
        let scores = self.scores(text);
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        order
            .into_iter()
            .map(|i| (self.labels[i].clone(), scores[i]))
            .collect()
    }

    /// `classify` over many inputs in parallel
    pub fn classify_batch<T: AsRef<[u8]> + Sync>(&self, texts: &[T]) -> Vec<(String, f64)> {
        texts.par_iter().map(|t| self.classify(t.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::model::tests::toy_model;

    #[test]
    fn classify_picks_the_likely_label() {
        let c = Classifier::new(toy_model());
        assert_eq!(c.classify(b"aaaa").0, "xa");
        assert_eq!(c.classify(b"bbbb").0, "xb");
        assert_eq!(c.feature_vector(b"abab"), vec![2, 2, 2]);
    }

    #[test]
    fn empty_input_falls_back_to_priors() {
        let model = toy_model();
        let c = Classifier::new(model.clone());
        let (label, conf) = c.classify(b"");
        let best = argmax(model.log_pc()).unwrap();
        assert_eq!(label, model.labels()[best]);
        assert!((conf - norm_probs(model.log_pc())[best]).abs() < 1e-12);
    }

    #[test]
    fn classify_is_head_of_rank() {
        let c = Classifier::new(toy_model());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..200 {
            let len = rng.gen_range(0..20);
            let text: Vec<u8> = (0..len).map(|_| rng.gen_range(b'a'..=b'c')).collect();
            let ranked = c.rank(&text);
            assert_eq!(c.classify(&text), ranked[0]);
            let total: f64 = ranked.iter().map(|(_, p)| p).sum();
            assert!((total - 1.0).abs() < 1e-9);
            assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));
        }
    }

    #[test]
    fn raw_scores_without_normalisation() {
        let c = Classifier::new(toy_model()).with_normalisation(false);
        let (_, score) = c.classify(b"a");
        assert!((score - (0.6f64.ln() + 0.5f64.ln())).abs() < 1e-12);
    }

    #[test]
    fn language_subset_masks_columns() {
        let mut c = Classifier::new(toy_model());
        c.set_languages(&["xb"]).unwrap();
        assert_eq!(c.labels(), &["xb".to_string()]);
        let ranked = c.rank(b"aaaa");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0], ("xb".to_string(), 1.0));

        assert!(c.set_languages(&["nope"]).unwrap_err().is_config());
        // a failed call keeps the previous subset
        assert_eq!(c.labels().len(), 1);
        c.set_languages::<&str>(&[]).unwrap();
        assert_eq!(c.labels().len(), 2);
    }

    #[test]
    fn introspection() {
        let c = Classifier::new(toy_model());
        assert_eq!(c.num_features(), 3);
        assert_eq!(c.num_states(), 4);
        assert_eq!(c.scanner_width(), StateWidth::U16);
    }

    #[test]
    fn batch_matches_single() {
        let c = Classifier::new(toy_model());
        let texts: Vec<&[u8]> = vec![b"a", b"bb", b"", b"abba"];
        let batch = c.classify_batch(&texts);
        let single: Vec<(String, f64)> = texts.iter().map(|t| c.classify(t)).collect();
        assert_eq!(batch, single);
    }
}
