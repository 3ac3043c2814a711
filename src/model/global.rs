//! Process-wide default classifier behind the crate-level convenience
//! functions

use std::sync::{Arc, PoisonError, RwLock};

use log::info;

use crate::error::{LangIdError, Result};

use super::{load_model, Classifier};

/// Environment variable naming the model file loaded on first use
pub const MODEL_ENV: &str = "NGRAM_LANGID_MODEL";

static DEFAULT: RwLock<Option<Arc<Classifier>>> = RwLock::new(None);

/// Install `classifier` as the process default
pub fn set_default_model(classifier: Classifier) {
    *DEFAULT.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(classifier));
}

/// The process default, loading it from `NGRAM_LANGID_MODEL` if needed
pub fn default_classifier() -> Result<Arc<Classifier>> {
    if let Some(c) = DEFAULT.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return Ok(Arc::clone(c));
    }
    let mut slot = DEFAULT.write().unwrap_or_else(PoisonError::into_inner);
    let c = loaded(&mut slot)?;
    Ok(Arc::clone(c))
}

/// The classifier in `slot`, loading it from the environment when empty
fn loaded(slot: &mut Option<Arc<Classifier>>) -> Result<&Arc<Classifier>> {
    if slot.is_none() {
        let path = std::env::var(MODEL_ENV).map_err(|_| {
            LangIdError::config(format!(
                "no default model: set {MODEL_ENV} or call set_default_model"
            ))
        })?;
        let classifier = load_model(&path)?;
        info!("default model loaded from {path}");
        *slot = Some(Arc::new(classifier));
    }
    slot.as_ref().ok_or_else(|| LangIdError::config("no default model"))
}

/// Classify with the process default
pub fn classify(text: &[u8]) -> Result<(String, f64)> {
    Ok(default_classifier()?.classify(text))
}

/// Rank with the process default
pub fn rank(text: &[u8]) -> Result<Vec<(String, f64)>> {
    Ok(default_classifier()?.rank(text))
}

/// Restrict the process default to `langs`; `None` or an empty list
/// restores every label
pub fn set_languages(langs: Option<&[&str]>) -> Result<()> {
    // one write lock across read-modify-write, so concurrent calls serialise
    let mut slot = DEFAULT.write().unwrap_or_else(PoisonError::into_inner);
    let current = loaded(&mut slot)?;
    let mut classifier = (**current).clone();
    classifier.set_languages(langs.unwrap_or(&[]))?;
    *slot = Some(Arc::new(classifier));
    Ok(())
}
