use std::{
    cmp::Reverse,
    collections::{BTreeSet, HashMap},
};

use log::info;

use crate::{
    error::{LangIdError, Result},
    utils::sort::top_k,
    Feature,
};

use super::{IgTable, IgWeights};

/// Top `feats_per_lang` features of every language by LD score
///
/// `LD(f, c) = IG_lang(f, c) - IG_domain(f)`, or `IG_lang(f, c)` alone when
/// `ig_domain` is `None`. `ig_lang` must be binarised over the languages.
/// Among equal scores, features occurring in language `c` come first, then
/// feature bytes ascending. With two languages a feature seen only in `B`
/// has the same binarised IG for `A` as `A`'s own features; without the
/// presence rule `A` could keep `B`'s features and the two classes would
/// share one feature set. Entry `c` of the result is the list of language
/// `c`, best first.
pub fn select_ld(
    ig_lang: &IgTable,
    ig_domain: Option<&IgWeights>,
    num_langs: usize,
    feats_per_lang: usize,
) -> Result<Vec<Vec<Feature>>> {
    let domain: Option<HashMap<&[u8], f64>> = match ig_domain {
        Some(weights) => Some(
            weights
                .iter()
                .map(|(f, w)| match w.as_slice() {
                    [g] => Ok((&**f, *g)),
                    _ => Err(LangIdError::config("domain IG must have one value per feature")),
                })
                .collect::<Result<_>>()?,
        ),
        None => None,
    };
    if ig_lang.counts.len() != ig_lang.weights.len() {
        return Err(LangIdError::config("language IG counts and weights are misaligned"));
    }
    if let Some((f, w)) = ig_lang.weights.iter().find(|(_, w)| w.len() != num_langs) {
        return Err(LangIdError::config(format!(
            "language IG of {} has {} values, expected {num_langs}",
            crate::utils::literal::to_literal(f),
            w.len()
        )));
    }

    let per_lang: Vec<Vec<Feature>> = (0..num_langs)
        .map(|lang| {
            let scored: Vec<((Reverse<bool>, &[u8]), f64)> = ig_lang
                .weights
                .iter()
                .zip(&ig_lang.counts)
                .map(|((f, w), counts)| {
                    let penalty = domain.as_ref().and_then(|d| d.get(&**f)).copied().unwrap_or(0.0);
                    let present = counts.get(lang).map_or(false, |&n| n > 0.0);
                    ((Reverse(present), &**f), w[lang] - penalty)
                })
                .collect();
            top_k(scored, feats_per_lang)
                .into_iter()
                .map(|((_, f), _)| Feature::from(f))
                .collect()
        })
        .collect();
    info!(
        "[stage] LD selection: {} per language over {} candidates{}",
        feats_per_lang,
        ig_lang.len(),
        if domain.is_some() { "" } else { " (no domain IG)" }
    );
    Ok(per_lang)
}

/// Union of the per-language lists, sorted by bytes
///
/// The position of a feature in this list is its id in the model.
pub fn union_features(per_lang: &[Vec<Feature>]) -> Vec<Feature> {
    let set: BTreeSet<&Feature> = per_lang.iter().flatten().collect();
    set.into_iter().cloned().collect()
}
