//! The training pipeline, from a corpus tree to a model blob
//!
//! Stages run strictly one after another; each stage fans out over a rayon
//! pool and writes its artefact into `out_dir` before the next one starts.

pub mod nb;

use std::{fs, path::Path, time::Instant};

use log::{info, warn};

use crate::{
    bucket::{build_buckets, CountMode, CounterOptions, DOMAIN_SUFFIX, LANG_SUFFIX},
    config::TrainOptions,
    corpus::{index_corpus, CorpusIndex},
    error::{IoResultExt, LangIdError, Result},
    model::Model,
    scanner::{build_scanner, FeatureScanner},
    select::{compute_ig, df_tally, select_df, select_ld, union_features, DfSelection},
    tokenizer::{NGramTokenizer, Tokenizer, WindowSampler, WordTokenizer},
    utils::{
        literal::{to_literal, write_features, write_weights},
        thread_pool,
    },
    Feature,
};

pub use nb::{train_nb, NbOptions, NbParams};

/// Run the whole pipeline over `corpus_root` and write every artefact,
/// the model blob included, into `out_dir`
///
/// Bucket trees live under `out_dir/buckets` and are removed once the model
/// is written, unless `options.debug` is set. A failed run leaves whatever
/// trees were already committed in place.
///
/// # Arguments
/// * `corpus_root` - `<domain>/<lang>/<doc>` tree, or a file listing document paths
/// * `out_dir` - created if missing; existing artefacts are overwritten
/// * `options` - validated before anything is written
pub fn train(corpus_root: &Path, out_dir: &Path, options: &TrainOptions) -> Result<Model> {
    options.validate()?;
    let started = Instant::now();
    fs::create_dir_all(out_dir).at(out_dir)?;
    options.save(&out_dir.join("options.cbor"))?;
    let pool = thread_pool(options.jobs)?;
    let work_dir = out_dir.join("buckets");

    let index = index_corpus(corpus_root, options)?;
    index.write(out_dir)?;

    // pass 1: candidate features by document frequency
    let ngrams;
    let tokenizer: &dyn Tokenizer = if options.word {
        &WordTokenizer
    } else {
        ngrams = NGramTokenizer::new(options.min_order, options.max_order)?;
        &ngrams
    };
    let counter = CounterOptions {
        num_buckets: options.buckets,
        chunksize: options.chunksize,
        mode: if options.term_freq { CountMode::TermFrequency } else { CountMode::DocumentFrequency },
        line_level: options.line_level,
        sampler: options
            .sample_count
            .map(|count| WindowSampler::new(count, options.sample_size, options.seed)),
    };
    let df_buckets = build_buckets(&pool, &index.items, tokenizer, &work_dir.join("df"), &counter)?;
    let df = df_tally(&pool, &df_buckets)?;
    let selection = match (options.df_tokens, options.df_feats_per_order) {
        (Some(n), _) => DfSelection::Global(n),
        (None, Some(k)) => DfSelection::PerOrder {
            min_order: options.min_order,
            max_order: options.max_order,
            k,
        },
        (None, None) => return Err(LangIdError::config("no DF selection mode given")),
    };
    let df_feats = select_df(&df, selection);
    if df_feats.is_empty() {
        return Err(LangIdError::config("document frequency selection kept no features"));
    }
    write_features(&out_dir.join("DFfeats"), &df_feats)?;

    // pass 2: recount the candidates for information gain
    let candidates = FeatureScanner::build(df_feats)?;
    let ig_counter = CounterOptions {
        mode: CountMode::DocumentFrequency,
        sampler: None,
        ..counter
    };
    let ig_buckets = build_buckets(&pool, &index.items, &candidates, &work_dir.join("ig"), &ig_counter)?;
    let ig_lang = compute_ig(
        &pool,
        &ig_buckets,
        candidates.features(),
        &index.lang_dist(),
        true,
        LANG_SUFFIX,
    )?;
    write_weights(&out_dir.join("IGweights.lang.bin"), &ig_lang.weights)?;
    let ig_domain = if options.no_domain_ig {
        None
    } else {
        let table = compute_ig(
            &pool,
            &ig_buckets,
            candidates.features(),
            &index.domain_dist(),
            false,
            DOMAIN_SUFFIX,
        )?;
        write_weights(&out_dir.join("IGweights.domain"), &table.weights)?;
        Some(table.weights)
    };

    let per_lang = select_ld(&ig_lang, ig_domain.as_ref(), index.lang_index.len(), options.feats_per_lang)?;
    write_per_lang(&out_dir.join("LDfeats.per_lang"), &index, &per_lang)?;
    let features = union_features(&per_lang);
    if features.is_empty() {
        return Err(LangIdError::config("LD selection kept no features"));
    }
    write_features(&out_dir.join("LDfeats"), &features)?;
    info!("[stage] {} LD features in the final set", features.len());

    // pass 3: naive Bayes over the final feature set
    let scanner = build_scanner(&features)?;
    info!(
        "[stage] scanner built: {} states, {:?} transitions",
        scanner.num_states(),
        scanner.width()
    );
    let nb_options = NbOptions {
        num_buckets: options.buckets,
        chunksize: options.chunksize,
        line_level: options.line_level,
    };
    let num_langs = index.lang_index.len();
    let params = train_nb(&pool, &index.items, num_langs, &scanner, features.len(), &work_dir, &nb_options)?;

    let labels: Vec<String> = index.lang_index.names().map(str::to_owned).collect();
    let model = Model::new(params.log_ptc, params.log_pc, labels, scanner)?;
    model.save(&out_dir.join("model"))?;

    if options.debug {
        warn!("keeping intermediate buckets in {}", work_dir.display());
    } else {
        fs::remove_dir_all(&work_dir).at(&work_dir)?;
    }
    info!(
        "[stage] training finished in {:.2?}: {} languages, {} features",
        started.elapsed(),
        model.num_langs(),
        model.num_features()
    );
    Ok(model)
}

/// `lang,feature` rows, languages in id order and features best first
fn write_per_lang(path: &Path, index: &CorpusIndex, per_lang: &[Vec<Feature>]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    for (lang, features) in index.lang_index.names().zip(per_lang) {
        for feature in features {
            writer.write_record([lang, to_literal(feature).as_str()])?;
        }
    }
    writer.flush().at(path)
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::{
        corpus::tests::write_corpus,
        model::Classifier,
        utils::literal::{parse_literal, read_features},
    };

    /// Features LD kept for `lang`, read back from `LDfeats.per_lang`
    fn per_lang_features(out_dir: &Path, lang: &str) -> Vec<Vec<u8>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(out_dir.join("LDfeats.per_lang"))
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap())
            .filter(|r| &r[0] == lang)
            .map(|r| parse_literal(&r[1]).unwrap().to_vec())
            .collect()
    }

    fn four_language_corpus(root: &Path) {
        write_corpus(
            root,
            &[
                ("d1", "en", "1", b"the cat and the dog"),
                ("d2", "en", "2", b"the house is on the hill"),
                ("d1", "de", "1", b"der hund und die katze"),
                ("d2", "de", "2", b"das haus auf dem berg"),
                ("d1", "fr", "1", b"le chat et le chien"),
                ("d2", "fr", "2", b"la maison sur la colline"),
                ("d1", "es", "1", b"el gato y el perro"),
                ("d2", "es", "2", b"la casa en la colina"),
            ],
        );
    }

    fn small_options() -> TrainOptions {
        TrainOptions::new().orders(1, 3).buckets(4).jobs(Some(2)).chunksize(2).feats_per_lang(20)
    }

    #[test]
    fn two_class_separator() {
        let corpus = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_corpus(
            corpus.path(),
            &[("d1", "A", "1", b"foo foo foo"), ("d1", "B", "1", b"bar bar bar")],
        );
        let opts = TrainOptions::new().orders(3, 3).buckets(3).feats_per_lang(3);
        let model = train(corpus.path(), out.path(), &opts).unwrap();
        assert_eq!(model.num_features(), 6);

        let c = Classifier::new(model);
        let (lang, conf) = c.classify(b"foo");
        assert_eq!(lang, "A");
        assert!(conf > 0.5);
        let (lang, conf) = c.classify(b"bar");
        assert_eq!(lang, "B");
        assert!(conf > 0.5);
    }

    fn domain_corpus(root: &Path) {
        write_corpus(
            root,
            &[
                ("d1", "a", "1", b"abcdefzzq"),
                ("d1", "a", "2", b"zzqabcdef"),
                ("d1", "a", "3", b"uvwabcdef"),
                ("d2", "a", "1", b"abcdefuvw"),
                ("d2", "a", "2", b"abcdef"),
                ("d1", "b", "1", b"xyzxyz"),
                ("d1", "b", "2", b"tuvklm"),
                ("d2", "b", "1", b"qrsqrs"),
                ("d2", "b", "2", b"xyzqrs"),
                ("d3", "b", "1", b"tuvtuv"),
                ("d3", "b", "2", b"klmklm"),
            ],
        );
    }

    #[test]
    fn domain_ig_removes_domain_specific_features() {
        let corpus = tempfile::tempdir().unwrap();
        domain_corpus(corpus.path());
        let opts = TrainOptions::new().orders(3, 3).buckets(5).df_tokens(1000).feats_per_lang(6);

        let debiased = tempfile::tempdir().unwrap();
        train(corpus.path(), debiased.path(), &opts).unwrap();
        let kept = per_lang_features(debiased.path(), "a");
        assert_eq!(kept.len(), 6);
        assert!(kept.contains(&b"abc".to_vec()));
        assert!(!kept.contains(&b"zzq".to_vec()));

        let plain = tempfile::tempdir().unwrap();
        train(corpus.path(), plain.path(), &opts.clone().no_domain_ig(true)).unwrap();
        let kept = per_lang_features(plain.path(), "a");
        assert!(kept.contains(&b"zzq".to_vec()));
        assert!(!plain.path().join("IGweights.domain").exists());
    }

    #[test]
    fn language_subset_matches_reduced_model() {
        let corpus = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        four_language_corpus(corpus.path());
        let model = train(corpus.path(), out.path(), &small_options()).unwrap();
        assert_eq!(model.num_langs(), 4);

        let labels = model.labels().to_vec();
        let keep = [0usize, 2];
        let n = model.num_langs();
        let log_ptc: Vec<f64> = model
            .log_ptc()
            .chunks(n)
            .flat_map(|row| keep.iter().map(move |&c| row[c]))
            .collect();
        let log_pc: Vec<f64> = keep.iter().map(|&c| model.log_pc()[c]).collect();
        let reduced = Model::new(
            log_ptc,
            log_pc,
            keep.iter().map(|&c| labels[c].clone()).collect(),
            model.scanner().clone(),
        )
        .unwrap();
        let reduced = Classifier::new(reduced);

        let mut c = Classifier::new(model);
        c.set_languages(&[&labels[0], &labels[2]]).unwrap();
        let texts: [&[u8]; 5] = [b"the cat", b"la casa", b"der hund", b"", b"zzz"];
        for text in texts {
            let ranked = c.rank(text);
            assert_eq!(ranked.len(), 2);
            assert_eq!(ranked, reduced.rank(text));
        }
    }

    #[test]
    fn blob_round_trip_classifies_identically() {
        let corpus = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        four_language_corpus(corpus.path());
        let model = train(corpus.path(), out.path(), &small_options()).unwrap();
        let restored = Model::from_blob(&model.to_blob().unwrap()).unwrap();
        assert_eq!(restored, model);

        let before = Classifier::new(model);
        let after = Classifier::new(restored);
        let mut rng = ChaCha8Rng::seed_from_u64(1000);
        for _ in 0..1000 {
            let len = rng.gen_range(0..64);
            let text: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let (l1, p1) = before.classify(&text);
            let (l2, p2) = after.classify(&text);
            assert_eq!(l1, l2);
            assert_eq!(p1.to_bits(), p2.to_bits());
        }
    }

    #[test]
    fn parallelism_does_not_change_the_model() {
        let corpus = tempfile::tempdir().unwrap();
        four_language_corpus(corpus.path());
        let serial = tempfile::tempdir().unwrap();
        let parallel = tempfile::tempdir().unwrap();

        let a = train(corpus.path(), serial.path(), &small_options().jobs(Some(1)).chunksize(1)).unwrap();
        let b = train(corpus.path(), parallel.path(), &small_options().jobs(Some(4)).chunksize(3)).unwrap();
        assert_eq!(a.log_pc(), b.log_pc());
        assert_eq!(a.log_ptc(), b.log_ptc());
        assert_eq!(
            read_features(&serial.path().join("LDfeats")).unwrap(),
            read_features(&parallel.path().join("LDfeats")).unwrap()
        );
    }

    #[test]
    fn artefacts_written_and_buckets_removed() {
        let corpus = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        four_language_corpus(corpus.path());
        let model = train(corpus.path(), out.path(), &small_options()).unwrap();

        for name in [
            "options.cbor",
            "lang_index",
            "domain_index",
            "paths",
            "DFfeats",
            "IGweights.lang.bin",
            "IGweights.domain",
            "LDfeats",
            "LDfeats.per_lang",
            "model",
        ] {
            assert!(out.path().join(name).is_file(), "{name} missing");
        }
        assert!(!out.path().join("buckets").exists());
        assert_eq!(TrainOptions::load(&out.path().join("options.cbor")).unwrap(), small_options());

        let features = read_features(&out.path().join("LDfeats")).unwrap();
        assert_eq!(features.len(), model.num_features());
        assert!(features.windows(2).all(|w| w[0] < w[1]));
        let loaded = crate::model::load_model(out.path().join("model").to_str().unwrap()).unwrap();
        assert_eq!(loaded.model(), &model);
    }

    #[test]
    fn debug_keeps_buckets() {
        let corpus = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        four_language_corpus(corpus.path());
        train(corpus.path(), out.path(), &small_options().debug(true)).unwrap();
        for pass in ["df", "ig", "nb"] {
            assert!(out.path().join("buckets").join(pass).is_dir(), "{pass} missing");
        }
    }

    #[test]
    fn single_language_is_certain() {
        let corpus = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_corpus(corpus.path(), &[("d1", "only", "1", b"hello"), ("d1", "only", "2", b"world")]);
        let model = train(corpus.path(), out.path(), &small_options().feats_per_lang(3)).unwrap();
        assert_eq!(model.num_langs(), 1);
        assert!(model.log_pc()[0].is_finite());
        let c = Classifier::new(model);
        assert_eq!(c.classify(b"anything"), ("only".to_string(), 1.0));
    }

    #[test]
    fn line_mode_skips_empty_languages() {
        let corpus = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_corpus(
            corpus.path(),
            &[
                ("d1", "de", "1", b"der hund\ndie katze\n"),
                ("d1", "en", "1", b"the cat\nthe dog\n"),
                ("d1", "xx", "1", b""),
            ],
        );
        let model = train(corpus.path(), out.path(), &small_options().line_level(true)).unwrap();
        assert_eq!(model.labels(), ["de".to_string(), "en".to_string()]);
        assert!(model.log_pc().iter().all(|p| p.is_finite()));
        let ranked = Classifier::new(model).rank(b"the cat");
        assert_eq!(ranked[0].0, "en");
        assert!(ranked.iter().all(|(_, p)| p.is_finite()));
    }

    #[test]
    fn word_tokens_in_the_first_pass() {
        let corpus = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        four_language_corpus(corpus.path());
        let opts = small_options().word(true).df_tokens(50);
        let model = train(corpus.path(), out.path(), &opts).unwrap();
        let df_feats = read_features(&out.path().join("DFfeats")).unwrap();
        assert!(df_feats.iter().any(|f| &**f == b"the"));
        assert!(df_feats.iter().all(|f| !f.contains(&b' ')));
        assert_eq!(Classifier::new(model).classify(b"the dog and the cat").0, "en");
    }

    #[test]
    fn bad_options_fail_before_any_output() {
        let corpus = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        four_language_corpus(corpus.path());
        let opts = small_options().line_level(true).sample(Some(2), 8);
        let target = out.path().join("run");
        assert!(train(corpus.path(), &target, &opts).unwrap_err().is_config());
        assert!(!target.exists());

        let missing = corpus.path().join("nope");
        assert!(train(&missing, &target, &small_options()).unwrap_err().is_config());
    }
}
