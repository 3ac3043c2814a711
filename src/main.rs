use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
    process::ExitCode,
};

use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use log::{info, LevelFilter};
use ngram_langid::{load_model, train, LangIdError, Result, TrainOptions};

#[derive(Parser, Debug)]
#[command(name = "ngram-langid")]
#[command(about = "Train and run a byte n-gram naive Bayes language identifier")]
#[command(version)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a model from a `<domain>/<lang>/<doc>` corpus
    Train(TrainArgs),
    /// Identify the language of files, or of stdin
    Classify(ClassifyArgs),
    /// Describe a model
    Info {
        #[arg(short, long)]
        model: String,
    },
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Corpus directory, or a file listing one document path per line
    corpus: PathBuf,

    /// Output directory for the model and every stage artefact
    out_dir: PathBuf,

    #[arg(long, default_value_t = 1)]
    min_order: usize,

    #[arg(long, default_value_t = 4)]
    max_order: usize,

    /// Whitespace words instead of byte n-grams in the first pass
    #[arg(long)]
    word: bool,

    #[arg(short, long, default_value_t = 64)]
    buckets: usize,

    /// Worker threads (default: one per core)
    #[arg(short, long)]
    jobs: Option<usize>,

    #[arg(long, default_value_t = 50)]
    chunksize: usize,

    /// Keep languages present in at least this many domains
    #[arg(long, default_value_t = 1)]
    min_domain: usize,

    /// Probability of keeping each document
    #[arg(long, default_value_t = 1.0)]
    proportion: f64,

    #[arg(long, default_value_t = ngram_langid::config::DEFAULT_SEED)]
    seed: u64,

    /// Only these languages
    #[arg(long, value_delimiter = ',')]
    langs: Option<Vec<String>>,

    /// Only these domains
    #[arg(long, value_delimiter = ',')]
    domains: Option<Vec<String>>,

    /// Each line of a document is an instance
    #[arg(long)]
    line: bool,

    /// Windows drawn per document in the first pass
    #[arg(long)]
    sample_count: Option<usize>,

    #[arg(long, default_value_t = 140)]
    sample_size: usize,

    /// Count occurrences instead of documents in the first pass
    #[arg(long)]
    term_freq: bool,

    /// Keep the top N features by document frequency over all orders
    #[arg(long, conflicts_with = "df_feats_per_order")]
    df_tokens: Option<usize>,

    /// Keep the top K features by document frequency of each order
    #[arg(long)]
    df_feats_per_order: Option<usize>,

    #[arg(long, default_value_t = 300)]
    feats_per_lang: usize,

    /// Rank features by language information gain alone
    #[arg(long)]
    no_domain_ig: bool,

    /// Keep the bucket trees
    #[arg(long)]
    debug: bool,
}

impl TrainArgs {
    fn options(&self) -> TrainOptions {
        let options = TrainOptions::new()
            .orders(self.min_order, self.max_order)
            .word(self.word)
            .buckets(self.buckets)
            .jobs(self.jobs)
            .chunksize(self.chunksize)
            .min_domain(self.min_domain)
            .proportion(self.proportion)
            .seed(self.seed)
            .langs(self.langs.clone())
            .domains(self.domains.clone())
            .line_level(self.line)
            .sample(self.sample_count, self.sample_size)
            .term_freq(self.term_freq)
            .feats_per_lang(self.feats_per_lang)
            .no_domain_ig(self.no_domain_ig)
            .debug(self.debug);
        match (self.df_tokens, self.df_feats_per_order) {
            (Some(n), _) => options.df_tokens(n),
            (None, Some(k)) => options.df_feats_per_order(k),
            (None, None) => options,
        }
    }
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Model file, or the blob text itself
    #[arg(short, long)]
    model: String,

    /// Restrict the output to these languages
    #[arg(long, value_delimiter = ',')]
    langs: Option<Vec<String>>,

    /// Print every language, most likely first
    #[arg(long)]
    rank: bool,

    /// Report raw log scores instead of probabilities
    #[arg(long)]
    raw: bool,

    /// Input files; stdin when none are given
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Train(args) => run_train(args),
        Commands::Classify(args) => run_classify(args),
        Commands::Info { model } => run_info(&model),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if e.is_config() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    let level = match (quiet, verbose) {
        (0, 0) => LevelFilter::Info,
        (0, 1) => LevelFilter::Debug,
        (0, _) => LevelFilter::Trace,
        (1, _) => LevelFilter::Warn,
        _ => LevelFilter::Error,
    };
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn run_train(args: TrainArgs) -> Result<()> {
    let options = args.options();
    let model = train(&args.corpus, &args.out_dir, &options)?;
    info!(
        "model with {} languages and {} features written to {}",
        model.num_langs(),
        model.num_features(),
        args.out_dir.join("model").display()
    );
    Ok(())
}

fn run_classify(args: ClassifyArgs) -> Result<()> {
    let mut classifier = load_model(&args.model)?.with_normalisation(!args.raw);
    if let Some(langs) = &args.langs {
        classifier.set_languages(langs)?;
    }

    let inputs: Vec<(String, Vec<u8>)> = if args.files.is_empty() {
        let mut text = Vec::new();
        io::stdin()
            .read_to_end(&mut text)
            .map_err(|e| LangIdError::io("<stdin>", e))?;
        vec![("-".to_string(), text)]
    } else {
        args.files
            .iter()
            .map(|p| {
                fs::read(p)
                    .map(|text| (p.display().to_string(), text))
                    .map_err(|e| LangIdError::io(p, e))
            })
            .collect::<Result<_>>()?
    };

    for (name, text) in &inputs {
        if args.rank {
            let ranked: Vec<String> = classifier
                .rank(text)
                .into_iter()
                .map(|(lang, score)| format!("{lang}:{score:.6}"))
                .collect();
            println!("{name}\t{}", ranked.join(" "));
        } else {
            let (lang, score) = classifier.classify(text);
            println!("{name}\t{lang}\t{score:.6}");
        }
    }
    Ok(())
}

fn run_info(model: &str) -> Result<()> {
    let classifier = load_model(model)?;
    println!("languages:  {}", classifier.labels().len());
    println!("features:   {}", classifier.num_features());
    println!("states:     {}", classifier.num_states());
    println!("state type: {:?}", classifier.scanner_width());
    println!("labels:     {}", classifier.labels().join(","));
    Ok(())
}
