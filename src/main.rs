use anyhow::{Context, Result};
use chunkfilter::corpus::Corpus;
use chunkfilter::index::bitmap::init_default_backend;
use chunkfilter::index::store::{load_corpus, load_filter_index, load_relations, save_filter_index};
use chunkfilter::index::{build_filter_index_for_corpus, default_backend, summarize_filter_index, FilterIndex};
use chunkfilter::output;
use chunkfilter::query::{AllowlistOptions, CollectingSink, CompiledFilters, FilterExecutor, Filters};
use chunkfilter::utils::{get_config_path, get_index_path, is_index_fresh, EngineConfig};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "chunkfilter")]
#[command(about = "Metadata filter index for code chunk search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the app data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a filter index from a chunk corpus
    Index {
        /// Chunk corpus (JSON array)
        corpus: PathBuf,

        /// Output path (defaults to the app data directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Char-gram length for file-path prefiltering
        #[arg(long)]
        chargram_n: Option<usize>,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },
    /// Filter a chunk corpus
    Query(QueryArgs),
    /// Show filter index statistics
    Stats {
        /// Index file
        index: PathBuf,
    },
    /// Print the effective engine configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Chunk corpus (JSON array)
    corpus: PathBuf,

    /// Filter index (defaults to the one built for this corpus, if any)
    #[arg(short, long)]
    index: Option<PathBuf>,

    /// Scan without an index
    #[arg(long, conflicts_with = "index")]
    no_index: bool,

    /// Per-file relations (JSON object keyed by file path)
    #[arg(long)]
    relations: Option<PathBuf>,

    /// Filter request as JSON
    #[arg(short, long)]
    filters: Option<String>,

    /// Filter request read from a JSON file
    #[arg(long, conflicts_with = "filters")]
    filters_file: Option<PathBuf>,

    #[arg(long)]
    ext: Option<String>,

    #[arg(long)]
    lang: Option<String>,

    /// Chunk kind
    #[arg(long = "type")]
    kind: Option<String>,

    #[arg(long)]
    author: Option<String>,

    /// File substring or /regex/flags (repeatable)
    #[arg(long)]
    file: Vec<String>,

    /// Case-sensitive file matching
    #[arg(long)]
    case_file: bool,

    /// Print the allowlist of chunk ids instead of chunks
    #[arg(long)]
    ids: bool,

    /// With --ids, return index candidates without scanning
    #[arg(long, requires = "ids")]
    index_only: bool,

    /// Print chunks as JSON
    #[arg(long)]
    json: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Print filter diagnostics to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let initializing = matches!(cli.command, Commands::Config { init: true });
    let config = match &cli.config {
        Some(path) if initializing && !path.exists() => EngineConfig::default(),
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };
    init_default_backend(config.bitmap_backend);

    match cli.command {
        Commands::Index {
            corpus,
            output,
            chargram_n,
            quiet,
        } => run_index(&config, &corpus, output, chargram_n, quiet)?,
        Commands::Query(args) => run_query(&config, args)?,
        Commands::Stats { index } => {
            let index = load_filter_index(
                &index,
                default_backend(),
                config.bitmap_min_size,
                config.max_index_json_bytes_soft,
            )?;
            println!("{}", summarize_filter_index(&index));
        }
        Commands::Config { init } => {
            if init {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => get_config_path()?,
                };
                config.save_to(&path)?;
                eprintln!("Wrote {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_index(
    config: &EngineConfig,
    corpus_path: &Path,
    output: Option<PathBuf>,
    chargram_n: Option<usize>,
    quiet: bool,
) -> Result<()> {
    let corpus = load_corpus(corpus_path)?;
    let mut index_config = config.index_config();
    if let Some(n) = chargram_n {
        index_config.file_chargram_n = n;
    }

    #[cfg(feature = "progress")]
    let index = chunkfilter::index::build::build_filter_index_with_progress(
        corpus.chunks(),
        &index_config,
        default_backend(),
        quiet,
    );
    #[cfg(not(feature = "progress"))]
    let index = {
        let _ = quiet;
        build_filter_index_for_corpus(&corpus, &index_config, default_backend())
    };

    let output = match output {
        Some(path) => path,
        None => get_index_path(corpus_path)?,
    };
    let bytes = save_filter_index(&index, &output)?;
    println!(
        "Indexed {} chunks in {} files -> {} ({})",
        corpus.len(),
        index.file_count(),
        output.display(),
        chunkfilter::index::stats::format_size(bytes)
    );
    Ok(())
}

/// Merge the JSON request with shorthand flags; flags win
fn build_request(args: &QueryArgs) -> Result<Filters> {
    let base = if let Some(json) = &args.filters {
        serde_json::from_str(json).context("Failed to parse --filters JSON")?
    } else if let Some(path) = &args.filters_file {
        let content = std::fs::read_to_string(path).context("Failed to read filters file")?;
        serde_json::from_str(&content).context("Failed to parse filters file")?
    } else {
        Value::Object(Map::new())
    };

    let Value::Object(mut request) = base else {
        anyhow::bail!("filter request must be a JSON object");
    };
    let shorthand = [
        ("ext", &args.ext),
        ("lang", &args.lang),
        ("type", &args.kind),
        ("author", &args.author),
    ];
    for (key, value) in shorthand {
        if let Some(value) = value {
            request.insert(key.to_string(), Value::String(value.clone()));
        }
    }
    if !args.file.is_empty() {
        request.insert("file".to_string(), Value::from(args.file.clone()));
    }
    if args.case_file {
        request.insert("caseFile".to_string(), Value::Bool(true));
    }
    Ok(Filters::from_json(&Value::Object(request)))
}

fn resolve_index(config: &EngineConfig, args: &QueryArgs, corpus: &Corpus) -> Result<Option<FilterIndex>> {
    if args.no_index {
        return Ok(None);
    }
    let backend = default_backend();
    if let Some(path) = &args.index {
        let index = load_filter_index(path, backend, config.bitmap_min_size, config.max_index_json_bytes_soft)?;
        return Ok(Some(index));
    }
    let default_path = get_index_path(&args.corpus)?;
    if !default_path.exists() {
        tracing::debug!("no saved filter index; building in memory");
    } else if !is_index_fresh(&args.corpus, &default_path) {
        tracing::warn!(index = %default_path.display(), "saved filter index is older than the corpus; rebuilding in memory");
    } else {
        let index = load_filter_index(
            &default_path,
            backend,
            config.bitmap_min_size,
            config.max_index_json_bytes_soft,
        )?;
        return Ok(Some(index));
    }
    Ok(Some(build_filter_index_for_corpus(corpus, &config.index_config(), backend)))
}

fn run_query(config: &EngineConfig, args: QueryArgs) -> Result<()> {
    let request = build_request(&args)?;
    let corpus = load_corpus(&args.corpus)?;
    let index = resolve_index(config, &args, &corpus)?;
    let relations = args.relations.as_deref().map(load_relations).transpose()?;

    let mut sink = CollectingSink::new();
    let compiled = CompiledFilters::compile_with(&request, &config.regex, &mut sink);
    let executor = FilterExecutor::new(&corpus)
        .with_index(index.as_ref())
        .with_relations(relations.as_ref())
        .with_backend(default_backend())
        .with_options(config.intersect_options());

    let color = !args.no_color;
    if args.ids {
        let options = AllowlistOptions {
            index_only: args.index_only,
        };
        let allowlist = executor.filter_chunk_ids(&compiled, options, &mut sink)?;
        output::print_allowlist(allowlist.as_ref(), color)?;
    } else {
        let chunks = executor.filter_chunks(&compiled, &mut sink)?;
        if args.json {
            output::print_chunks_json(&chunks)?;
        } else {
            output::print_chunks(&chunks, color)?;
        }
    }

    if args.verbose {
        output::print_events(&sink.events, color)?;
    }
    Ok(())
}
