use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use strata_core::{OutputFormat, StrataConfig, CONFIG_FILE_NAME};
use strata_lens::embedding::embedder_from_config;
use strata_lens::{Engine, IndexReport};

#[derive(Parser)]
#[command(
    name = "strata",
    version,
    about = "Semantic search over git history",
    long_about = "Strata indexes every file and commit message in a git repository's history\n\
                   and answers free-text queries with ranked files and the lines that match.\n\n\
                   Examples:\n  \
                     strata init                       Create a .strata.toml config file\n  \
                     strata index --path .             Index history (only new chunks are embedded)\n  \
                     strata search 'tomato pizza'      Rank files for a query\n  \
                     strata search 'auth' --lines      Include matching line numbers\n  \
                     strata stats                      Show index statistics"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: <path>/.strata.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable listing (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Index the repository's history
    #[command(long_about = "Index the repository's history.\n\n\
        Walks every commit, keeps the latest content of each file plus every commit\n\
        message that touched it, and embeds chunks the index does not hold yet.\n\
        Re-running on unchanged history embeds nothing.\n\n\
        Examples:\n  strata index\n  strata index --path ../other-repo")]
    Index {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Search the repository's history
    #[command(long_about = "Search the repository's history.\n\n\
        Indexes first (cheap when nothing changed), then ranks files by similarity\n\
        to the query, boosted by exact phrase, token and file name matches.\n\n\
        Examples:\n  strata search 'tomato pizza'\n  strata search 'smartphone' --lines --limit 5")]
    Search {
        /// Free-text query
        query: String,

        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Maximum results to return (default: 10)
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Show the matching line numbers of each file
        #[arg(long)]
        lines: bool,
    },
    /// Show index statistics
    Stats {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Create a default .strata.toml configuration file
    Init,
    /// Generate shell completions
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    path: String,
    score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    lines: Option<Vec<usize>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchOutput<'a> {
    query: &'a str,
    index: &'a IndexReport,
    results: Vec<SearchHit>,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1mstrata\x1b[0m v{version}: semantic search over git history\n");
        println!("Quick start:");
        println!("  \x1b[36mstrata init\x1b[0m                  Create a .strata.toml config file");
        println!("  \x1b[36mstrata index\x1b[0m                 Index the current repository");
        println!("  \x1b[36mstrata search 'query'\x1b[0m        Rank files for a query\n");
    } else {
        println!("strata v{version}: semantic search over git history\n");
        println!("Quick start:");
        println!("  strata init                  Create a .strata.toml config file");
        println!("  strata index                 Index the current repository");
        println!("  strata search 'query'        Rank files for a query\n");
    }

    println!("Run 'strata <command> --help' for details.");
}

fn setup_tracing(verbose: bool) {
    let default = if verbose { "strata=debug" } else { "strata=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_engine(path: &Path, config_path: Option<&Path>) -> Result<Engine> {
    let config = match config_path {
        Some(file) => StrataConfig::from_file(file)?,
        None => StrataConfig::load(path)?,
    };
    let embedder = embedder_from_config(&config.embedding)?;
    Ok(Engine::open_with(path, config, embedder)?)
}

fn analyze(engine: &mut Engine) -> Result<IndexReport> {
    let spinner = if std::io::stderr().is_terminal() {
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_style(
            indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
                .into_diagnostic()?,
        );
        pb.set_message(format!("Indexing {} ...", engine.working_dir().display()));
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let report = engine.analyze_codebase().inspect_err(|_e| {
        if let Some(pb) = &spinner {
            pb.finish_with_message("Failed");
        }
    })?;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    for failure in &report.failures {
        eprintln!(
            "warning: could not embed {} chunk of {}: {}",
            failure.source_kind, failure.path, failure.message
        );
    }
    Ok(report)
}

fn print_report(report: &IndexReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("# Index\n");
            println!("| Files | Chunks | Embedded | Reused | Failed |");
            println!("|-------|--------|----------|--------|--------|");
            println!(
                "| {} | {} | {} | {} | {} |",
                report.files,
                report.chunks,
                report.embedded,
                report.reused,
                report.failures.len()
            );
        }
        OutputFormat::Text => {
            println!(
                "Indexed {} files: {} chunks ({} embedded, {} reused, {} failed)",
                report.files,
                report.chunks,
                report.embedded,
                report.reused,
                report.failures.len()
            );
        }
    }
    Ok(())
}

fn format_lines(lines: &[usize]) -> String {
    lines
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

const DEFAULT_CONFIG: &str = r#"# Strata Configuration

[embedding]
# "candle" (local sentence model), "hashing" (offline, no semantics) or "voyage"
# provider = "candle"
# model = "sentence-transformers/all-MiniLM-L6-v2"  # or a local model directory
# dimensions = 1024  # hashing only
# api_key = "..."  # voyage only, or set VOYAGE_API_KEY

[index]
# path = ".strata/index.db"
# max_chunk_chars = 400
# batch_size = 64

[history]
# branch = "main"

[search]
# top_k = 50
# exact_boost = 1.0
# token_boost = 1.0
# filename_boost = 0.5
# line_threshold = 0.2
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
            return Ok(());
        }
        Some(Command::Index { ref path }) => {
            let mut engine = open_engine(path, cli.config.as_deref())?;
            let report = analyze(&mut engine)?;
            print_report(&report, cli.format)?;
        }
        Some(Command::Search {
            ref query,
            ref path,
            limit,
            lines,
        }) => {
            let mut engine = open_engine(path, cli.config.as_deref())?;
            let report = analyze(&mut engine)?;
            if cli.verbose {
                eprintln!(
                    "{} chunks embedded, {} reused",
                    report.embedded, report.reused
                );
            }

            engine.query(query.as_str());
            engine.fetch().await?;

            let mut hits = Vec::new();
            for result in engine.get_results().iter().take(limit) {
                let matched = if lines {
                    Some(result.lines(query).await?.into_iter().collect())
                } else {
                    None
                };
                hits.push(SearchHit {
                    path: result.path().to_string(),
                    score: result.score(),
                    lines: matched,
                });
            }

            match cli.format {
                OutputFormat::Json => {
                    let output = SearchOutput {
                        query,
                        index: &report,
                        results: hits,
                    };
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&output).into_diagnostic()?
                    );
                }
                OutputFormat::Markdown => {
                    if hits.is_empty() {
                        println!("No results found.");
                    } else {
                        println!("# Search Results\n");
                        for (i, hit) in hits.iter().enumerate() {
                            println!("## {}. `{}` (score: {:.4})\n", i + 1, hit.path, hit.score);
                            if let Some(matched) = &hit.lines {
                                println!("Lines: {}\n", format_lines(matched));
                            }
                        }
                    }
                }
                OutputFormat::Text => {
                    if hits.is_empty() {
                        println!("No results found.");
                    } else {
                        for (i, hit) in hits.iter().enumerate() {
                            println!("{}. {} (score: {:.4})", i + 1, hit.path, hit.score);
                            if let Some(matched) = &hit.lines {
                                if !matched.is_empty() {
                                    println!("   lines: {}", format_lines(matched));
                                }
                            }
                        }
                    }
                }
            }
        }
        Some(Command::Stats { ref path }) => {
            let engine = open_engine(path, cli.config.as_deref())?;
            let stats = engine.stats()?;
            let index_path = engine.config().index.resolve(engine.working_dir());

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&stats).into_diagnostic()?);
                }
                OutputFormat::Markdown => {
                    println!("# Index Statistics\n");
                    println!("- **Location:** `{}`", index_path.display());
                    println!("- **Records:** {}", stats.total_records);
                    println!("- **Files:** {}", stats.total_files);
                    println!("- **Size:** {} bytes", stats.index_size_bytes);
                }
                OutputFormat::Text => {
                    println!("Index: {}", index_path.display());
                    println!(
                        "{} records from {} files ({} bytes)",
                        stats.total_records, stats.total_files, stats.index_size_bytes
                    );
                }
            }
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE_NAME);
            if path.exists() {
                miette::bail!("{CONFIG_FILE_NAME} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE_NAME} with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "strata", &mut std::io::stdout());
        }
    }

    Ok(())
}
