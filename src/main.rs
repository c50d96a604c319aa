use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use vibe_oracle::adapter::command::CommandAdapter;
use vibe_oracle::adapter::formats::{self, OutputFormat};
use vibe_oracle::adapter::mapping::ClassMapping;
use vibe_oracle::config::HarnessConfig;
use vibe_oracle::corpus::{self, Corpus};
use vibe_oracle::error::Error;
use vibe_oracle::runner::{self, RunOptions};
use vibe_oracle::{Language, MatchOptions};

const EXIT_CONFIG: u8 = 2;
const EXIT_INTEGRITY: u8 = 3;

#[derive(Parser)]
#[command(
    name = "vibe-oracle",
    about = "Check a security scanner against a corpus of vulnerable fixtures and their oracles"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Validate the corpus, scan every fixture and print the precision/recall report
    RunCorpus {
        /// Corpus root directory
        corpus_root: PathBuf,

        /// Concurrent adapter invocations
        #[arg(long)]
        workers: Option<usize>,

        /// Per-fixture adapter timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Only scan fixtures of this language
        #[arg(long)]
        language: Option<String>,

        /// Maximum line distance for a tolerant match
        #[arg(long)]
        line_tolerance: Option<u32>,

        /// Config file (default: <corpus_root>/harness.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Also write the JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Load and validate the corpus without scanning
    Validate {
        corpus_root: PathBuf,
    },

    /// Recompute fixture content hashes and rewrite stale oracle files
    Rehash {
        corpus_root: PathBuf,
    },

    /// Reconcile saved adapter output for one fixture against its oracle
    Compare {
        corpus_root: PathBuf,

        /// Fixture id
        #[arg(long)]
        fixture: String,

        /// File holding the adapter output
        #[arg(long)]
        findings: PathBuf,

        /// Output format of the findings file (default: adapter.format from config)
        #[arg(long)]
        format: Option<String>,

        #[arg(long)]
        line_tolerance: Option<u32>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the class mapping table in effect
    Mapping {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vibe_oracle=info")),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match dispatch(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => exit_with(e),
    }
}

async fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::RunCorpus {
            corpus_root,
            workers,
            timeout,
            language,
            line_tolerance,
            config,
            report,
        } => {
            let mut cfg = HarnessConfig::resolve(config.as_deref(), &corpus_root)?;
            if let Some(workers) = workers {
                cfg.run.workers = workers;
            }
            if let Some(timeout) = timeout {
                cfg.run.timeout_secs = timeout;
            }
            if let Some(tolerance) = line_tolerance {
                cfg.run.line_tolerance = tolerance;
            }
            cfg.validate()?;
            let language = language.as_deref().map(parse_language).transpose()?;
            let adapter = CommandAdapter::from_config(&cfg.adapter)?;
            let mapping = ClassMapping::from_config(&cfg.mapping)?;

            let corpus = load(&corpus_root)?;
            let mut options = RunOptions::from_config(&cfg.run);
            options.language = language;

            let summary =
                runner::run_corpus(&corpus, Arc::new(adapter), Arc::new(mapping), &options).await;
            let json = serde_json::to_string_pretty(&summary)?;
            if let Some(path) = report {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, format!("{json}\n"))?;
                info!(path = %path.display(), "report written");
            }
            println!("{json}");
            Ok(())
        }
        Command::Validate { corpus_root } => {
            let corpus = load(&corpus_root)?;
            #[derive(Serialize)]
            struct Validated<'a> {
                valid: bool,
                fixtures: Vec<&'a vibe_oracle::Fixture>,
                findings: usize,
                languages: Vec<Language>,
            }
            let out = Validated {
                valid: true,
                fixtures: corpus.entries().iter().map(|e| &e.fixture).collect(),
                findings: corpus.entries().iter().map(|e| e.oracle.findings.len()).sum(),
                languages: corpus.languages(),
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Command::Rehash { corpus_root } => {
            let changed = corpus::rehash_corpus(&corpus_root)?;
            println!("{}", serde_json::to_string_pretty(&changed)?);
            Ok(())
        }
        Command::Compare {
            corpus_root,
            fixture,
            findings,
            format,
            line_tolerance,
            config,
        } => {
            let cfg = HarnessConfig::resolve(config.as_deref(), &corpus_root)?;
            let mapping = ClassMapping::from_config(&cfg.mapping)?;
            let format: OutputFormat = match format {
                Some(f) => f.parse().map_err(Error::config)?,
                None => cfg.adapter.format,
            };
            let options = MatchOptions {
                line_tolerance: line_tolerance.unwrap_or(cfg.run.line_tolerance),
            };

            let corpus = load(&corpus_root)?;
            let output = std::fs::read_to_string(&findings).map_err(|e| {
                Error::config(format!("cannot read findings {}: {e}", findings.display()))
            })?;
            let raw = formats::parse(format, &output).map_err(|e| Error::parse(e.to_string()))?;
            let report = runner::compare_offline(&corpus, &fixture, raw, &mapping, options)
                .ok_or_else(|| Error::config(format!("no fixture with id '{fixture}'")))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Mapping { config } => {
            let cfg = match config {
                Some(path) => HarnessConfig::load(&path)?,
                None => HarnessConfig::default(),
            };
            let mapping = ClassMapping::from_config(&cfg.mapping)?;
            println!("{}", serde_json::to_string_pretty(&mapping.table())?);
            Ok(())
        }
    }
}

fn load(root: &Path) -> vibe_oracle::Result<Corpus> {
    let corpus = corpus::load_corpus(root)?;
    debug!(languages = ?corpus.languages(), "corpus languages");
    Ok(corpus)
}

fn parse_language(tag: &str) -> vibe_oracle::Result<Language> {
    tag.parse().map_err(Error::config)
}

/// Fatal errors go to stderr as a JSON document; the exit code tells
/// configuration problems apart from a corrupt corpus.
fn exit_with(err: anyhow::Error) -> ExitCode {
    #[derive(Serialize)]
    #[serde(tag = "error", rename_all = "kebab-case")]
    enum Fatal<'a> {
        Configuration { message: String },
        CorpusIntegrity { violations: &'a [vibe_oracle::IntegrityViolation] },
        Internal { message: String },
    }

    let (fatal, code) = match err.downcast_ref::<Error>() {
        Some(Error::Config(message)) => (
            Fatal::Configuration {
                message: message.clone(),
            },
            EXIT_CONFIG,
        ),
        Some(Error::Integrity(integrity)) => (
            Fatal::CorpusIntegrity {
                violations: &integrity.violations,
            },
            EXIT_INTEGRITY,
        ),
        _ => (
            Fatal::Internal {
                message: format!("{err:#}"),
            },
            1,
        ),
    };
    match serde_json::to_string_pretty(&fatal) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("{err:#}"),
    }
    ExitCode::from(code)
}
