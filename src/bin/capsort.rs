use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use polars::prelude::*;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use capsort::audit;
use capsort::{IntakeConfig, IntakeEngine, NameNormalizer, OrderKeyIndex, PlacementKind, ReactionClassifier, ReadinessReport};

/// capsort CLI
#[derive(Parser)]
#[command(name = "capsort")]
#[command(version)]
#[command(about = "Sort capillary reaction files into order folders and gate them for base-calling", long_about = None)]
struct Cli {
    /// Config file (TOML). Falls back to $CAPSORT_CONFIG, then ./capsort.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sort every run folder in a data folder, clean up, then sweep readiness
    Sort {
        /// Today's data folder
        #[arg(long)]
        data: PathBuf,
        /// Order key (tab-delimited); overrides `key_file` from the config
        #[arg(long)]
        key: Option<PathBuf>,
        /// Stop after sorting and cleanup
        #[arg(long)]
        skip_readiness: bool,
    },

    /// Readiness sweep only: park incomplete orders, restore completed ones
    Readiness {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        key: Option<PathBuf>,
    },

    /// Compare order folders against the order key
    Audit {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        key: Option<PathBuf>,
        /// Write the audit as tab-delimited text
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show class and normalized name for raw file names (no filesystem access)
    Classify {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, source) = IntakeConfig::resolve(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.logging.level);
    info!("capsort {}", capsort::VERSION);
    info!("Config from {}", source);

    match cli.command {
        Commands::Sort { data, key, skip_readiness } => {
            let key_path = key_path(key, &config)?;
            let (engine, reinjects) = IntakeEngine::load(config, &key_path)
                .with_context(|| format!("loading order key {}", key_path.display()))?;
            if !reinjects.worksheets_failed.is_empty() {
                info!("{} reinject worksheet(s) could not be read", reinjects.worksheets_failed.len());
            }
            let summary = engine.sort(&data).with_context(|| format!("sorting {}", data.display()))?;

            print_table(df!(
                "metric" => ["moved", "alternate (collision)", "alternate (reinject)", "unresolved", "failed", "tie-breaks"],
                "count" => [
                    summary.moved_to_main() as u64,
                    summary.diverted(PlacementKind::Collision) as u64,
                    summary.diverted(PlacementKind::Reinject) as u64,
                    summary.unresolved.len() as u64,
                    summary.failed.len() as u64,
                    summary.ambiguous.len() as u64,
                ],
            )?);
            if !summary.unresolved.is_empty() || !summary.failed.is_empty() {
                let mut files: Vec<String> = summary.unresolved.iter().map(|p| p.display().to_string()).collect();
                let mut issues: Vec<String> = vec!["no order".to_string(); files.len()];
                for (p, e) in &summary.failed {
                    files.push(p.display().to_string());
                    issues.push(e.clone());
                }
                print_table(df!("file" => files, "issue" => issues)?);
            }
            let c = &summary.cleanups;
            print_table(df!(
                "run_folder" => c.iter().map(|r| r.run_folder.display().to_string()).collect::<Vec<_>>(),
                "relocated" => c.iter().map(|r| r.relocated as u64).collect::<Vec<_>>(),
                "retained" => c.iter().map(|r| r.retained as u64).collect::<Vec<_>>(),
                "unresolved_ab1" => c.iter().map(|r| r.unresolved_ab1 as u64).collect::<Vec<_>>(),
                "removed" => c.iter().map(|r| r.removed).collect::<Vec<_>>(),
                "failures" => c.iter().map(|r| r.failures.len() as u64).collect::<Vec<_>>(),
            )?);

            if !skip_readiness {
                let report = engine.readiness(&data).with_context(|| format!("readiness sweep of {}", data.display()))?;
                print_readiness(&report)?;
            }
        }

        Commands::Readiness { data, key } => {
            let key_path = key_path(key, &config)?;
            let key = load_key(&key_path, &config)?;
            let engine = IntakeEngine::new(config, key, Default::default());
            let report = engine.readiness(&data).with_context(|| format!("readiness sweep of {}", data.display()))?;
            print_readiness(&report)?;
        }

        Commands::Audit { data, key, out } => {
            let key_path = key_path(key, &config)?;
            let key = load_key(&key_path, &config)?;
            let audits = audit::audit_data_folder(&data, &key, &config).with_context(|| format!("auditing {}", data.display()))?;
            print_table(df!(
                "order" => audits.iter().map(|a| a.order_number.clone()).collect::<Vec<_>>(),
                "account" => audits.iter().map(|a| a.account.clone()).collect::<Vec<_>>(),
                "expected" => audits.iter().map(|a| a.expected as u64).collect::<Vec<_>>(),
                "matched" => audits.iter().map(|a| a.matched as u64).collect::<Vec<_>>(),
                "missing" => audits.iter().map(|a| a.missing.join(", ")).collect::<Vec<_>>(),
                "unexpected" => audits.iter().map(|a| a.unexpected.join(", ")).collect::<Vec<_>>(),
                "outputs" => audits.iter().map(|a| a.outputs_present.len() as u64).collect::<Vec<_>>(),
                "status" => audits.iter().map(|a| a.status.to_string()).collect::<Vec<_>>(),
            )?);
            if let Some(out) = out {
                let f = std::fs::File::create(&out).with_context(|| format!("creating {}", out.display()))?;
                audit::write_tsv(&audits, f).with_context(|| format!("writing {}", out.display()))?;
                info!("Audit written to {}", out.display());
            }
        }

        Commands::Classify { names } => {
            let classifier = ReactionClassifier::from_config(&config);
            let files: Vec<_> = names.iter().map(|n| classifier.reaction_file(Path::new(""), n)).collect();
            print_table(df!(
                "raw_name" => files.iter().map(|f| f.raw_name.clone()).collect::<Vec<_>>(),
                "class" => files.iter().map(|f| f.class.to_string()).collect::<Vec<_>>(),
                "normalized" => files.iter().map(|f| f.normalized.clone()).collect::<Vec<_>>(),
                "run_tag" => files.iter().map(|f| f.run_id.clone()).collect::<Vec<_>>(),
            )?);
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let fallback = level.to_string();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn key_path(cli: Option<PathBuf>, config: &IntakeConfig) -> Result<PathBuf> {
    match cli.or_else(|| config.key_file.clone()) {
        Some(p) => Ok(p),
        None => bail!("no order key given: pass --key or set key_file in the config"),
    }
}

fn load_key(path: &Path, config: &IntakeConfig) -> Result<OrderKeyIndex> {
    OrderKeyIndex::load(path, &NameNormalizer::from_config(config))
        .with_context(|| format!("loading order key {}", path.display()))
}

fn print_readiness(report: &ReadinessReport) -> Result<()> {
    let a = &report.assessments;
    print_table(df!(
        "folder" => a.iter().map(|x| x.current_path().display().to_string()).collect::<Vec<_>>(),
        "state" => a.iter().map(|x| x.state.to_string()).collect::<Vec<_>>(),
        "reason" => a.iter().map(|x| x.reason.as_ref().map(ToString::to_string).unwrap_or_default()).collect::<Vec<_>>(),
        "ab1" => a.iter().map(|x| x.ab1_count as u64).collect::<Vec<_>>(),
        "expected" => a.iter().map(|x| x.expected.map(|e| e as u64)).collect::<Vec<_>>(),
        "exempt" => a.iter().map(|x| x.handoff_exempt).collect::<Vec<_>>(),
        "handoff" => a.iter().map(|x| x.outcome.to_string()).collect::<Vec<_>>(),
    )?);
    info!(
        "{} folder(s) ready for hand-off, {} parked, {} restored",
        report.handoff_queue().count(),
        report.parked.len(),
        report.restored.len()
    );
    Ok(())
}

fn print_table(df: DataFrame) {
    // Read by polars' pretty-printer: show every row and column untruncated.
    std::env::set_var("POLARS_FMT_TABLE_FORMATTING", "UTF8_FULL");
    std::env::set_var("POLARS_FMT_MAX_COLS", "100000");
    std::env::set_var("POLARS_FMT_MAX_ROWS", "1000000");
    std::env::set_var("POLARS_FMT_STR_LEN", "100000");
    std::env::set_var("POLARS_TABLE_WIDTH", "65535");
    println!("{}", df);
}
