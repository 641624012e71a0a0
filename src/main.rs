//! Plugscan - download, scan and triage registry plugins at scale.
//!
//! Plugscan walks a plugin registry, keeps a ledger of every plugin version
//! it has seen, materializes sources on disk and records scanner findings.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use plugscan::core::Config;
use plugscan::{
    ArtifactStore, AuditOptions, Auditor, DownloadPipeline, FilterEngine, FindingKey,
    FindingQuery, Interrupt, Ledger, RegistryClient, RegistryQuery, RunMode, SemgrepScanner,
    VersionSource,
};

/// Download, scan and triage plugins from a plugin registry
#[derive(Parser)]
#[command(name = "plugscan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Print detailed messages
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ./.plugscan.toml, then the global config)
    #[arg(long, global = true, env = "PLUGSCAN_CONFIG")]
    config_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and/or audit plugins
    Run(RunArgs),

    /// List recorded findings
    Findings {
        #[command(flatten)]
        ledger: LedgerArgs,

        /// Only findings for this plugin
        #[arg(long)]
        slug: Option<String>,

        /// Only findings not yet triaged
        #[arg(long)]
        untriaged: bool,

        /// Only findings recorded against an outdated version
        #[arg(long)]
        outdated: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Mark a finding as triaged (or clear the flag)
    #[command(disable_version_flag = true)]
    Triage {
        #[command(flatten)]
        ledger: LedgerArgs,

        /// Plugin slug
        slug: String,

        /// Scanned version
        version: String,

        /// File path as recorded
        file_path: String,

        /// Rule identifier
        check_id: String,

        /// First line of the finding
        start_line: u32,

        /// Last line of the finding
        end_line: u32,

        /// Clear the triage flag instead of setting it
        #[arg(long)]
        clear: bool,
    },

    /// List plugin versions known to the ledger
    Plugins {
        #[command(flatten)]
        ledger: LedgerArgs,

        /// Only versions of this plugin
        #[arg(long)]
        slug: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Location of an existing ledger.
#[derive(Args)]
struct LedgerArgs {
    /// Download directory of the run that wrote the ledger
    #[arg(short, long)]
    download_dir: Option<PathBuf>,

    /// Ledger database (defaults to <download-dir>/plugscan.db)
    #[arg(short = 'o', long)]
    output_db: Option<PathBuf>,
}

impl LedgerArgs {
    /// Open the ledger a previous run wrote. Never creates one.
    fn open(&self, config: &Config) -> Result<Ledger> {
        let path = match (&self.output_db, &self.download_dir) {
            (Some(db), _) => db.clone(),
            (None, Some(dir)) => dir.join("plugscan.db"),
            (None, None) => config.database_path(),
        };

        if !path.is_file() {
            bail!(
                "No ledger at {}; run `plugscan run` first or pass --download-dir/--output-db",
                path.display()
            );
        }
        open_ledger(config, Some(&path))
    }
}

#[derive(Args)]
struct RunArgs {
    /// Operative mode: download plugins, audit the plugins folder, or both
    #[arg(short, long, value_enum, default_value = "download")]
    mode: RunMode,

    /// Directory containing the plugins folder
    #[arg(short, long)]
    download_dir: Option<PathBuf>,

    /// Ledger database (defaults to <download-dir>/plugscan.db)
    #[arg(short = 'o', long)]
    output_db: Option<PathBuf>,

    /// Delete every recorded finding before running
    #[arg(long)]
    clear_results: bool,

    /// Max number of months since the last update
    #[arg(long, value_name = "MONTHS")]
    last_updated: Option<u32>,

    /// Min number of active installs
    #[arg(long, value_name = "COUNT")]
    active_installs: Option<u64>,

    /// Author's username to filter plugins
    #[arg(long)]
    author: Option<String>,

    /// Tag to filter plugins
    #[arg(long)]
    tag: Option<String>,

    /// Search term to filter plugins
    #[arg(long)]
    search: Option<String>,

    /// Scanner rule set (audit mode only)
    #[arg(long, visible_alias = "config")]
    ruleset: Option<String>,

    /// Choose plugins to audit from the ledger instead of the plugins folder
    #[arg(long)]
    from_ledger: bool,

    /// Skip the registry version check after each scan
    #[arg(long)]
    no_drift_check: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.download_dir {
            config.paths.download_dir.clone_from(dir);
        }
        if let Some(db) = &self.output_db {
            config.paths.database = Some(db.clone());
        }
        if let Some(months) = self.last_updated {
            config.filter.max_months_since_update = months;
        }
        if let Some(installs) = self.active_installs {
            config.filter.min_active_installs = installs;
        }
        if let Some(author) = &self.author {
            config.filter.author.clone_from(author);
        }
        if let Some(tag) = &self.tag {
            config.filter.tag.clone_from(tag);
        }
        if let Some(search) = &self.search {
            config.filter.search.clone_from(search);
        }
        if let Some(ruleset) = &self.ruleset {
            config.scanner.ruleset.clone_from(ruleset);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    let config = Config::load(cli.config_file.as_deref())?;

    match cli.command {
        Commands::Run(args) => cmd_run(config, &args),
        Commands::Findings { ledger, slug, untriaged, outdated, format } => {
            let ledger = ledger.open(&config)?;
            cmd_findings(&ledger, slug, untriaged, outdated, &format)
        }
        Commands::Triage {
            ledger,
            slug,
            version,
            file_path,
            check_id,
            start_line,
            end_line,
            clear,
        } => {
            let ledger = ledger.open(&config)?;
            let key = FindingKey { slug, version, file_path, check_id, start_line, end_line };
            cmd_triage(&ledger, &key, !clear)
        }
        Commands::Plugins { ledger, slug, format } => {
            let ledger = ledger.open(&config)?;
            cmd_plugins(&ledger, slug.as_deref(), &format)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "plugscan", &mut io::stdout());
            Ok(())
        }
    }
}

/// Open the ledger, failing the whole run if it is unreachable.
fn open_ledger(config: &Config, explicit: Option<&Path>) -> Result<Ledger> {
    let path = explicit.map_or_else(|| config.database_path(), Path::to_path_buf);
    Ledger::open(&path).with_context(|| format!("Failed to open ledger {}", path.display()))
}

fn cmd_run(mut config: Config, args: &RunArgs) -> Result<()> {
    args.apply(&mut config);

    let ledger = open_ledger(&config, None)?;
    let store = ArtifactStore::new(&config.paths.download_dir);
    let filter = FilterEngine::new(config.filter.clone());
    let registry = RegistryClient::new(&config.registry).context("Failed to build registry client")?;

    let interrupt = Interrupt::new();
    if let Err(e) = interrupt.install_handler() {
        warn!(error = %e, "Could not install Ctrl-C handler");
    }

    if args.clear_results {
        let removed = ledger.clear_findings().context("Can't clear the audit results")?;
        info!(removed, "Cleared audit results");
    }

    if args.mode.downloads() {
        info!("Started downloading");
        let query = RegistryQuery::from_filter(&config.filter, config.registry.per_page);
        DownloadPipeline::new(&registry, &registry, &store, &ledger, &filter, query)
            .with_interrupt(interrupt.clone())
            .run();
    }

    if args.mode.audits() && !interrupt.is_set() {
        info!("Started auditing");
        let scanner = SemgrepScanner::new(&config.scanner);
        let options = AuditOptions {
            ruleset: config.scanner.ruleset.clone(),
            version_source: if args.from_ledger { VersionSource::Ledger } else { VersionSource::Disk },
        };

        let mut auditor = Auditor::new(&ledger, &store, &scanner, &filter, options)
            .with_interrupt(interrupt.clone());
        if !args.no_drift_check {
            auditor = auditor.with_registry(&registry);
        }

        let summary = auditor.run();
        for drift in &summary.drifted {
            println!(
                "drift: {} scanned at {}, registry has {}",
                drift.slug, drift.scanned_version, drift.registry_version
            );
        }
    }

    Ok(())
}

fn cmd_findings(
    ledger: &Ledger,
    slug: Option<String>,
    untriaged: bool,
    outdated: bool,
    format: &str,
) -> Result<()> {
    let query =
        FindingQuery { slug, version: None, untriaged_only: untriaged, outdated_only: outdated };
    let findings = ledger.findings(&query)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&findings)?);
        return Ok(());
    }

    if findings.is_empty() {
        println!("No findings.");
        return Ok(());
    }

    for view in &findings {
        let f = &view.finding;
        let mark = if f.triaged { "x" } else { " " };
        print!(
            "[{mark}] {} {} {}:{}-{} {}",
            f.slug, f.version, f.file_path, f.start_line, f.end_line, f.check_id
        );
        if view.outdated {
            print!(" (outdated, latest {})", view.latest_version.as_deref().unwrap_or("?"));
        }
        println!();
    }
    println!("\n{} finding(s)", findings.len());

    Ok(())
}

fn cmd_triage(ledger: &Ledger, key: &FindingKey, triaged: bool) -> Result<()> {
    if ledger.set_triaged(key, triaged)? {
        let state = if triaged { "triaged" } else { "untriaged" };
        println!("Marked {} {} {}:{} as {state}.", key.slug, key.version, key.file_path, key.start_line);
    } else {
        println!("No finding matches {} {} {} {}.", key.slug, key.version, key.file_path, key.check_id);
    }
    Ok(())
}

fn cmd_plugins(ledger: &Ledger, slug: Option<&str>, format: &str) -> Result<()> {
    let plugins = ledger.plugins(slug)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&plugins)?);
        return Ok(());
    }

    if plugins.is_empty() {
        println!("No plugins recorded.");
        return Ok(());
    }

    for plugin in &plugins {
        let scanned = plugin
            .last_time_scanned
            .map_or_else(|| "never".to_string(), |d| d.format("%Y-%m-%d").to_string());
        println!(
            "{:<40} {:<14} installs={:<10} scanned={}",
            plugin.slug, plugin.version, plugin.active_installs, scanned
        );
    }

    Ok(())
}
