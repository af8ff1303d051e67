use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use media_date_renamer_core::{
    app_paths, load_config, rename_folder, unique_log_path, DateResolver, LogFileReporter,
    PlanOptions, RenamePlan, Reporter, RunContext, RunEvent, RunOptions, RunStage,
};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "media-date-renamer")]
#[command(about = "Renames photos and videos in a folder after the date they were taken")]
#[command(
    after_help = "Runs are dry by default. Each run logs to the application log folder; \
--apply also writes a log into the renamed folder."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Rename(RenameArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
}

#[derive(Debug, Args)]
struct RenameArgs {
    #[arg(long)]
    folder: PathBuf,
    /// Rename the files. Without it the run only plans: nothing in the folder
    /// changes and the log goes to the application log folder alone.
    #[arg(long, default_value_t = false)]
    apply: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    /// IANA zone name, e.g. America/New_York
    #[arg(long)]
    timezone: Option<String>,
    /// File-name suffix to skip; repeatable. Replaces the configured list.
    #[arg(long = "exclude-ext")]
    exclude_ext: Vec<String>,
    #[arg(long)]
    ffprobe: Option<PathBuf>,
    #[arg(long)]
    probe_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// Prints stage changes to stderr and appends log lines to the run's log files.
struct CliReporter {
    files: LogFileReporter,
}

impl Reporter for CliReporter {
    fn report(&mut self, event: &RunEvent) {
        if let RunEvent::Stage(stage) = event {
            eprintln!(
                "[{}/{}] {}",
                stage.index(),
                RunStage::Complete.index(),
                stage.label()
            );
        }
        self.files.report(event);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Rename(args) => cmd_rename(args),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

fn cmd_rename(args: RenameArgs) -> Result<()> {
    let mut config = load_config()?;
    if let Some(timezone) = args.timezone {
        config.timezone = timezone;
    }
    if !args.exclude_ext.is_empty() {
        config.excluded_extensions = args.exclude_ext;
    }
    if let Some(ffprobe) = args.ffprobe {
        config.ffprobe_path = ffprobe;
    }
    if args.probe_timeout_secs.is_some() {
        config.probe_timeout_secs = args.probe_timeout_secs;
    }

    let resolver = DateResolver::from_config(&config)?;
    let folder = fs::canonicalize(&args.folder)
        .with_context(|| format!("folder does not exist: {}", args.folder.display()))?;

    let paths = app_paths()?;
    let mut log_paths = vec![unique_log_path(&paths.log_dir, &config.log_base_name)];
    if args.apply {
        log_paths.push(unique_log_path(&folder, &config.log_base_name));
        // The folder log must never become a rename candidate itself.
        if !config
            .excluded_extensions
            .iter()
            .any(|ext| ext.trim().eq_ignore_ascii_case(".txt"))
        {
            config.excluded_extensions.push(".txt".to_string());
        }
    }

    tracing::debug!(
        folder = %folder.display(),
        apply = args.apply,
        timezone = %config.timezone,
        "starting rename run"
    );

    let mut reporter = CliReporter {
        files: LogFileReporter::create(&log_paths)?,
    };
    let options = RunOptions {
        plan: PlanOptions::from_config(folder, &config),
        apply: args.apply,
    };
    let summary = rename_folder(&options, &resolver, &mut RunContext::new(&mut reporter))?;

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Table => {
            print_table(&summary.plan);
        }
    }

    match &summary.applied {
        Some(result) => eprintln!(
            "applied: {} renamed, {} unchanged, {} failed",
            result.applied, result.unchanged, result.failed
        ),
        None => eprintln!("dry-run mode: no files were changed. Pass --apply to rename."),
    }
    for path in reporter.files.paths() {
        eprintln!("log written to {}", path.display());
    }

    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("config file: {}", paths.config_path.display());
    println!("log folder: {}", paths.log_dir.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_table(plan: &RenamePlan) {
    println!("original -> new (source)");
    for candidate in &plan.candidates {
        println!(
            "{} -> {} ({})",
            candidate.original_path.display(),
            candidate.new_name,
            candidate.record.resolved.source.label()
        );
    }

    println!(
        "\nsummary: timezone={} total={} fallback={}",
        plan.timezone, plan.stats.total_files, plan.stats.fallback_count
    );
}
