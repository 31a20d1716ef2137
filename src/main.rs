use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use galeralog::{
    analyze_reader, write_text, AnalysisSummary, Config, ConfigOverrides, PatternCategory,
    PatternRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "galeralog")]
#[command(
    author,
    version,
    about = "Reconstruct Galera cluster history (views, transitions, state transfers, downtime) from server error logs"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Error log to analyze (reads stdin when omitted or "-")
    file: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log dialect, or "auto" to detect it
    #[arg(long)]
    dialect: Option<String>,

    /// Include samples of lines no pattern recognized
    #[arg(long)]
    report_unknown: bool,

    /// MariaDB version, when the log does not print one
    #[arg(long)]
    mariadb_version: Option<String>,

    /// MariaDB edition (e.g. "Enterprise")
    #[arg(long)]
    mariadb_edition: Option<String>,

    /// Galera provider version, when the log does not print one
    #[arg(long)]
    galera_version: Option<String>,

    /// Config file (default: .galeralog/config.toml, searched upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate shell completion script
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
    /// List registered dialects with their pattern counts
    Dialects,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> galeralog::Result<()> {
    if let Some(Command::Completion { shell }) = &args.command {
        let mut cmd = Args::command();
        clap_complete::generate(*shell, &mut cmd, "galeralog", &mut io::stdout());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    let config = config.with_overrides(&ConfigOverrides {
        dialect: args.dialect.clone(),
        report_unknown: args.report_unknown,
        mariadb_version: args.mariadb_version.clone(),
        mariadb_edition: args.mariadb_edition.clone(),
        galera_version: args.galera_version.clone(),
    });
    let registry = config.build_registry()?;

    if let Some(Command::Dialects) = &args.command {
        return list_dialects(&registry);
    }

    let input: Box<dyn BufRead> = match &args.file {
        Some(path) if path.as_os_str() != "-" => {
            debug!(path = %path.display(), "reading log file");
            Box::new(BufReader::new(File::open(path)?))
        }
        _ => Box::new(io::stdin().lock()),
    };
    let analysis = analyze_reader(registry, config.analyzer_options(), input)?;
    let summary = AnalysisSummary::from_analysis(&analysis);

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => {
            colored::control::set_override(false);
            Box::new(BufWriter::new(File::create(path)?))
        }
        None => Box::new(io::stdout().lock()),
    };
    match args.format {
        OutputFormat::Json => writeln!(out, "{}", summary.to_json()?)?,
        OutputFormat::Text => write_text(&summary, &mut out)?,
    }
    out.flush()?;
    Ok(())
}

fn list_dialects(registry: &PatternRegistry) -> galeralog::Result<()> {
    let mut out = io::stdout().lock();
    for name in registry.dialect_names() {
        writeln!(out, "{}", name.bold())?;
        for category in PatternCategory::ALL {
            let count = registry.get_patterns(name, category).len();
            if count > 0 {
                writeln!(out, "   {:<18} {}", category.as_str(), count)?;
            }
        }
    }
    Ok(())
}
