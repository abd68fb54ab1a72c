use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcf_pipeline::cli::commands::analyze::AnalyzeOptions;
use pcf_pipeline::cli::commands::run::RunOptions;

#[derive(Parser)]
#[command(name = "pcfpipe")]
#[command(
    version,
    about = "Estimate product carbon footprints with an LLM analyst/auditor pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, global = true, env = "PCFPIPE_CONFIG", help = "Config file (default: ./pcfpipe.toml)")]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every pending row of a CSV file
    Run {
        #[arg(help = "Input CSV with a subject_name column")]
        input: PathBuf,
        #[arg(long, short, help = "Output CSV (default: update the input in place)")]
        output: Option<PathBuf>,
        #[arg(long, short, help = "Concurrent subjects")]
        workers: Option<usize>,
        #[arg(long, help = "Completed rows between checkpoints")]
        batch_size: Option<usize>,
        #[arg(long, help = "Maximum auditor iterations per subject")]
        max_audit_loops: Option<usize>,
        #[arg(long, help = "Process at most this many pending rows")]
        limit: Option<usize>,
    },

    /// Run the pipeline for a single product
    Analyze {
        #[arg(help = "Product name")]
        name: String,
        #[arg(long, short, help = "Product description")]
        description: Option<String>,
        #[arg(long, help = "Print the result as JSON")]
        json: bool,
    },

    /// Extract fields from a saved model response
    Parse {
        #[arg(help = "Text file holding the response")]
        file: PathBuf,
        #[arg(
            long,
            short,
            default_value = "cf_value",
            help = "Schema: cf_value, audit, emission_factors, product_description, records"
        )]
        schema: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Write a default ./pcfpipe.toml
    Init {
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mpcfpipe encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!("\n\x1b[33mRows saved at the last checkpoint are kept; rerun to resume.\x1b[0m");
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            input,
            output,
            workers,
            batch_size,
            max_audit_loops,
            limit,
        } => {
            let rt = Runtime::new()?;
            let report = rt.block_on(pcf_pipeline::cli::commands::run::run(
                config,
                RunOptions {
                    input,
                    output,
                    workers,
                    batch_size,
                    max_audit_loops,
                    limit,
                },
            ))?;
            if report.interrupted {
                anyhow::bail!("interrupted after {} of the pending rows", report.processed());
            }
        }
        Commands::Analyze {
            name,
            description,
            json,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(pcf_pipeline::cli::commands::analyze::run(
                config,
                AnalyzeOptions {
                    name,
                    description,
                    json,
                },
            ))?;
        }
        Commands::Parse { file, schema } => {
            pcf_pipeline::cli::commands::parse::run(&file, &schema)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                pcf_pipeline::cli::commands::config::show(config, &format)?;
            }
            ConfigAction::Path => {
                pcf_pipeline::cli::commands::config::path()?;
            }
            ConfigAction::Init { force } => {
                pcf_pipeline::cli::commands::config::init(force)?;
            }
        },
    }

    Ok(())
}
