//! hostrun CLI - local harness for the hostrun execution engine.

mod colors;
mod combine;
mod config;
mod entry;
mod fragments;
mod inspect;
mod parameters;
mod params;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hostrun")]
#[command(about = "Combine, inspect and validate host scripts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Combine source files into one compile unit
    Combine {
        /// Source files, in submission order
        #[arg(required = true)]
        files: Vec<String>,

        /// Emit `#line` directives mapping code back to its file
        #[arg(long)]
        line_directives: bool,

        /// Accept units without top-level statements
        #[arg(long)]
        allow_library: bool,

        /// Print the unit's parts as JSON instead of the rendered text
        #[arg(long)]
        json: bool,
    },

    /// Report which file carries the top-level statements
    Entry {
        /// Source files
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Print the metadata block of a script as JSON
    Inspect {
        /// Path to the script
        file: String,
    },

    /// List the parameters a script declares, as JSON
    Parameters {
        /// Path to the script, or `-` for stdin
        file: String,
    },

    /// Validate a parameter document and print the normalized values
    Params {
        /// Path to the parameter document, or `-` for stdin
        file: String,
    },

    /// Print the effective engine configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Helper to format hostrun-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<hostrun_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    let engine = config::load(cli.config.as_deref()).map_err(format_error)?;

    match cli.command {
        Commands::Combine {
            files,
            line_directives,
            allow_library,
            json,
        } => {
            let mut options = engine.combine;
            options.line_directives |= line_directives;
            options.require_entry &= !allow_library;
            combine::execute(&files, &options, json).map_err(format_error)?;
        }

        Commands::Entry { files } => {
            entry::execute(&files).map_err(format_error)?;
        }

        Commands::Inspect { file } => {
            inspect::execute(&file).map_err(format_error)?;
        }

        Commands::Parameters { file } => {
            parameters::execute(&file).map_err(format_error)?;
        }

        Commands::Params { file } => {
            params::execute(&file).map_err(format_error)?;
        }

        Commands::Config => {
            config::execute(&engine).map_err(format_error)?;
        }
    }

    Ok(())
}
