use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ngcforge::{init_logging, load_config, open_project, tree_listing};

#[derive(Parser)]
#[command(name = "ngcforge")]
#[command(version, about = "Compile feature projects into NGC programs")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (.toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the NC program of a project
    Generate {
        project: PathBuf,

        /// Output file; defaults to the configured output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upgrade a project to the current templates and save it
    Migrate {
        project: PathBuf,

        /// Where to save; defaults to overwriting the project
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the feature tree with paths
    Tree { project: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = load_config(cli.config.as_deref())?;
    let mut project = open_project(&config)?;

    match cli.command {
        Commands::Generate {
            project: source,
            output,
            json,
        } => {
            project
                .load_project(&source)
                .with_context(|| format!("Failed to load project {}", source.display()))?;
            let output = output.unwrap_or_else(|| config.paths.output_path());
            let program = project
                .write_ngc(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&program.diagnostics)?);
            }
            tracing::info!(
                "Wrote {} ({} warnings)",
                output.display(),
                program.diagnostics.len()
            );
        }
        Commands::Migrate {
            project: source,
            output,
        } => {
            let report = project
                .load_project(&source)
                .with_context(|| format!("Failed to load project {}", source.display()))?;
            for (old, new) in &report.migrated {
                println!("{} -> {}", old, new);
            }
            for diagnostic in &report.diagnostics {
                tracing::warn!("{}", diagnostic);
            }
            let target = output.unwrap_or(source);
            project
                .save_project(&target)
                .with_context(|| format!("Failed to save project {}", target.display()))?;
        }
        Commands::Tree { project: source } => {
            project
                .load_project(&source)
                .with_context(|| format!("Failed to load project {}", source.display()))?;
            print!("{}", tree_listing(&project));
        }
    }

    Ok(())
}
