use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "midicaps", version, about = "Annotate MIDI collections with text-ready descriptors")]
struct Cli {
    /// Path to the config file (defaults to ./midicaps.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find MIDI files under directories and write them out as a catalog
    List {
        /// Directories to search
        #[arg(required = true)]
        dirs: Vec<PathBuf>,

        /// Catalog file to write
        #[arg(short, long, default_value = "all_files_list.json")]
        output: PathBuf,

        /// Shuffle catalog order
        #[arg(long)]
        shuffle: bool,

        /// Seed for --shuffle (random if omitted)
        #[arg(long, requires = "shuffle")]
        seed: Option<u64>,
    },

    /// Annotate every file in the configured catalog
    Annotate {
        /// Continue an interrupted run, recomputing its last few records
        #[arg(long, alias = "goon")]
        resume: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::List {
            dirs,
            output,
            shuffle,
            seed,
        } => {
            let spinner = ProgressBar::new_spinner();
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner.set_message("Searching for MIDI files...");
            let mut files = midicaps::catalog::find_midi_files(&dirs);
            spinner.finish_and_clear();

            if files.is_empty() {
                anyhow::bail!("No MIDI files found under the given directories.");
            }
            if shuffle {
                midicaps::catalog::shuffle(&mut files, seed);
            }

            midicaps::catalog::write_catalog(&output, &files)
                .with_context(|| format!("Failed to write catalog {}", output.display()))?;
            println!("Catalog complete: {} files written to {}", files.len(), output.display());
        }

        Commands::Annotate { resume } => {
            let config = midicaps::config::AppConfig::load(cli.config.as_deref())
                .context("Failed to load config")?;

            let started = Instant::now();
            let result = midicaps::pipeline::run(&config, resume).context("Annotation failed")?;
            println!(
                "Annotation complete: {} written, {} skipped in {:.1}s",
                result.written,
                result.skipped,
                started.elapsed().as_secs_f64()
            );
            println!("Output: {}", config.output_file.display());
        }
    }

    Ok(())
}
