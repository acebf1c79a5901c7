use std::{
    io::{self, BufReader},
    path::PathBuf,
    time::Duration,
};

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use kitvae::{
    burn_backend_types::{InferenceDevice, NAME},
    preprocess::{
        letterbox_directory, process_directory, remove_backgrounds, BatchReport,
        DEFAULT_TARGET_SIZE, INTERIM_DIR, PROCESSED_DIR, RAW_DIR,
    },
    review::{review_directory, AutoReviewer, Reviewer, TerminalReviewer},
    scrape::{CatalogScraper, CdnImageExtractor, HttpFetcher, KitLinkFilter, ScrapeConfig},
    tracking::{ExperimentTracker, LocalFileStore, MlflowClient},
    training::{run_training, TrainingConfig, TrainingReport},
    util::BorderKeyRemover,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CATALOG: &str = "https://www.footballkitarchive.com/chivas-de-guadalajara-kits/";

#[derive(Parser)]
#[command(name = "kitvae")]
#[command(about = "Kit image pipeline: scrape, clean, letterbox and train a VAE")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum KitSelection {
    /// Home kits of every team
    Home,
    /// Every kit of one team
    Team,
}

/// Backdrop keying parameters.
#[derive(Args)]
struct RemoverArgs {
    /// RGB distance from the backdrop color still treated as backdrop
    #[arg(long, default_value_t = 40.0)]
    tolerance: f32,

    /// Width of the alpha ramp along the kit outline
    #[arg(long, default_value_t = 20.0)]
    feather: f32,
}

impl RemoverArgs {
    const fn remover(&self) -> BorderKeyRemover {
        BorderKeyRemover::new(self.tolerance, self.feather)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Download kit images from a catalog
    Scrape {
        /// Catalog page listing the kits
        #[arg(long, default_value = DEFAULT_CATALOG)]
        catalog: String,

        /// Which kit links to follow
        #[arg(long, value_enum, default_value = "home")]
        kits: KitSelection,

        /// Team slug, required with `--kits team`
        #[arg(long, required_if_eq("kits", "team"))]
        team: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = RAW_DIR)]
        output: PathBuf,

        /// Highest catalog page to request
        #[arg(long, default_value_t = 50)]
        max_pages: usize,

        /// Pause between downloads in milliseconds
        #[arg(long, default_value_t = 1500)]
        delay_ms: u64,

        /// Download files that already exist again
        #[arg(long)]
        overwrite: bool,
    },

    /// Remove backgrounds and composite on black
    RemoveBg {
        #[arg(short, long, default_value = RAW_DIR)]
        input: PathBuf,

        #[arg(short, long, default_value = PROCESSED_DIR)]
        output: PathBuf,

        #[command(flatten)]
        remover: RemoverArgs,
    },

    /// Letterbox images onto a square black canvas
    Letterbox {
        #[arg(short, long, default_value = PROCESSED_DIR)]
        input: PathBuf,

        #[arg(short, long, default_value = INTERIM_DIR)]
        output: PathBuf,

        /// Canvas side in pixels
        #[arg(short, long, default_value_t = DEFAULT_TARGET_SIZE)]
        size: u32,
    },

    /// Background removal and letterboxing in one pass
    Process {
        #[arg(short, long, default_value = RAW_DIR)]
        input: PathBuf,

        #[arg(short, long, default_value = INTERIM_DIR)]
        output: PathBuf,

        #[arg(short, long, default_value_t = DEFAULT_TARGET_SIZE)]
        size: u32,

        #[command(flatten)]
        remover: RemoverArgs,
    },

    /// Review images one by one and delete the bad ones
    Review {
        #[arg(short, long, default_value = PROCESSED_DIR)]
        dir: PathBuf,

        /// Delete nearly black images without asking
        #[arg(long)]
        auto: bool,

        /// Minimum fraction of non-black pixels kept by `--auto`
        #[arg(long, default_value_t = 0.02)]
        threshold: f64,

        /// Preview width in terminal columns
        #[arg(long, default_value_t = 48)]
        columns: u32,
    },

    /// Train the VAE and log the run
    Train {
        /// Training configuration file; defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overrides the configured data directory
        #[arg(long)]
        data_dir: Option<String>,

        /// Overrides the configured epoch count
        #[arg(long)]
        epochs: Option<usize>,

        /// MLflow tracking server; runs are stored locally when unset
        #[arg(long, env = "MLFLOW_TRACKING_URI")]
        tracking_uri: Option<String>,

        #[arg(long, env = "MLFLOW_TRACKING_TOKEN", hide_env_values = true)]
        tracking_token: Option<String>,

        #[arg(long, env = "MLFLOW_EXPERIMENT_NAME", default_value = "kit_vae")]
        experiment: String,

        /// Directory of the local run store
        #[arg(long, default_value = "mlruns")]
        store: PathBuf,

        #[arg(long, default_value = "vae-training")]
        run_name: String,
    },

    /// Show backend information
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scrape {
            catalog,
            kits,
            team,
            output,
            max_pages,
            delay_ms,
            overwrite,
        } => {
            let filter = match (kits, team) {
                (KitSelection::Team, Some(team)) => KitLinkFilter::team_kits(&team),
                _ => KitLinkFilter::home_kits(),
            };
            let config = ScrapeConfig {
                max_pages,
                delay: Duration::from_millis(delay_ms),
                overwrite,
            };
            let scraper = CatalogScraper::new(HttpFetcher::default(), config);
            let saved = scraper.scrape(&catalog, &filter, &CdnImageExtractor::default(), &output)?;
            info!(saved = saved.len(), output = %output.display(), "scrape finished");
            Ok(())
        }

        Commands::RemoveBg {
            input,
            output,
            remover,
        } => {
            let report = remove_backgrounds(&input, &output, &remover.remover())?;
            print_report(&report);
            Ok(())
        }

        Commands::Letterbox {
            input,
            output,
            size,
        } => {
            let report = letterbox_directory(&input, &output, size)?;
            print_report(&report);
            Ok(())
        }

        Commands::Process {
            input,
            output,
            size,
            remover,
        } => {
            let report = process_directory(&input, &output, &remover.remover(), size)?;
            print_report(&report);
            Ok(())
        }

        Commands::Review {
            dir,
            auto,
            threshold,
            columns,
        } => {
            let mut auto_reviewer = AutoReviewer { threshold };
            let mut terminal =
                TerminalReviewer::new(BufReader::new(io::stdin()), io::stdout(), columns);
            let reviewer: &mut dyn Reviewer = if auto {
                &mut auto_reviewer
            } else {
                &mut terminal
            };

            let summary = review_directory(&dir, reviewer)?;
            println!(
                "Reviewed {}, kept {}, deleted {}, unreadable {}{}",
                summary.reviewed,
                summary.kept,
                summary.deleted.len(),
                summary.skipped,
                if summary.quit { " (stopped early)" } else { "" }
            );
            Ok(())
        }

        Commands::Train {
            config,
            data_dir,
            epochs,
            tracking_uri,
            tracking_token,
            experiment,
            store,
            run_name,
        } => {
            let mut training_config = match config {
                Some(path) => TrainingConfig::load(path)?,
                None => TrainingConfig::new(),
            };
            if let Some(data_dir) = data_dir {
                training_config.data_dir = data_dir;
            }
            if let Some(epochs) = epochs {
                training_config.num_epochs = epochs;
            }

            let report = match tracking_uri {
                Some(uri) => {
                    info!(uri = %uri, experiment = %experiment, "tracking to MLflow");
                    let client = MlflowClient::new(&uri, tracking_token)?;
                    let tracker = ExperimentTracker::new(client, experiment);
                    run_training(&training_config, &tracker, &run_name)?
                }
                None => {
                    info!(
                        store = %store.display(),
                        experiment = %experiment,
                        "tracking to local store"
                    );
                    let tracker = ExperimentTracker::new(LocalFileStore::new(store)?, experiment);
                    run_training(&training_config, &tracker, &run_name)?
                }
            };
            print_training_report(&report);
            Ok(())
        }

        Commands::Info => {
            println!("KitVAE Information:");
            println!("  Backend: {NAME}");
            println!("  Device: {:?}", InferenceDevice::default());
            Ok(())
        }
    }
}

fn print_report(report: &BatchReport) {
    println!(
        "Processed {} of {} images",
        report.processed.len(),
        report.total()
    );
    for (path, error) in &report.failed {
        println!("  failed: {} ({error})", path.display());
    }
}

fn print_training_report(report: &TrainingReport) {
    println!("Run {} finished", report.run.run_id);
    if let (Some(train), Some(validation)) =
        (report.history.train.last(), report.history.validation.last())
    {
        println!("  final train loss: {train:.6}, validation loss: {validation:.6}");
    }
    println!("  test MSE: {:.6}", report.test_mse);
    println!(
        "  registered {} version {}",
        report.model_version.name, report.model_version.version
    );
}
