//! PerCycleGAN for unpaired image-to-image translation
//!
//! Main entry point providing CLI interface for:
//! - Training a PerCycleGAN model
//! - Translating a test set with a saved checkpoint
//! - Writing a default configuration file

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tch::vision::image;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use percyclegan::{
    data::{DataLoader, UnalignedDataset},
    model::{PerCycleGan, StandardNetworks},
    training::{build_feature_loss, Trainer},
    utils::{ensure_config_exists, Config},
};

/// PerCycleGAN trainer
#[derive(Parser)]
#[command(name = "percyclegan")]
#[command(version = "0.1.0")]
#[command(about = "Train CycleGAN-style translators with synthesis and perceptual losses")]
struct Cli {
    /// Path to configuration file (.toml or .json)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model
    Train {
        /// Dataset root holding trainA/ and trainB/
        #[arg(short, long)]
        dataroot: Option<PathBuf>,

        /// Experiment name
        #[arg(short, long)]
        name: Option<String>,

        /// Resume from a saved checkpoint
        #[arg(long)]
        continue_train: bool,

        /// Checkpoint label to resume from
        #[arg(long)]
        which_epoch: Option<String>,

        /// Epoch number to start counting from when resuming
        #[arg(long)]
        epoch_count: Option<usize>,
    },

    /// Translate a dataset phase with a saved checkpoint
    Test {
        /// Dataset root holding <phase>A/ and <phase>B/
        #[arg(short, long)]
        dataroot: Option<PathBuf>,

        /// Dataset phase
        #[arg(long, default_value = "test")]
        phase: String,

        /// Checkpoint label
        #[arg(long, default_value = "latest")]
        which_epoch: String,

        /// Directory for the translated images
        #[arg(short, long, default_value = "results")]
        results_dir: PathBuf,
    },

    /// Initialize default configuration file
    Init {
        /// Output configuration file path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Train {
            dataroot,
            name,
            continue_train,
            which_epoch,
            epoch_count,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(dataroot) = dataroot {
                config.data.dataroot = dataroot;
            }
            if let Some(name) = name {
                config.name = name;
            }
            config.training.continue_train |= continue_train;
            if let Some(which_epoch) = which_epoch {
                config.training.which_epoch = which_epoch;
            }
            if let Some(epoch_count) = epoch_count {
                config.training.epoch_count = epoch_count;
            }
            train(config)?;
        }
        Commands::Test {
            dataroot,
            phase,
            which_epoch,
            results_dir,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(dataroot) = dataroot {
                config.data.dataroot = dataroot;
            }
            config.data.phase = phase;
            config.training.which_epoch = which_epoch;
            test(config, &results_dir)?;
        }
        Commands::Init { output } => {
            ensure_config_exists(&output)?;
            info!("Configuration available at {}", output.display());
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        info!("Loading configuration from {}", path.display());
        Ok(ensure_config_exists(path)?)
    } else {
        info!("Config file not found, using defaults");
        Ok(Config::default())
    }
}

fn build_model(config: &Config) -> Result<PerCycleGan> {
    let device = config.device();
    info!("Using device: {:?}", device);

    let feature_loss = build_feature_loss(&config.loss, config.model.input_nc, device)?;
    let networks = StandardNetworks::from_config(config);
    Ok(PerCycleGan::new(config, &networks, feature_loss)?)
}

fn train(config: Config) -> Result<()> {
    let mut model = build_model(&config)?;
    if config.training.continue_train {
        model.load(&config.training.which_epoch)?;
        info!("Resumed from checkpoint '{}'", config.training.which_epoch);
    }

    std::fs::create_dir_all(config.experiment_dir())?;
    config.save_toml(config.experiment_dir().join("config.toml"))?;

    let dataset = UnalignedDataset::from_config(&config)?;
    let mut data_loader = DataLoader::new(dataset, config.data.batch_size, !config.data.serial_batches);

    let mut trainer = Trainer::new(config);
    let history = trainer.train(&mut model, &mut data_loader)?;

    info!(
        "Training complete. Final G: {:.4}, D_A: {:.4}, D_B: {:.4}",
        history.latest("G").unwrap_or(0.0),
        history.latest("D_A").unwrap_or(0.0),
        history.latest("D_B").unwrap_or(0.0)
    );
    Ok(())
}

fn test(mut config: Config, results_dir: &Path) -> Result<()> {
    // inference keeps every image at its full fine size and in folder order
    config.data.serial_batches = true;
    config.data.no_flip = true;
    config.data.load_size = config.data.fine_size;

    let mut model = build_model(&config)?;
    model.load(&config.training.which_epoch)?;

    let out_dir = results_dir
        .join(&config.name)
        .join(format!("{}_{}", config.data.phase, config.training.which_epoch));
    std::fs::create_dir_all(&out_dir)?;

    let dataset = UnalignedDataset::from_config(&config)?;
    let data_loader = DataLoader::new(dataset, 1, false);

    let mut count = 0;
    for batch in data_loader {
        let batch = batch?;
        let stem = batch
            .a_paths
            .first()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| count.to_string());

        model.set_input(batch)?;
        let graph = model.test()?;
        for (name, visual) in PerCycleGan::visuals(&graph) {
            image::save(&visual.permute([2, 0, 1]), out_dir.join(format!("{}_{}.png", stem, name)))?;
        }
        count += 1;
    }

    info!("Translated {} images into {}", count, out_dir.display());
    Ok(())
}
