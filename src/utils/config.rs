//! Configuration management
//!
//! One `Config` drives the whole run: network shapes, the dataset, the
//! training schedule and every loss weight. Defaults follow the reference
//! PerCycleGAN training options.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{DiscriminatorArch, GeneratorArch, NormKind};
use crate::training::GanMode;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Experiment name, used as the checkpoint sub-directory
    pub name: String,
    /// Network configuration
    pub model: ModelConfig,
    /// Dataset configuration
    pub data: DataConfig,
    /// Optimizer and schedule configuration
    pub training: TrainingConfig,
    /// Loss weights
    pub loss: LossWeights,
}

/// Network-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Channels of domain A images
    pub input_nc: i64,
    /// Channels of domain B images
    pub output_nc: i64,
    /// Generator filters in the first conv layer
    pub ngf: i64,
    /// Discriminator filters in the first conv layer
    pub ndf: i64,
    /// Generator architecture
    pub which_model_net_g: GeneratorArch,
    /// Discriminator architecture
    pub which_model_net_d: DiscriminatorArch,
    /// Depth of the `n_layers` discriminator
    pub n_layers_d: i64,
    /// Normalization layer
    pub norm: NormKind,
    /// Dropout inside generator residual blocks
    pub use_dropout: bool,
    /// Adversarial objective
    pub gan_mode: GanMode,
}

/// Direction of the translation relative to the dataset folders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    AtoB,
    BtoA,
}

/// Dataset-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root holding `<phase>A` and `<phase>B` image folders
    pub dataroot: PathBuf,
    /// Dataset phase, e.g. "train"
    pub phase: String,
    /// Which folder feeds domain A
    pub direction: Direction,
    /// Images per batch
    pub batch_size: usize,
    /// Images are resized to this square size
    pub load_size: i64,
    /// then randomly cropped to this size
    pub fine_size: i64,
    /// Take B images in order instead of randomly
    pub serial_batches: bool,
    /// Disable random horizontal flips
    pub no_flip: bool,
}

/// Optimizer, schedule and checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Initial Adam learning rate
    pub lr: f64,
    /// Adam beta1
    pub beta1: f64,
    /// Epochs at the initial learning rate
    pub niter: usize,
    /// Epochs of linear decay to zero
    pub niter_decay: usize,
    /// Epoch number to start counting from
    pub epoch_count: usize,
    /// Replay buffer capacity per domain (0 disables it)
    pub pool_size: usize,
    /// Log losses every N images
    pub print_freq: usize,
    /// Save the `latest` checkpoint every N images
    pub save_latest_freq: usize,
    /// Save a labelled checkpoint every N epochs
    pub save_epoch_freq: usize,
    /// Resume from `which_epoch`
    pub continue_train: bool,
    /// Checkpoint label to resume from
    pub which_epoch: String,
    /// Root directory for checkpoints
    pub checkpoints_dir: PathBuf,
    /// Device: "cpu" or "cuda"
    pub device: String,
    /// Seed for weight init and replay buffers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Which feature metric backs the perceptual loss terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentLossKind {
    /// L1 distance in pixel space
    #[default]
    L1,
    /// MSE between features of a frozen extractor
    Perceptual,
}

/// Weights of the six feature-loss sub-terms
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWeights {
    /// fake_A vs real_A
    #[serde(alias = "lambda_feat_AfA")]
    pub a_fake_a: f64,
    /// fake_B vs real_B
    #[serde(alias = "lambda_feat_BfB")]
    pub b_fake_b: f64,
    /// fake_A vs rec_A
    #[serde(alias = "lambda_feat_fArecA")]
    pub fake_a_rec_a: f64,
    /// fake_B vs rec_B
    #[serde(alias = "lambda_feat_fBrecB")]
    pub fake_b_rec_b: f64,
    /// rec_A vs real_A
    #[serde(alias = "lambda_feat_ArecA")]
    pub a_rec_a: f64,
    /// rec_B vs real_B
    #[serde(alias = "lambda_feat_BrecB")]
    pub b_rec_b: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            a_fake_a: 1.0,
            b_fake_b: 1.0,
            fake_a_rec_a: 0.0,
            fake_b_rec_b: 0.0,
            a_rec_a: 1.0,
            b_rec_b: 1.0,
        }
    }
}

impl FeatureWeights {
    /// All six weights set to `w`
    pub fn uniform(w: f64) -> Self {
        Self {
            a_fake_a: w,
            b_fake_b: w,
            fake_a_rec_a: w,
            fake_b_rec_b: w,
            a_rec_a: w,
            b_rec_b: w,
        }
    }

    fn named(&self) -> [(&'static str, f64); 6] {
        [
            ("feature.a_fake_a", self.a_fake_a),
            ("feature.b_fake_b", self.b_fake_b),
            ("feature.fake_a_rec_a", self.fake_a_rec_a),
            ("feature.fake_b_rec_b", self.fake_b_rec_b),
            ("feature.a_rec_a", self.a_rec_a),
            ("feature.b_rec_b", self.b_rec_b),
        ]
    }
}

/// Loss weights of the composite generator objective
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LossWeights {
    /// Cycle loss A -> B -> A
    #[serde(alias = "lambda_A")]
    pub lambda_a: f64,
    /// Cycle loss B -> A -> B
    #[serde(alias = "lambda_B")]
    pub lambda_b: f64,
    /// Identity mapping weight, relative to lambda_A / lambda_B. 0 disables it.
    pub identity: f64,
    /// Synthesis loss fake_A vs real_A
    #[serde(alias = "lambda_syn_A")]
    pub lambda_syn_a: f64,
    /// Synthesis loss fake_B vs real_B
    #[serde(alias = "lambda_syn_B")]
    pub lambda_syn_b: f64,
    /// Cyclic-synthesis loss fake_A vs rec_A
    #[serde(alias = "lambda_CS_A")]
    pub lambda_cs_a: f64,
    /// Cyclic-synthesis loss fake_B vs rec_B
    #[serde(alias = "lambda_CS_B")]
    pub lambda_cs_b: f64,
    /// Feature metric
    pub content_loss: ContentLossKind,
    /// Optional weights for the perceptual feature extractor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_weights: Option<PathBuf>,
    /// Feature loss weights
    pub feature: FeatureWeights,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            lambda_a: 10.0,
            lambda_b: 10.0,
            identity: 0.5,
            lambda_syn_a: 15.0,
            lambda_syn_b: 15.0,
            lambda_cs_a: 0.0,
            lambda_cs_b: 0.0,
            content_loss: ContentLossKind::L1,
            feature_weights: None,
            feature: FeatureWeights::default(),
        }
    }
}

impl LossWeights {
    /// Every weight set to `w`, identity included
    pub fn uniform(w: f64) -> Self {
        Self {
            lambda_a: w,
            lambda_b: w,
            identity: w,
            lambda_syn_a: w,
            lambda_syn_b: w,
            lambda_cs_a: w,
            lambda_cs_b: w,
            feature: FeatureWeights::uniform(w),
            ..Self::default()
        }
    }

    /// Whether the identity sub-step runs at all
    pub fn identity_enabled(&self) -> bool {
        self.identity > 0.0
    }

    fn named(&self) -> Vec<(&'static str, f64)> {
        let mut weights = vec![
            ("lambda_a", self.lambda_a),
            ("lambda_b", self.lambda_b),
            ("identity", self.identity),
            ("lambda_syn_a", self.lambda_syn_a),
            ("lambda_syn_b", self.lambda_syn_b),
            ("lambda_cs_a", self.lambda_cs_a),
            ("lambda_cs_b", self.lambda_cs_b),
        ];
        weights.extend(self.feature.named());
        weights
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_nc: 3,
            output_nc: 3,
            ngf: 64,
            ndf: 64,
            which_model_net_g: GeneratorArch::Resnet9Blocks,
            which_model_net_d: DiscriminatorArch::Basic,
            n_layers_d: 3,
            norm: NormKind::Instance,
            use_dropout: false,
            gan_mode: GanMode::LeastSquares,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataroot: PathBuf::from("datasets/horse2zebra"),
            phase: "train".to_string(),
            direction: Direction::AtoB,
            batch_size: 1,
            load_size: 286,
            fine_size: 256,
            serial_batches: false,
            no_flip: false,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            lr: 2e-4,
            beta1: 0.5,
            niter: 100,
            niter_decay: 100,
            epoch_count: 1,
            pool_size: 50,
            print_freq: 100,
            save_latest_freq: 5000,
            save_epoch_freq: 5,
            continue_train: false,
            which_epoch: "latest".to_string(),
            checkpoints_dir: PathBuf::from("checkpoints"),
            device: "cpu".to_string(),
            seed: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "percyclegan".to_string(),
            model: ModelConfig::default(),
            data: DataConfig::default(),
            training: TrainingConfig::default(),
            loss: LossWeights::default(),
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_toml(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory holding this experiment's checkpoints
    pub fn experiment_dir(&self) -> PathBuf {
        self.training.checkpoints_dir.join(&self.name)
    }

    /// Total number of epochs, decay included
    pub fn total_epochs(&self) -> usize {
        self.training.niter + self.training.niter_decay
    }

    /// Get device from configuration
    pub fn device(&self) -> tch::Device {
        match self.training.device.to_lowercase().as_str() {
            "cuda" | "gpu" => {
                if tch::Cuda::is_available() {
                    tch::Device::Cuda(0)
                } else {
                    tracing::warn!("CUDA requested but not available, falling back to CPU");
                    tch::Device::Cpu
                }
            }
            _ => tch::Device::Cpu,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        if model.input_nc <= 0 || model.output_nc <= 0 {
            return Err(Error::Config("channel counts must be > 0".into()));
        }
        if model.ngf <= 0 || model.ndf <= 0 {
            return Err(Error::Config("ngf and ndf must be > 0".into()));
        }
        if model.n_layers_d <= 0 {
            return Err(Error::Config("n_layers_d must be > 0".into()));
        }

        let data = &self.data;
        if data.batch_size == 0 {
            return Err(Error::Config("batch size must be > 0".into()));
        }
        if data.fine_size <= 0 || data.fine_size > data.load_size {
            return Err(Error::Config(format!(
                "fine_size {} must be in 1..={}",
                data.fine_size, data.load_size
            )));
        }

        let training = &self.training;
        if !training.lr.is_finite() || training.lr <= 0.0 {
            return Err(Error::Config(format!("lr must be > 0, got {}", training.lr)));
        }
        if !(0.0..1.0).contains(&training.beta1) {
            return Err(Error::Config(format!("beta1 must be in [0, 1), got {}", training.beta1)));
        }
        if training.niter_decay == 0 {
            return Err(Error::Config("niter_decay must be > 0".into()));
        }
        if training.epoch_count == 0 {
            return Err(Error::Config("epoch_count starts at 1".into()));
        }
        if training.print_freq == 0 || training.save_latest_freq == 0 || training.save_epoch_freq == 0 {
            return Err(Error::Config("print/save frequencies must be > 0".into()));
        }

        for (name, weight) in self.loss.named() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::Config(format!("{} must be finite and >= 0, got {}", name, weight)));
            }
        }
        if self.loss.identity_enabled() && model.input_nc != model.output_nc {
            return Err(Error::Config(format!(
                "identity loss needs input_nc == output_nc, got {} and {}",
                model.input_nc, model.output_nc
            )));
        }
        if self.loss.content_loss == ContentLossKind::Perceptual && model.input_nc != model.output_nc {
            return Err(Error::Config(
                "perceptual loss compares both domains with one extractor; input_nc must equal output_nc".into(),
            ));
        }
        Ok(())
    }
}

/// Create default configuration file if it doesn't exist
pub fn ensure_config_exists(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let is_toml = path.extension().map(|e| e == "toml").unwrap_or(false);
    if path.exists() {
        if is_toml {
            Config::from_toml(path)
        } else {
            Config::from_json(path)
        }
    } else {
        let config = Config::default();
        if is_toml {
            config.save_toml(path)?;
        } else {
            config.save_json(path)?;
        }
        Ok(config)
    }
}
