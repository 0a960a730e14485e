//! PerCycleGAN model
//!
//! This module provides:
//! - Default network architectures (ResNet generator, PatchGAN discriminator)
//! - The factory trait through which architectures are injected
//! - The forward graph of derived tensors
//! - The training step orchestrator

mod discriminator;
mod generator;
mod graph;
mod norm;
mod per_cycle_gan;

pub use discriminator::{DiscriminatorArch, DiscriminatorConfig, NLayerDiscriminator};
pub use generator::{GeneratorArch, GeneratorConfig, ResnetGenerator};
pub use graph::{ForwardGraph, Mapping, Node};
pub use norm::{Norm2d, NormKind};
pub use per_cycle_gan::{LossReport, PerCycleGan, StepResult};

use tch::nn::{self, ModuleT};

use crate::utils::config::Config;

/// The four networks of the model, also their checkpoint identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkId {
    GA,
    GB,
    DA,
    DB,
}

impl NetworkId {
    pub const ALL: [NetworkId; 4] = [NetworkId::GA, NetworkId::GB, NetworkId::DA, NetworkId::DB];

    pub fn name(self) -> &'static str {
        match self {
            NetworkId::GA => "G_A",
            NetworkId::GB => "G_B",
            NetworkId::DA => "D_A",
            NetworkId::DB => "D_B",
        }
    }
}

/// Builds the networks the orchestrator trains.
///
/// Implementations register every parameter under the given path so the
/// orchestrator's optimizers and checkpoints see them.
pub trait NetworkFactory {
    /// Network translating `input_nc`-channel images into `output_nc` channels
    fn generator(&self, vs: &nn::Path, input_nc: i64, output_nc: i64) -> Box<dyn ModuleT>;

    /// Network scoring `input_nc`-channel images as real or fake
    fn discriminator(&self, vs: &nn::Path, input_nc: i64) -> Box<dyn ModuleT>;
}

/// Architectures selected by the configuration
#[derive(Debug, Clone)]
pub struct StandardNetworks {
    pub ngf: i64,
    pub ndf: i64,
    pub generator: GeneratorArch,
    pub discriminator: DiscriminatorArch,
    pub n_layers_d: i64,
    pub norm: NormKind,
    pub use_dropout: bool,
    pub use_sigmoid: bool,
}

impl StandardNetworks {
    pub fn from_config(config: &Config) -> Self {
        let model = &config.model;
        Self {
            ngf: model.ngf,
            ndf: model.ndf,
            generator: model.which_model_net_g,
            discriminator: model.which_model_net_d,
            n_layers_d: model.n_layers_d,
            norm: model.norm,
            use_dropout: model.use_dropout,
            use_sigmoid: model.gan_mode.needs_sigmoid(),
        }
    }
}

impl NetworkFactory for StandardNetworks {
    fn generator(&self, vs: &nn::Path, input_nc: i64, output_nc: i64) -> Box<dyn ModuleT> {
        let config = GeneratorConfig {
            input_nc,
            output_nc,
            ngf: self.ngf,
            n_blocks: self.generator.n_blocks(),
            norm: self.norm,
            use_dropout: self.use_dropout,
        };
        Box::new(ResnetGenerator::new(vs, config))
    }

    fn discriminator(&self, vs: &nn::Path, input_nc: i64) -> Box<dyn ModuleT> {
        let n_layers = match self.discriminator {
            DiscriminatorArch::Basic => 3,
            DiscriminatorArch::NLayers => self.n_layers_d,
        };
        let config = DiscriminatorConfig {
            input_nc,
            ndf: self.ndf,
            n_layers,
            norm: self.norm,
            use_sigmoid: self.use_sigmoid,
        };
        Box::new(NLayerDiscriminator::new(vs, config))
    }
}
