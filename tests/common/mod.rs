//! Networks with known outputs for exercising the orchestrator

#![allow(dead_code)]

use std::path::Path;

use percyclegan::{Config, LossWeights, NetworkFactory};
use tch::{
    nn::{self, ModuleT},
    Tensor,
};

/// `xs * scale` with a learnable scale starting at 1
#[derive(Debug)]
pub struct ScaledIdentity {
    scale: Tensor,
}

impl ScaledIdentity {
    pub fn new(vs: &nn::Path) -> Self {
        Self {
            scale: vs.var("scale", &[1], nn::Init::Const(1.0)),
        }
    }
}

impl ModuleT for ScaledIdentity {
    fn forward_t(&self, xs: &Tensor, _train: bool) -> Tensor {
        xs * &self.scale
    }
}

/// Scores every pixel with a learnable constant starting at 0.5
#[derive(Debug)]
pub struct ConstantCritic {
    bias: Tensor,
}

impl ConstantCritic {
    pub fn new(vs: &nn::Path) -> Self {
        Self {
            bias: vs.var("bias", &[1], nn::Init::Const(0.5)),
        }
    }
}

impl ModuleT for ConstantCritic {
    fn forward_t(&self, xs: &Tensor, _train: bool) -> Tensor {
        xs.zeros_like() + &self.bias
    }
}

/// Identity generators and constant critics
pub struct IdentityNetworks;

impl NetworkFactory for IdentityNetworks {
    fn generator(&self, vs: &nn::Path, _input_nc: i64, _output_nc: i64) -> Box<dyn ModuleT> {
        Box::new(ScaledIdentity::new(vs))
    }

    fn discriminator(&self, vs: &nn::Path, _input_nc: i64) -> Box<dyn ModuleT> {
        Box::new(ConstantCritic::new(vs))
    }
}

/// 1x1 convolution generators, for domains with different channel counts
pub struct PointwiseNetworks {
    /// Extra channels the generators emit beyond the requested count
    pub extra_channels: i64,
}

impl NetworkFactory for PointwiseNetworks {
    fn generator(&self, vs: &nn::Path, input_nc: i64, output_nc: i64) -> Box<dyn ModuleT> {
        let out = output_nc + self.extra_channels;
        Box::new(nn::conv2d(vs / "conv", input_nc, out, 1, Default::default()))
    }

    fn discriminator(&self, vs: &nn::Path, _input_nc: i64) -> Box<dyn ModuleT> {
        Box::new(ConstantCritic::new(vs))
    }
}

/// Single-channel 4x4 setup with every loss weight set to 1
pub fn tiny_config(checkpoints: &Path) -> Config {
    let mut config = Config::default();
    config.name = "tiny".to_string();
    config.model.input_nc = 1;
    config.model.output_nc = 1;
    config.data.load_size = 4;
    config.data.fine_size = 4;
    config.training.checkpoints_dir = checkpoints.to_path_buf();
    config.training.seed = Some(0);
    config.loss = LossWeights::uniform(1.0);
    config
}
