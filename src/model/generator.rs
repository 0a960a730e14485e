//! ResNet generator
//!
//! Maps an image of one domain to an image of the other domain with the same
//! spatial size. Architecture:
//! 1. 7x7 reflection-padded stem
//! 2. Two stride-2 downsampling convolutions
//! 3. `n_blocks` residual blocks
//! 4. Two transposed convolutions back to the input size
//! 5. 7x7 reflection-padded head with Tanh, so outputs lie in [-1, 1]

use serde::{Deserialize, Serialize};
use tch::{nn, nn::ModuleT, Tensor};

use super::norm::{conv_config, Norm2d, NormKind};

/// Generator architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeneratorArch {
    #[default]
    #[serde(rename = "resnet_9blocks")]
    Resnet9Blocks,
    #[serde(rename = "resnet_6blocks")]
    Resnet6Blocks,
}

impl GeneratorArch {
    pub fn n_blocks(self) -> i64 {
        match self {
            GeneratorArch::Resnet9Blocks => 9,
            GeneratorArch::Resnet6Blocks => 6,
        }
    }
}

/// Generator network configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Channels of the source domain
    pub input_nc: i64,
    /// Channels of the target domain
    pub output_nc: i64,
    /// Filters in the stem
    pub ngf: i64,
    /// Number of residual blocks
    pub n_blocks: i64,
    /// Normalization layer
    pub norm: NormKind,
    /// Dropout (p = 0.5) inside residual blocks
    pub use_dropout: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            input_nc: 3,
            output_nc: 3,
            ngf: 64,
            n_blocks: 9,
            norm: NormKind::Instance,
            use_dropout: false,
        }
    }
}

#[derive(Debug)]
struct ResnetBlock {
    conv1: nn::Conv2D,
    norm1: Norm2d,
    conv2: nn::Conv2D,
    norm2: Norm2d,
    use_dropout: bool,
}

impl ResnetBlock {
    fn new(vs: &nn::Path, dim: i64, norm: NormKind, use_dropout: bool) -> Self {
        let cfg = conv_config(1, 0, norm.conv_bias());
        Self {
            conv1: nn::conv2d(vs / "conv1", dim, dim, 3, cfg),
            norm1: Norm2d::new(&(vs / "norm1"), norm, dim),
            conv2: nn::conv2d(vs / "conv2", dim, dim, 3, cfg),
            norm2: Norm2d::new(&(vs / "norm2"), norm, dim),
            use_dropout,
        }
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let ys = xs
            .reflection_pad2d([1, 1, 1, 1])
            .apply(&self.conv1)
            .apply_t(&self.norm1, train)
            .relu();
        let ys = if self.use_dropout {
            ys.dropout(0.5, train)
        } else {
            ys
        };
        let ys = ys
            .reflection_pad2d([1, 1, 1, 1])
            .apply(&self.conv2)
            .apply_t(&self.norm2, train);
        xs + ys
    }
}

/// ResNet generator network
#[derive(Debug)]
pub struct ResnetGenerator {
    config: GeneratorConfig,
    stem: nn::Conv2D,
    stem_norm: Norm2d,
    down: Vec<(nn::Conv2D, Norm2d)>,
    blocks: Vec<ResnetBlock>,
    up: Vec<(nn::ConvTranspose2D, Norm2d)>,
    head: nn::Conv2D,
}

impl ResnetGenerator {
    /// Create a new generator, registering its parameters under `vs`
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Self {
        let ngf = config.ngf;
        let norm = config.norm;
        let bias = norm.conv_bias();

        let stem = nn::conv2d(vs / "stem", config.input_nc, ngf, 7, conv_config(1, 0, bias));
        let stem_norm = Norm2d::new(&(vs / "stem_norm"), norm, ngf);

        let down = (0..2)
            .map(|i| {
                let mult: i64 = 1 << i;
                let path = vs / format!("down{}", i);
                let conv = nn::conv2d(&path / "conv", ngf * mult, ngf * mult * 2, 3, conv_config(2, 1, bias));
                (conv, Norm2d::new(&(&path / "norm"), norm, ngf * mult * 2))
            })
            .collect();

        let dim = ngf * 4;
        let blocks = (0..config.n_blocks)
            .map(|i| ResnetBlock::new(&(vs / format!("block{}", i)), dim, norm, config.use_dropout))
            .collect();

        let up = (0..2)
            .map(|i| {
                let mult: i64 = 1 << (2 - i);
                let path = vs / format!("up{}", i);
                let cfg = nn::ConvTransposeConfig {
                    stride: 2,
                    padding: 1,
                    output_padding: 1,
                    bias,
                    ws_init: nn::Init::Randn {
                        mean: 0.0,
                        stdev: 0.02,
                    },
                    bs_init: nn::Init::Const(0.0),
                    ..Default::default()
                };
                let conv = nn::conv_transpose2d(&path / "conv", ngf * mult, ngf * mult / 2, 3, cfg);
                (conv, Norm2d::new(&(&path / "norm"), norm, ngf * mult / 2))
            })
            .collect();

        let head = nn::conv2d(vs / "head", ngf, config.output_nc, 7, conv_config(1, 0, true));

        Self {
            config,
            stem,
            stem_norm,
            down,
            blocks,
            up,
            head,
        }
    }

    /// Get configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

impl ModuleT for ResnetGenerator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let mut x = xs
            .reflection_pad2d([3, 3, 3, 3])
            .apply(&self.stem)
            .apply_t(&self.stem_norm, train)
            .relu();

        for (conv, norm) in &self.down {
            x = x.apply(conv).apply_t(norm, train).relu();
        }
        for block in &self.blocks {
            x = block.forward_t(&x, train);
        }
        for (conv, norm) in &self.up {
            x = x.apply(conv).apply_t(norm, train).relu();
        }

        x.reflection_pad2d([3, 3, 3, 3]).apply(&self.head).tanh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    #[test]
    fn test_generator_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let config = GeneratorConfig {
            input_nc: 3,
            output_nc: 1,
            ngf: 8,
            n_blocks: 2,
            ..Default::default()
        };
        let gen = ResnetGenerator::new(&vs.root(), config);

        let xs = Tensor::randn([2, 3, 32, 32], (Kind::Float, Device::Cpu));
        let ys = gen.forward_t(&xs, true);

        assert_eq!(ys.size(), vec![2, 1, 32, 32]);
        assert!(ys.abs().max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn test_generator_with_batch_norm_and_dropout() {
        let vs = VarStore::new(Device::Cpu);
        let config = GeneratorConfig {
            ngf: 4,
            n_blocks: GeneratorArch::Resnet6Blocks.n_blocks(),
            norm: NormKind::Batch,
            use_dropout: true,
            ..Default::default()
        };
        let gen = ResnetGenerator::new(&vs.root(), config);

        let xs = Tensor::randn([2, 3, 16, 16], (Kind::Float, Device::Cpu));
        assert_eq!(gen.forward_t(&xs, false).size(), vec![2, 3, 16, 16]);
        assert_eq!(gen.config().n_blocks, 6);
    }
}
