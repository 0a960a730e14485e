//! PerCycleGAN training step orchestrator
//!
//! Owns the two generators, the two discriminators, their three Adam
//! optimizers and the two replay buffers. One call to
//! [`PerCycleGan::optimize_parameters`] performs a full step:
//! 1. Generator update on the composite objective
//! 2. D_A update on real_B against pooled fake_B
//! 3. D_B update on real_A against pooled fake_A

use std::path::PathBuf;

use tch::{
    nn::{self, ModuleT, OptimizerConfig, VarStore},
    Device, Kind, Tensor,
};

use super::graph::{ForwardGraph, Mapping, Node};
use super::{NetworkFactory, NetworkId};
use crate::data::Batch;
use crate::error::{Error, Result};
use crate::training::losses::{discriminator_loss, weighted_l1, FeatureLoss};
use crate::training::{GanMode, ImagePool, LinearDecay};
use crate::utils::checkpoint::{load_network, save_network, CheckpointStore};
use crate::utils::config::{Config, Direction, LossWeights};
use crate::utils::visuals::tensor_to_image;

/// Display order of the visuals, identity nodes included when present
const VISUAL_ORDER: [Node; 8] = [
    Node::RealA,
    Node::FakeB,
    Node::RecA,
    Node::IdtB,
    Node::RealB,
    Node::FakeA,
    Node::RecB,
    Node::IdtA,
];

/// Scalar losses of one step
#[derive(Debug, Clone, PartialEq)]
pub struct LossReport {
    pub d_a: f64,
    pub g_a: f64,
    pub cycle_a: f64,
    /// `None` when the identity weight is 0
    pub idt_a: Option<f64>,
    pub d_b: f64,
    pub g_b: f64,
    pub cycle_b: f64,
    pub idt_b: Option<f64>,
    pub cs_a: f64,
    pub cs_b: f64,
    pub syn_a: f64,
    pub syn_b: f64,
    /// Weighted sum of the six feature sub-terms
    pub feat: f64,
    /// Composite generator objective
    pub total_g: f64,
}

impl LossReport {
    /// Named losses in reporting order
    pub fn errors(&self) -> Vec<(&'static str, f64)> {
        let mut errors = vec![("D_A", self.d_a), ("G_A", self.g_a), ("Cyc_A", self.cycle_a)];
        if let Some(idt_a) = self.idt_a {
            errors.push(("idt_A", idt_a));
        }
        errors.extend([("D_B", self.d_b), ("G_B", self.g_b), ("Cyc_B", self.cycle_b)]);
        if let Some(idt_b) = self.idt_b {
            errors.push(("idt_B", idt_b));
        }
        errors.extend([
            ("CS_A", self.cs_a),
            ("CS_B", self.cs_b),
            ("Syn_A", self.syn_a),
            ("Syn_B", self.syn_b),
            ("Feat", self.feat),
            ("G", self.total_g),
        ]);
        errors
    }
}

/// Outcome of one training step
#[derive(Debug)]
pub struct StepResult {
    losses: LossReport,
    graph: ForwardGraph,
    image_paths: Vec<PathBuf>,
}

impl StepResult {
    pub fn losses(&self) -> &LossReport {
        &self.losses
    }

    /// Named scalar losses in reporting order
    pub fn errors(&self) -> Vec<(&'static str, f64)> {
        self.losses.errors()
    }

    /// Named [H, W, 3] u8 images of the first batch element
    pub fn visuals(&self) -> Vec<(&'static str, Tensor)> {
        visuals_of(&self.graph)
    }

    /// Source files of the domain A images in this step
    pub fn image_paths(&self) -> &[PathBuf] {
        &self.image_paths
    }

    /// Detached tensors of the step's forward graph
    pub fn graph(&self) -> &ForwardGraph {
        &self.graph
    }
}

fn visuals_of(graph: &ForwardGraph) -> Vec<(&'static str, Tensor)> {
    VISUAL_ORDER
        .iter()
        .filter_map(|node| graph.get(*node).map(|t| (node.name(), tensor_to_image(t))))
        .collect()
}

/// Differentiable generator loss terms, already weighted
struct GeneratorTerms {
    identity: Option<(Tensor, Tensor)>,
    g_a: Tensor,
    g_b: Tensor,
    cycle_a: Tensor,
    cycle_b: Tensor,
    syn_a: Tensor,
    syn_b: Tensor,
    cs_a: Tensor,
    cs_b: Tensor,
    feat: Tensor,
}

impl GeneratorTerms {
    fn total(&self) -> Tensor {
        let total = &self.g_a
            + &self.g_b
            + &self.cycle_a
            + &self.cycle_b
            + &self.syn_a
            + &self.syn_b
            + &self.cs_a
            + &self.cs_b
            + &self.feat;
        match &self.identity {
            Some((idt_a, idt_b)) => total + idt_a + idt_b,
            None => total,
        }
    }
}

fn scalar(t: &Tensor) -> f64 {
    t.double_value(&[])
}

/// PerCycleGAN model: networks, optimizers, replay buffers and schedule
pub struct PerCycleGan {
    weights: LossWeights,
    gan_mode: GanMode,
    direction: Direction,
    input_nc: i64,
    output_nc: i64,
    fine_size: i64,
    device: Device,
    gen_vs: VarStore,
    disc_a_vs: VarStore,
    disc_b_vs: VarStore,
    gen_a: Box<dyn ModuleT>,
    gen_b: Box<dyn ModuleT>,
    disc_a: Box<dyn ModuleT>,
    disc_b: Box<dyn ModuleT>,
    optimizer_g: nn::Optimizer,
    optimizer_d_a: nn::Optimizer,
    optimizer_d_b: nn::Optimizer,
    scheduler: LinearDecay,
    fake_a_pool: ImagePool,
    fake_b_pool: ImagePool,
    feature_loss: Box<dyn FeatureLoss>,
    checkpoints: CheckpointStore,
    input: Option<Batch>,
}

impl PerCycleGan {
    /// Build the four networks through `factory` and probe them with a dummy
    /// batch. Any shape disagreement is a configuration error.
    pub fn new(
        config: &Config,
        factory: &dyn NetworkFactory,
        feature_loss: Box<dyn FeatureLoss>,
    ) -> Result<Self> {
        config.validate()?;
        let training = &config.training;
        if let Some(seed) = training.seed {
            tch::manual_seed(seed as i64);
        }

        let device = config.device();
        let input_nc = config.model.input_nc;
        let output_nc = config.model.output_nc;

        // both generators share one store so a single optimizer updates them
        let gen_vs = VarStore::new(device);
        let gen_a = factory.generator(&(gen_vs.root() / NetworkId::GA.name()), input_nc, output_nc);
        let gen_b = factory.generator(&(gen_vs.root() / NetworkId::GB.name()), output_nc, input_nc);

        // D_A judges domain B, D_B judges domain A
        let disc_a_vs = VarStore::new(device);
        let disc_a = factory.discriminator(&(disc_a_vs.root() / NetworkId::DA.name()), output_nc);
        let disc_b_vs = VarStore::new(device);
        let disc_b = factory.discriminator(&(disc_b_vs.root() / NetworkId::DB.name()), input_nc);

        let adam = |vs: &VarStore| {
            nn::Adam {
                beta1: training.beta1,
                beta2: 0.999,
                ..Default::default()
            }
            .build(vs, training.lr)
        };
        let optimizer_g = adam(&gen_vs)?;
        let optimizer_d_a = adam(&disc_a_vs)?;
        let optimizer_d_b = adam(&disc_b_vs)?;

        let (fake_a_pool, fake_b_pool) = match training.seed {
            Some(seed) => (
                ImagePool::seeded(training.pool_size, seed),
                ImagePool::seeded(training.pool_size, seed.wrapping_add(1)),
            ),
            None => (ImagePool::new(training.pool_size), ImagePool::new(training.pool_size)),
        };

        let model = Self {
            weights: config.loss.clone(),
            gan_mode: config.model.gan_mode,
            direction: config.data.direction,
            input_nc,
            output_nc,
            fine_size: config.data.fine_size,
            device,
            gen_vs,
            disc_a_vs,
            disc_b_vs,
            gen_a,
            gen_b,
            disc_a,
            disc_b,
            optimizer_g,
            optimizer_d_a,
            optimizer_d_b,
            scheduler: LinearDecay::new(training.lr, training.niter_decay),
            fake_a_pool,
            fake_b_pool,
            feature_loss,
            checkpoints: CheckpointStore::new(config.experiment_dir()),
            input: None,
        };
        model.probe()?;

        tracing::info!(
            "PerCycleGAN ready: {} generator and {} + {} discriminator parameters on {:?}",
            count_parameters(&model.gen_vs),
            count_parameters(&model.disc_a_vs),
            count_parameters(&model.disc_b_vs),
            device
        );
        Ok(model)
    }

    fn probe(&self) -> Result<()> {
        tch::no_grad(|| -> Result<()> {
            let size = self.fine_size;
            let real_a = Tensor::zeros([1, self.input_nc, size, size], (Kind::Float, self.device));
            let real_b = Tensor::zeros([1, self.output_nc, size, size], (Kind::Float, self.device));

            let fake_b = self.gen_a.forward_t(&real_a, false);
            expect_size("G_A output", &fake_b, &real_b.size())?;
            let fake_a = self.gen_b.forward_t(&real_b, false);
            expect_size("G_B output", &fake_a, &real_a.size())?;

            for (name, disc, input) in [("D_A", &self.disc_a, &fake_b), ("D_B", &self.disc_b, &fake_a)] {
                let scores = disc.forward_t(input, false);
                if scores.dim() == 0 || scores.size()[0] != 1 {
                    return Err(Error::shape(format!("{} output", name), &[1], &scores.size()));
                }
            }
            Ok(())
        })
    }

    /// Store the batch for the next step, swapping domains for `BtoA`.
    ///
    /// Both domains must hold the same non-zero number of images. That number
    /// may be below `batch_size`, as for the short last batch of an epoch.
    pub fn set_input(&mut self, batch: Batch) -> Result<()> {
        let batch = match self.direction {
            Direction::AtoB => batch,
            Direction::BtoA => batch.swapped(),
        };

        let n = batch.a.size().first().copied().unwrap_or(0);
        let size = self.fine_size;
        if n == 0 {
            return Err(Error::shape(
                "real_A",
                &[1, self.input_nc, size, size],
                &batch.a.size(),
            ));
        }
        expect_size("real_A", &batch.a, &[n, self.input_nc, size, size])?;
        expect_size("real_B", &batch.b, &[n, self.output_nc, size, size])?;

        self.input = Some(Batch {
            a: batch.a.to_device(self.device),
            b: batch.b.to_device(self.device),
            a_paths: batch.a_paths,
            b_paths: batch.b_paths,
        });
        Ok(())
    }

    fn current_input(&self) -> Result<(Tensor, Tensor, Vec<PathBuf>)> {
        let batch = self.input.as_ref().ok_or(Error::NoInput)?;
        Ok((batch.a.shallow_clone(), batch.b.shallow_clone(), batch.a_paths.clone()))
    }

    /// Run one generator update followed by both discriminator updates
    pub fn optimize_parameters(&mut self) -> Result<StepResult> {
        let (real_a, real_b, image_paths) = self.current_input()?;

        self.optimizer_g.zero_grad();
        let graph = ForwardGraph::evaluate(
            self.gen_a.as_ref(),
            self.gen_b.as_ref(),
            &real_a,
            &real_b,
            self.weights.identity_enabled(),
            true,
        );
        let terms = self.generator_terms(&graph);
        let loss_g = terms.total();
        loss_g.backward();
        self.optimizer_g.step();

        // the generator backward also filled discriminator gradients
        self.optimizer_d_a.zero_grad();
        let fake_b = self.fake_b_pool.query(graph.fake_b()).detach();
        let loss_d_a = discriminator_loss(
            self.gan_mode,
            &self.disc_a.forward_t(&real_b, true),
            &self.disc_a.forward_t(&fake_b, true),
        );
        loss_d_a.backward();
        self.optimizer_d_a.step();

        self.optimizer_d_b.zero_grad();
        let fake_a = self.fake_a_pool.query(graph.fake_a()).detach();
        let loss_d_b = discriminator_loss(
            self.gan_mode,
            &self.disc_b.forward_t(&real_a, true),
            &self.disc_b.forward_t(&fake_a, true),
        );
        loss_d_b.backward();
        self.optimizer_d_b.step();

        let losses = LossReport {
            d_a: scalar(&loss_d_a),
            g_a: scalar(&terms.g_a),
            cycle_a: scalar(&terms.cycle_a),
            idt_a: terms.identity.as_ref().map(|(idt_a, _)| scalar(idt_a)),
            d_b: scalar(&loss_d_b),
            g_b: scalar(&terms.g_b),
            cycle_b: scalar(&terms.cycle_b),
            idt_b: terms.identity.as_ref().map(|(_, idt_b)| scalar(idt_b)),
            cs_a: scalar(&terms.cs_a),
            cs_b: scalar(&terms.cs_b),
            syn_a: scalar(&terms.syn_a),
            syn_b: scalar(&terms.syn_b),
            feat: scalar(&terms.feat),
            total_g: scalar(&loss_g),
        };

        Ok(StepResult {
            losses,
            graph: graph.detach(),
            image_paths,
        })
    }

    fn generator_terms(&self, graph: &ForwardGraph) -> GeneratorTerms {
        let w = &self.weights;
        let (real_a, real_b) = (graph.real_a(), graph.real_b());
        let (fake_a, fake_b) = (graph.fake_a(), graph.fake_b());
        let (rec_a, rec_b) = (graph.rec_a(), graph.rec_b());

        let identity = graph.identity().map(|(idt_a, idt_b)| {
            (
                weighted_l1(idt_a, real_b, w.lambda_b * w.identity),
                weighted_l1(idt_b, real_a, w.lambda_a * w.identity),
            )
        });

        let f = &w.feature;
        let feature_pairs = [
            (f.a_fake_a, fake_a, real_a),
            (f.b_fake_b, fake_b, real_b),
            (f.fake_a_rec_a, fake_a, rec_a),
            (f.fake_b_rec_b, fake_b, rec_b),
            (f.a_rec_a, rec_a, real_a),
            (f.b_rec_b, rec_b, real_b),
        ];
        let mut feat = Tensor::from(0f32).to_device(self.device);
        for (weight, x, y) in feature_pairs {
            if weight > 0.0 {
                feat = feat + self.feature_loss.get_loss(x, y) * weight;
            }
        }

        GeneratorTerms {
            identity,
            g_a: self.gan_mode.loss(&self.disc_a.forward_t(fake_b, true), true),
            g_b: self.gan_mode.loss(&self.disc_b.forward_t(fake_a, true), true),
            cycle_a: weighted_l1(rec_a, real_a, w.lambda_a),
            cycle_b: weighted_l1(rec_b, real_b, w.lambda_b),
            syn_a: weighted_l1(fake_a, real_a, w.lambda_syn_a),
            syn_b: weighted_l1(fake_b, real_b, w.lambda_syn_b),
            cs_a: weighted_l1(fake_a, &rec_a.detach(), w.lambda_cs_a),
            cs_b: weighted_l1(fake_b, &rec_b.detach(), w.lambda_cs_b),
            feat,
        }
    }

    /// Inference pass over the current batch without any update
    pub fn test(&self) -> Result<ForwardGraph> {
        let (real_a, real_b, _) = self.current_input()?;
        Ok(tch::no_grad(|| {
            ForwardGraph::evaluate(self.gen_a.as_ref(), self.gen_b.as_ref(), &real_a, &real_b, false, false)
        }))
    }

    /// Visuals of a forward graph, e.g. the one returned by [`Self::test`]
    pub fn visuals(graph: &ForwardGraph) -> Vec<(&'static str, Tensor)> {
        visuals_of(graph)
    }

    /// Apply one generator in inference mode
    pub fn translate(&self, mapping: Mapping, xs: &Tensor) -> Tensor {
        let generator = match mapping {
            Mapping::AtoB => &self.gen_a,
            Mapping::BtoA => &self.gen_b,
        };
        tch::no_grad(|| generator.forward_t(&xs.to_device(self.device), false))
    }

    /// Decay the shared learning rate one step and apply it to all optimizers
    pub fn update_learning_rate(&mut self) -> f64 {
        let lr = self.scheduler.decay_step();
        self.optimizer_g.set_lr(lr);
        self.optimizer_d_a.set_lr(lr);
        self.optimizer_d_b.set_lr(lr);
        tracing::info!("learning rate = {:.7}", lr);
        lr
    }

    pub fn current_lr(&self) -> f64 {
        self.scheduler.current_rate()
    }

    fn store_of(&self, network: NetworkId) -> &VarStore {
        match network {
            NetworkId::GA | NetworkId::GB => &self.gen_vs,
            NetworkId::DA => &self.disc_a_vs,
            NetworkId::DB => &self.disc_b_vs,
        }
    }

    /// Save all four networks under `label`
    pub fn save(&self, label: &str) -> Result<()> {
        for network in NetworkId::ALL {
            let path = self.checkpoints.network_path(label, network);
            save_network(self.store_of(network), network.name(), &path)?;
        }
        self.checkpoints.save_meta(label, self.current_lr())?;
        tracing::info!("Saved checkpoint '{}' to {}", label, self.checkpoints.dir().display());
        Ok(())
    }

    /// Restore all four networks from `label`. Nothing is loaded unless all
    /// four archives are present.
    pub fn load(&mut self, label: &str) -> Result<()> {
        self.checkpoints.ensure_complete(label)?;
        for network in NetworkId::ALL {
            let path = self.checkpoints.network_path(label, network);
            load_network(self.store_of(network), network.name(), &path)?;
        }
        tracing::info!("Loaded checkpoint '{}' from {}", label, self.checkpoints.dir().display());
        Ok(())
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }
}

fn expect_size(context: &str, tensor: &Tensor, expected: &[i64]) -> Result<()> {
    let actual = tensor.size();
    if actual != expected {
        return Err(Error::shape(context, expected, &actual));
    }
    Ok(())
}

fn count_parameters(vs: &VarStore) -> i64 {
    vs.trainable_variables().iter().map(|t| t.numel() as i64).sum()
}
