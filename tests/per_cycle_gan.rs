mod common;

use std::path::PathBuf;

use approx::assert_abs_diff_eq;
use percyclegan::{
    model::{GeneratorArch, Mapping, PerCycleGan, StandardNetworks},
    training::ContentLoss,
    utils::config::Direction,
    Batch, Error, NetworkId,
};
use tch::{Device, Kind, Tensor};
use tempfile::tempdir;

use common::{tiny_config, IdentityNetworks, PointwiseNetworks};

fn constant(channels: i64, value: f64) -> Tensor {
    Tensor::full([1, channels, 4, 4], value, (Kind::Float, Device::Cpu))
}

fn zeros_and_ones() -> Batch {
    Batch::from_tensors(constant(1, 0.0), constant(1, 1.0))
}

#[test]
fn identity_generators_reproduce_known_losses() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let mut model = PerCycleGan::new(&config, &IdentityNetworks, Box::new(ContentLoss)).unwrap();

    model.set_input(zeros_and_ones()).unwrap();
    let step = model.optimize_parameters().unwrap();
    let losses = step.losses();

    assert_abs_diff_eq!(losses.g_a, 0.25, epsilon = 1e-6);
    assert_abs_diff_eq!(losses.g_b, 0.25, epsilon = 1e-6);
    assert_abs_diff_eq!(losses.cycle_a, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(losses.cycle_b, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(losses.idt_a.unwrap(), 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(losses.idt_b.unwrap(), 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(losses.syn_a, 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(losses.syn_b, 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(losses.cs_a, 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(losses.cs_b, 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(losses.feat, 4.0, epsilon = 1e-6);
    assert_abs_diff_eq!(losses.total_g, 8.5, epsilon = 1e-5);

    // critics predicting 0.5 everywhere
    assert_abs_diff_eq!(losses.d_a, 0.25, epsilon = 1e-6);
    assert_abs_diff_eq!(losses.d_b, 0.25, epsilon = 1e-6);
}

#[test]
fn cycle_of_identity_generators_is_exact() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let mut model = PerCycleGan::new(&config, &IdentityNetworks, Box::new(ContentLoss)).unwrap();

    let real_a = Tensor::randn([1, 1, 4, 4], (Kind::Float, Device::Cpu));
    let real_b = Tensor::randn([1, 1, 4, 4], (Kind::Float, Device::Cpu));
    model
        .set_input(Batch::from_tensors(real_a.copy(), real_b.copy()))
        .unwrap();
    let step = model.optimize_parameters().unwrap();

    assert!(step.graph().rec_a().equal(&real_a));
    assert!(step.graph().rec_b().equal(&real_b));
    assert_eq!(step.losses().cycle_a, 0.0);
}

#[test]
fn disabled_identity_drops_terms_from_the_objective() {
    let dir = tempdir().unwrap();
    let mut config = tiny_config(dir.path());
    config.loss.identity = 0.0;
    config.loss.lambda_syn_a = 2.0;
    let mut model = PerCycleGan::new(&config, &IdentityNetworks, Box::new(ContentLoss)).unwrap();

    model.set_input(zeros_and_ones()).unwrap();
    let step = model.optimize_parameters().unwrap();
    let losses = step.losses();

    assert!(losses.idt_a.is_none() && losses.idt_b.is_none());
    assert!(step.graph().identity().is_none());
    assert!(step.errors().iter().all(|(name, _)| !name.starts_with("idt")));

    let sum = losses.g_a
        + losses.g_b
        + losses.cycle_a
        + losses.cycle_b
        + losses.syn_a
        + losses.syn_b
        + losses.cs_a
        + losses.cs_b
        + losses.feat;
    assert_abs_diff_eq!(losses.total_g, sum, epsilon = 1e-5);
    assert_abs_diff_eq!(losses.total_g, 9.5, epsilon = 1e-5);
}

#[test]
fn step_reports_visuals_and_paths() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let mut model = PerCycleGan::new(&config, &IdentityNetworks, Box::new(ContentLoss)).unwrap();

    let mut batch = zeros_and_ones();
    batch.a_paths = vec![PathBuf::from("trainA/0001.png")];
    batch.b_paths = vec![PathBuf::from("trainB/0042.png")];
    model.set_input(batch).unwrap();
    let step = model.optimize_parameters().unwrap();

    let visuals = step.visuals();
    let names: Vec<_> = visuals.iter().map(|(name, _)| *name).collect();
    assert_eq!(
        names,
        ["real_A", "fake_B", "rec_A", "idt_B", "real_B", "fake_A", "rec_B", "idt_A"]
    );
    for (_, image) in &visuals {
        assert_eq!(image.size(), vec![4, 4, 3]);
    }
    assert_eq!(step.image_paths(), [PathBuf::from("trainA/0001.png")]);
    assert_eq!(step.errors().len(), 14);
}

#[test]
fn step_without_input_fails() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let mut model = PerCycleGan::new(&config, &IdentityNetworks, Box::new(ContentLoss)).unwrap();

    assert!(matches!(model.optimize_parameters(), Err(Error::NoInput)));
    assert!(matches!(model.test(), Err(Error::NoInput)));
}

#[test]
fn set_input_rejects_wrong_shapes() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let mut model = PerCycleGan::new(&config, &IdentityNetworks, Box::new(ContentLoss)).unwrap();

    let wrong_channels = Batch::from_tensors(constant(3, 0.0), constant(1, 1.0));
    assert!(matches!(
        model.set_input(wrong_channels),
        Err(Error::ShapeMismatch { .. })
    ));

    let wrong_size = Batch::from_tensors(
        Tensor::zeros([1, 1, 8, 8], (Kind::Float, Device::Cpu)),
        Tensor::zeros([1, 1, 8, 8], (Kind::Float, Device::Cpu)),
    );
    assert!(matches!(model.set_input(wrong_size), Err(Error::ShapeMismatch { .. })));
}

#[test]
fn set_input_rejects_empty_batches() {
    let dir = tempdir().unwrap();
    let mut config = tiny_config(dir.path());
    config.data.batch_size = 4;
    let mut model = PerCycleGan::new(&config, &IdentityNetworks, Box::new(ContentLoss)).unwrap();

    let empty = Batch::from_tensors(
        Tensor::zeros([0, 1, 4, 4], (Kind::Float, Device::Cpu)),
        Tensor::zeros([0, 1, 4, 4], (Kind::Float, Device::Cpu)),
    );
    match model.set_input(empty) {
        Err(Error::ShapeMismatch { context, actual, .. }) => {
            assert_eq!(context, "real_A");
            assert_eq!(actual, vec![0, 1, 4, 4]);
        }
        other => panic!("expected a shape mismatch, got {:?}", other.err()),
    }
    // nothing was stored, so a step still has no input
    assert!(matches!(model.optimize_parameters(), Err(Error::NoInput)));

    // a single image below batch_size is fine
    model.set_input(zeros_and_ones()).unwrap();
    assert!(model.optimize_parameters().is_ok());
}

#[test]
fn generator_with_wrong_channels_fails_at_construction() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let networks = PointwiseNetworks { extra_channels: 1 };

    let result = PerCycleGan::new(&config, &networks, Box::new(ContentLoss));
    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
}

#[test]
fn reversed_direction_swaps_domains() {
    let dir = tempdir().unwrap();
    let mut config = tiny_config(dir.path());
    config.model.output_nc = 3;
    config.loss.identity = 0.0;
    config.data.direction = Direction::BtoA;
    let networks = PointwiseNetworks { extra_channels: 0 };
    let mut model = PerCycleGan::new(&config, &networks, Box::new(ContentLoss)).unwrap();

    // folder A holds the 3-channel domain here
    model
        .set_input(Batch::from_tensors(constant(3, 1.0), constant(1, 0.0)))
        .unwrap();
    let graph = model.test().unwrap();

    assert_eq!(graph.real_a().size(), vec![1, 1, 4, 4]);
    assert_eq!(graph.fake_b().size(), vec![1, 3, 4, 4]);
    assert!(graph.identity().is_none());
}

#[test]
fn learning_rate_decays_linearly() {
    let dir = tempdir().unwrap();
    let mut config = tiny_config(dir.path());
    config.training.lr = 0.1;
    config.training.niter_decay = 10;
    let mut model = PerCycleGan::new(&config, &IdentityNetworks, Box::new(ContentLoss)).unwrap();

    let mut previous = model.current_lr();
    for _ in 0..10 {
        let lr = model.update_learning_rate();
        assert_abs_diff_eq!(previous - lr, 0.01, epsilon = 1e-12);
        previous = lr;
    }
    assert_abs_diff_eq!(model.current_lr(), 0.0, epsilon = 1e-12);
}

fn standard_config(dir: &std::path::Path, seed: u64) -> percyclegan::Config {
    let mut config = tiny_config(dir);
    config.model.input_nc = 3;
    config.model.output_nc = 3;
    config.model.ngf = 4;
    config.model.ndf = 4;
    config.model.which_model_net_g = GeneratorArch::Resnet6Blocks;
    config.data.load_size = 32;
    config.data.fine_size = 32;
    config.training.seed = Some(seed);
    config
}

#[test]
fn save_and_load_reproduce_generator_outputs() {
    let dir = tempdir().unwrap();
    let xs = Tensor::rand([1, 3, 32, 32], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;

    let config = standard_config(dir.path(), 1);
    let saved = PerCycleGan::new(&config, &StandardNetworks::from_config(&config), Box::new(ContentLoss)).unwrap();
    saved.save("5").unwrap();
    let expected_a = saved.translate(Mapping::AtoB, &xs);
    let expected_b = saved.translate(Mapping::BtoA, &xs);

    for network in NetworkId::ALL {
        assert!(saved.checkpoints().network_path("5", network).is_file());
    }
    assert_eq!(saved.checkpoints().load_meta("5").unwrap().label, "5");

    let config = standard_config(dir.path(), 2);
    let mut restored =
        PerCycleGan::new(&config, &StandardNetworks::from_config(&config), Box::new(ContentLoss)).unwrap();
    assert!(!restored.translate(Mapping::AtoB, &xs).equal(&expected_a));

    restored.load("5").unwrap();
    assert!(restored.translate(Mapping::AtoB, &xs).equal(&expected_a));
    assert!(restored.translate(Mapping::BtoA, &xs).equal(&expected_b));
}

#[test]
fn loading_requires_all_four_networks() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let mut model = PerCycleGan::new(&config, &IdentityNetworks, Box::new(ContentLoss)).unwrap();

    assert!(matches!(
        model.load("latest"),
        Err(Error::MissingCheckpoint { .. })
    ));

    model.save("latest").unwrap();
    std::fs::remove_file(model.checkpoints().network_path("latest", NetworkId::DB)).unwrap();
    match model.load("latest") {
        Err(Error::MissingCheckpoint { network, label, .. }) => {
            assert_eq!(network, "D_B");
            assert_eq!(label, "latest");
        }
        other => panic!("expected a missing checkpoint, got {:?}", other.err()),
    }
}
