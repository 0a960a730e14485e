//! Epoch driver for PerCycleGAN
//!
//! Runs `niter` epochs at the initial learning rate followed by
//! `niter_decay` epochs of linear decay, with step-based logging and
//! `latest` checkpoints plus epoch-labelled checkpoints.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::metrics::{EmaTracker, LossHistory};
use crate::data::DataLoader;
use crate::model::PerCycleGan;
use crate::utils::config::{Config, TrainingConfig};

/// PerCycleGAN trainer
pub struct Trainer {
    config: Config,
    history: LossHistory,
    total_steps: usize,
}

fn format_errors(errors: &[(&str, f64)]) -> String {
    errors
        .iter()
        .map(|(name, value)| format!("{}: {:.3}", name, value))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Trainer {
    /// Create a new trainer
    pub fn new(config: Config) -> Self {
        Self {
            config,
            history: LossHistory::new(),
            total_steps: 0,
        }
    }

    fn schedule(&self) -> &TrainingConfig {
        &self.config.training
    }

    /// Train `model` on `data_loader` from `epoch_count` to the last decay epoch.
    ///
    /// When resuming at a later `epoch_count`, the learning rate is first
    /// decayed as many times as the skipped decay epochs would have done.
    pub fn train(
        &mut self,
        model: &mut PerCycleGan,
        data_loader: &mut DataLoader,
    ) -> anyhow::Result<&LossHistory> {
        let schedule = self.schedule().clone();
        let total_epochs = self.config.total_epochs();

        for epoch in 1..schedule.epoch_count {
            if epoch > schedule.niter {
                model.update_learning_rate();
            }
        }

        info!(
            "Starting training for epochs {}..={}, {} batches per epoch",
            schedule.epoch_count,
            total_epochs,
            data_loader.num_batches()
        );

        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-");
        let mut smoothed_g = EmaTracker::new(0.1);

        for epoch in schedule.epoch_count..=total_epochs {
            let started = std::time::Instant::now();
            let mut epoch_iter = 0;

            let pb = ProgressBar::new(data_loader.num_batches() as u64);
            pb.set_style(style.clone());

            for batch in data_loader.by_ref() {
                let batch = batch?;
                let batch_size = batch.len();
                self.total_steps += batch_size;
                epoch_iter += batch_size;

                model.set_input(batch)?;
                let step = model.optimize_parameters()?;
                let errors = step.errors();
                self.history.record_step(&errors);
                smoothed_g.update(step.losses().total_g);

                if self.total_steps % schedule.print_freq == 0 {
                    info!(
                        "(epoch: {}, iters: {}) {}",
                        epoch,
                        epoch_iter,
                        format_errors(&errors)
                    );
                }

                if self.total_steps % schedule.save_latest_freq == 0 {
                    info!(
                        "Saving the latest model (epoch {}, total_steps {})",
                        epoch, self.total_steps
                    );
                    model.save("latest")?;
                }

                pb.set_message(format!("G: {:.4}", smoothed_g.value()));
                pb.inc(1);
            }
            pb.finish_with_message("done");

            if let Some(averages) = self.history.finish_epoch(epoch) {
                let line = averages
                    .iter()
                    .map(|(name, value)| format!("{}: {:.3}", name, value))
                    .collect::<Vec<_>>()
                    .join(" ");
                info!("Epoch {} averages: {}", epoch, line);
            }

            if epoch % schedule.save_epoch_freq == 0 {
                info!(
                    "Saving the model at the end of epoch {}, iters {}",
                    epoch, self.total_steps
                );
                model.save("latest")?;
                model.save(&epoch.to_string())?;
            }

            info!(
                "End of epoch {} / {} \t Time Taken: {} sec",
                epoch,
                total_epochs,
                started.elapsed().as_secs()
            );

            if epoch > schedule.niter {
                model.update_learning_rate();
            }
            data_loader.reset();
        }

        let log_path = self.config.experiment_dir().join("loss_log.csv");
        std::fs::create_dir_all(self.config.experiment_dir())?;
        self.history.save_csv(&log_path)?;
        info!("Wrote loss history to {}", log_path.display());

        Ok(&self.history)
    }

    /// Get loss history
    pub fn history(&self) -> &LossHistory {
        &self.history
    }

    /// Images processed so far
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Get configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_errors() {
        let line = format_errors(&[("D_A", 0.25), ("G", 8.5)]);
        assert_eq!(line, "D_A: 0.250 G: 8.500");
    }
}
