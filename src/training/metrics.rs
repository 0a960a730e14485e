//! Loss history for monitoring PerCycleGAN progress
//!
//! Step losses are accumulated per epoch and averaged when the epoch ends.
//! The resulting table is written as `loss_log.csv`.

use std::path::Path;

/// Per-epoch averaged losses
#[derive(Debug, Clone, Default)]
pub struct LossHistory {
    /// Loss names, fixed by the first recorded step
    names: Vec<String>,
    /// Epoch number of each row
    epochs: Vec<usize>,
    /// One averaged value per name
    rows: Vec<Vec<f64>>,
    /// Running sums of the current epoch
    sums: Vec<f64>,
    steps: usize,
}

impl LossHistory {
    /// Create new empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one step's named losses.
    ///
    /// Names not seen in the first step of the run are ignored.
    pub fn record_step(&mut self, errors: &[(&str, f64)]) {
        if self.names.is_empty() {
            self.names = errors.iter().map(|(name, _)| name.to_string()).collect();
        }
        if self.sums.len() != self.names.len() {
            self.sums = vec![0.0; self.names.len()];
        }
        for (name, value) in errors {
            if let Some(i) = self.names.iter().position(|n| n == name) {
                self.sums[i] += value;
            }
        }
        self.steps += 1;
    }

    /// Close the epoch and return its averages, or `None` if no step ran
    pub fn finish_epoch(&mut self, epoch: usize) -> Option<Vec<(String, f64)>> {
        if self.steps == 0 {
            return None;
        }
        let averages: Vec<f64> = self.sums.iter().map(|s| s / self.steps as f64).collect();
        self.epochs.push(epoch);
        self.rows.push(averages.clone());
        self.sums.iter_mut().for_each(|s| *s = 0.0);
        self.steps = 0;
        Some(self.names.iter().cloned().zip(averages).collect())
    }

    /// Get number of recorded epochs
    pub fn num_epochs(&self) -> usize {
        self.rows.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Latest averaged value of `name`
    pub fn latest(&self, name: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == name)?;
        self.rows.last().map(|row| row[i])
    }

    /// Save history to CSV file
    pub fn save_csv(&self, path: &Path) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        let mut header = vec!["epoch".to_string()];
        header.extend(self.names.iter().cloned());
        writer.write_record(&header)?;

        for (epoch, row) in self.epochs.iter().zip(&self.rows) {
            let mut record = vec![epoch.to_string()];
            record.extend(row.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load history from CSV file
    pub fn load_csv(path: &Path) -> anyhow::Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut history = Self::new();
        history.names = reader.headers()?.iter().skip(1).map(String::from).collect();
        history.sums = vec![0.0; history.names.len()];

        for result in reader.records() {
            let record = result?;
            history.epochs.push(record[0].parse()?);
            let row = record
                .iter()
                .skip(1)
                .map(|v| v.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()?;
            history.rows.push(row);
        }

        Ok(history)
    }
}

/// Exponential moving average tracker
#[derive(Debug)]
pub struct EmaTracker {
    value: f64,
    alpha: f64,
    initialized: bool,
}

impl EmaTracker {
    /// Create new EMA tracker
    ///
    /// # Arguments
    ///
    /// * `alpha` - Smoothing factor (0 < alpha <= 1). Higher = more weight on recent
    pub fn new(alpha: f64) -> Self {
        Self {
            value: 0.0,
            alpha: alpha.clamp(0.001, 1.0),
            initialized: false,
        }
    }

    /// Update with new value
    pub fn update(&mut self, new_value: f64) {
        if !self.initialized {
            self.value = new_value;
            self.initialized = true;
        } else {
            self.value = self.alpha * new_value + (1.0 - self.alpha) * self.value;
        }
    }

    /// Get current EMA value
    pub fn value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    #[test]
    fn test_epoch_averages() {
        let mut history = LossHistory::new();
        assert!(history.finish_epoch(1).is_none());

        history.record_step(&[("D_A", 1.0), ("G", 4.0)]);
        history.record_step(&[("D_A", 0.5), ("G", 2.0)]);
        let averages = history.finish_epoch(1).unwrap();

        assert_eq!(averages[0].0, "D_A");
        assert_relative_eq!(averages[0].1, 0.75);
        assert_relative_eq!(history.latest("G").unwrap(), 3.0);

        history.record_step(&[("D_A", 0.1), ("G", 1.0)]);
        history.finish_epoch(2);
        assert_eq!(history.num_epochs(), 2);
        assert_relative_eq!(history.latest("D_A").unwrap(), 0.1);
        assert!(history.latest("idt_A").is_none());
    }

    #[test]
    fn test_csv_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("loss_log.csv");

        let mut history = LossHistory::new();
        history.record_step(&[("D_A", 0.25), ("Syn_A", 1.5)]);
        history.finish_epoch(3);
        history.save_csv(&path).unwrap();

        let loaded = LossHistory::load_csv(&path).unwrap();
        assert_eq!(loaded.names(), ["D_A", "Syn_A"]);
        assert_relative_eq!(loaded.latest("Syn_A").unwrap(), 1.5);
    }

    #[test]
    fn test_ema_tracker() {
        let mut ema = EmaTracker::new(0.5);

        ema.update(10.0);
        assert_eq!(ema.value(), 10.0);

        ema.update(20.0);
        assert_eq!(ema.value(), 15.0);
    }
}
