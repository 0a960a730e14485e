//! Linear learning-rate decay shared by the three optimizers

/// Decays the rate by `initial_rate / decay_horizon` per call.
///
/// No lower bound: calling it more than `decay_horizon` times drives the
/// rate below zero.
#[derive(Debug, Clone)]
pub struct LinearDecay {
    initial_rate: f64,
    decay_horizon: usize,
    current_rate: f64,
}

impl LinearDecay {
    pub fn new(initial_rate: f64, decay_horizon: usize) -> Self {
        Self {
            initial_rate,
            decay_horizon,
            current_rate: initial_rate,
        }
    }

    /// Amount removed by each call to `decay_step`
    pub fn step_size(&self) -> f64 {
        self.initial_rate / self.decay_horizon as f64
    }

    /// Apply one decay step and return the new rate
    pub fn decay_step(&mut self) -> f64 {
        self.current_rate -= self.step_size();
        self.current_rate
    }

    pub fn current_rate(&self) -> f64 {
        self.current_rate
    }

    pub fn initial_rate(&self) -> f64 {
        self.initial_rate
    }
}
