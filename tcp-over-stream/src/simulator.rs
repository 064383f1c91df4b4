//! Synthetic packet-loss injection.
//!
//! Every outbound data segment passes through a [`LossSimulator`] before it
//! reaches the wire.  A dropped segment is still tracked as unacknowledged
//! and still gets a retransmission timer, so the recovery machinery cannot
//! tell a simulated drop from a real one.
//!
//! The gate is a Bernoulli trial driven by a [`StdRng`]; passing a seed makes
//! a lossy run reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Outcome of one pass through the drop gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Send,
    Drop,
}

/// Bernoulli drop gate.
#[derive(Debug)]
pub struct LossSimulator {
    rng: StdRng,
    probability: f64,
}

impl LossSimulator {
    /// `probability` is clamped into `[0, 1]`.  Without a seed the RNG is
    /// seeded from the operating system.
    pub fn new(probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            probability: probability.clamp(0.0, 1.0),
        }
    }

    /// Decide the fate of one transmission attempt.
    pub fn decide(&mut self) -> Verdict {
        if self.probability > 0.0 && self.rng.random::<f64>() < self.probability {
            Verdict::Drop
        } else {
            Verdict::Send
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}
