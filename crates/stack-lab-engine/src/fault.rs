//! Loss and corruption injection for the in-flight frame.
//!
//! The coin flips draw from a random source the caller owns (seeded once per
//! session), so runs replay exactly. Deterministic one-shot hooks bypass the
//! probabilities for tests and scenarios.

use rand::Rng;
use stack_lab_abstract::StackConfig;
use tracing::debug;

/// What the injector decided to do to one in-flight transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultEvent {
    /// The frame never arrives; the receive side does not run.
    Loss,
    /// `mask` is XORed into the network unit byte at `offset`.
    Corruption { offset: usize, mask: u8 },
}

#[derive(Debug, Clone)]
pub struct FaultInjector {
    loss_probability: f64,
    corrupt_probability: f64,
    loss_active: bool,
    forced_losses: u32,
    forced_corruptions: Vec<(usize, u8)>,
}

impl FaultInjector {
    pub fn new(config: &StackConfig) -> Self {
        Self {
            loss_probability: config.loss_probability,
            corrupt_probability: config.corrupt_probability,
            loss_active: false,
            forced_losses: 0,
            forced_corruptions: Vec::new(),
        }
    }

    pub fn loss_active(&self) -> bool {
        self.loss_active
    }

    pub fn set_loss_active(&mut self, active: bool) {
        self.loss_active = active;
    }

    /// Drop the next frame unconditionally.
    pub fn force_loss_once(&mut self) {
        self.forced_losses += 1;
    }

    /// Flip `mask` into byte `offset` of the next in-flight network unit.
    pub fn corrupt_network_byte_once(&mut self, offset: usize, mask: u8) {
        self.forced_corruptions.push((offset, mask));
    }

    /// Decide the fate of one transmission. At most one event per cycle;
    /// loss takes precedence over corruption.
    pub fn sample(&mut self, rng: &mut impl Rng, unit_len: usize) -> Option<FaultEvent> {
        if self.forced_losses > 0 {
            self.forced_losses -= 1;
            debug!("forced loss consumed");
            return Some(FaultEvent::Loss);
        }
        if self.loss_active && rng.random::<f64>() < self.loss_probability {
            debug!("random loss draw hit");
            return Some(FaultEvent::Loss);
        }
        if !self.forced_corruptions.is_empty() {
            let (offset, mask) = self.forced_corruptions.remove(0);
            debug!(offset, mask, "forced corruption consumed");
            return Some(FaultEvent::Corruption { offset, mask });
        }
        if unit_len > 0
            && self.corrupt_probability > 0.0
            && rng.random::<f64>() < self.corrupt_probability
        {
            let offset = rng.random_range(0..unit_len);
            let mask = 1u8 << rng.random_range(0..8);
            debug!(offset, mask, "random corruption draw hit");
            return Some(FaultEvent::Corruption { offset, mask });
        }
        None
    }
}
