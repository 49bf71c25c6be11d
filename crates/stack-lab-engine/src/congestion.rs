//! Congestion window bookkeeping: slow start below the threshold, additive
//! increase above it, multiplicative decrease on loss.

use tracing::debug;

/// cwnd and ssthresh are in MSS units; rtt in milliseconds.
///
/// Only three transitions exist: [`on_segment_sent`](Self::on_segment_sent)
/// grows the window, [`on_loss_detected`](Self::on_loss_detected) and
/// [`on_congestion_event`](Self::on_congestion_event) collapse it. The
/// invariants cwnd >= 1 and ssthresh >= 2 hold across all of them.
#[derive(Debug, Clone)]
pub struct CongestionController {
    cwnd: u32,
    ssthresh: u32,
    rtt_ms: u64,
}

impl CongestionController {
    pub fn new(initial_ssthresh: u32, base_rtt_ms: u64) -> Self {
        Self {
            cwnd: 1,
            ssthresh: initial_ssthresh.max(2),
            rtt_ms: base_rtt_ms,
        }
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    pub fn rtt_ms(&self) -> u64 {
        self.rtt_ms
    }

    /// Window field value for the transport header: cwnd in bytes, clamped to
    /// what 16 bits can carry.
    pub fn window_bytes(&self, mss: u16) -> u16 {
        (self.cwnd as u64 * mss as u64).min(u16::MAX as u64) as u16
    }

    /// Grow the window for one transmitted segment: double during slow start,
    /// increment by one in congestion avoidance.
    pub fn on_segment_sent(&mut self) {
        if self.cwnd < self.ssthresh {
            self.cwnd *= 2;
            debug!(cwnd = self.cwnd, "slow start: window doubled");
        } else {
            self.cwnd += 1;
            debug!(cwnd = self.cwnd, "congestion avoidance: window incremented");
        }
    }

    /// Loss response: halve the threshold (floor, never below 2), restart the
    /// window at one segment.
    pub fn on_loss_detected(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(2);
        self.cwnd = 1;
        debug!(
            cwnd = self.cwnd,
            ssthresh = self.ssthresh,
            "loss detected: window reset"
        );
    }

    /// External congestion signal: same collapse as loss, and the simulated
    /// round-trip time degrades by half again, capped at 500ms.
    pub fn on_congestion_event(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(2);
        self.cwnd = 1;
        self.rtt_ms = (self.rtt_ms * 3 / 2).min(500);
        debug!(
            cwnd = self.cwnd,
            ssthresh = self.ssthresh,
            rtt_ms = self.rtt_ms,
            "congestion event"
        );
    }
}
