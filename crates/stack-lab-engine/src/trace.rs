//! Serializable records of what a session did, for JSON traces and
//! scenario assertions.

use serde::Serialize;
use stack_lab_abstract::StackConfig;

use crate::connection::{ConnectionState, SequenceSpace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Delivered,
    Lost,
}

/// Independent per-layer validity verdicts from one receive pass. A lost
/// cycle never runs the receive side, so its verdicts stay all-false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LayerVerdicts {
    pub physical: bool,
    pub link: bool,
    pub network: bool,
    pub transport: bool,
    pub application: bool,
}

impl LayerVerdicts {
    pub fn all_valid(&self) -> bool {
        self.physical && self.link && self.network && self.transport && self.application
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: u64,
    pub outcome: Outcome,
    pub payload_len: usize,
    pub verdicts: LayerVerdicts,
    pub client_seq_before: u32,
    pub client_seq_after: u32,
    pub server_ack_after: u32,
    pub cwnd: u32,
    pub ssthresh: u32,
    pub rtt_ms: u64,
    /// Header and trailer bytes added around the payload this cycle.
    pub overhead_bytes: usize,
    pub frame_len: usize,
    /// Manchester symbols on the line (twice the frame's bit count).
    pub line_symbols: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Counters {
    /// Cycles attempted, including lost ones.
    pub cycles_started: u64,
    /// Cycles that completed the receive side.
    pub packets_sent: u32,
    /// Cycles whose reconstructed payload matched the original.
    pub packets_received: u32,
    pub data_packets_lost: u32,
    pub retransmissions: u32,
    pub app_data_sent_bytes: u64,
    pub total_overhead_bytes: u64,
}

impl Counters {
    /// Share of transmitted bytes that were application data.
    pub fn efficiency_percent(&self) -> f64 {
        if self.app_data_sent_bytes == 0 {
            return 0.0;
        }
        let total = (self.app_data_sent_bytes + self.total_overhead_bytes) as f64;
        self.app_data_sent_bytes as f64 / total * 100.0
    }
}

/// Rough bits-per-second figure from the most recent delivered cycle.
pub fn estimated_throughput_bps(cycles: &[CycleReport]) -> f64 {
    cycles
        .iter()
        .rev()
        .find(|c| c.outcome == Outcome::Delivered)
        .map(|c| (c.payload_len as f64 * 8.0) / (c.rtt_ms.max(1) as f64 / 1000.0))
        .unwrap_or(0.0)
}

/// Snapshot of a whole session, written as the JSON trace.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub config: StackConfig,
    pub state: ConnectionState,
    pub client: SequenceSpace,
    pub server: SequenceSpace,
    pub counters: Counters,
    pub cycles: Vec<CycleReport>,
    pub efficiency_percent: f64,
    pub estimated_throughput_bps: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivered_cycle(payload_len: usize, rtt_ms: u64) -> CycleReport {
        CycleReport {
            cycle_id: 1,
            outcome: Outcome::Delivered,
            payload_len,
            verdicts: LayerVerdicts::default(),
            client_seq_before: 0,
            client_seq_after: payload_len as u32,
            server_ack_after: payload_len as u32,
            cwnd: 2,
            ssthresh: 64,
            rtt_ms,
            overhead_bytes: 58,
            frame_len: 73,
            line_symbols: 73 * 16,
        }
    }

    #[test]
    fn efficiency_counts_only_app_bytes_as_useful() {
        let counters = Counters {
            app_data_sent_bytes: 42,
            total_overhead_bytes: 58,
            ..Counters::default()
        };
        assert!((counters.efficiency_percent() - 42.0).abs() < 1e-9);
        assert_eq!(Counters::default().efficiency_percent(), 0.0);
    }

    #[test]
    fn throughput_uses_last_delivered_cycle() {
        let cycles = vec![delivered_cycle(100, 50)];
        // 800 bits over 0.05s = 16000 bps.
        assert!((estimated_throughput_bps(&cycles) - 16000.0).abs() < 1e-9);
        assert_eq!(estimated_throughput_bps(&[]), 0.0);
    }
}
