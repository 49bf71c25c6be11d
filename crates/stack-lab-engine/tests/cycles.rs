//! End-to-end send/receive cycles through the full stack.
//!
//! Each test drives the real pipeline under a no-op sink and checks the
//! observable protocol state: sequence numbers, congestion window, per-layer
//! verdicts, counters.

use stack_lab_abstract::StackConfig;
use stack_lab_engine::{ConnectionState, Outcome, PipelineError, StackPipeline};

/// 15 bytes, the demo request line.
const PAYLOAD: &[u8] = b"GET / HTTP/1.1\n";

fn established() -> StackPipeline {
    let mut pipeline = StackPipeline::new(StackConfig::default());
    pipeline.establish(Some(1000), Some(5000)).unwrap();
    pipeline
}

#[test]
fn handshake_reaches_established_with_expected_numbers() {
    let pipeline = established();
    let machine = &pipeline.context().machine;

    assert_eq!(machine.state(), ConnectionState::Established);
    // SYN consumed one client slot, SYN-ACK one server slot.
    assert_eq!(machine.client().seq, 1001);
    assert_eq!(machine.client().ack, 5001);
    assert_eq!(machine.server().seq, 5001);
    assert_eq!(machine.server().ack, 1001);
}

#[test]
fn clean_cycle_delivers_and_advances_sequence_numbers() {
    let mut pipeline = established();
    let report = pipeline.send(PAYLOAD).unwrap();

    assert_eq!(report.outcome, Outcome::Delivered);
    assert!(report.verdicts.all_valid(), "verdicts: {:?}", report.verdicts);
    assert_eq!(report.client_seq_before, 1001);
    assert_eq!(report.client_seq_after, 1016);
    assert_eq!(report.server_ack_after, 1016);

    // 20 TCP + 20 IP + 14 MAC header + 4 FCS around 15 payload bytes.
    assert_eq!(report.overhead_bytes, 58);
    assert_eq!(report.frame_len, 73);
    // Manchester doubles the frame's bit count.
    assert_eq!(report.line_symbols, 73 * 16);

    let counters = pipeline.context().counters;
    assert_eq!(counters.packets_sent, 1);
    assert_eq!(counters.packets_received, 1);
    assert_eq!(counters.data_packets_lost, 0);
    assert_eq!(counters.app_data_sent_bytes, 15);
}

#[test]
fn window_walks_slow_start_then_congestion_avoidance() {
    let mut pipeline = established();
    let mut observed = Vec::new();
    for _ in 0..8 {
        observed.push(pipeline.send(PAYLOAD).unwrap().cwnd);
    }
    // Doubling up to ssthresh = 64, then linear.
    assert_eq!(observed, [2, 4, 8, 16, 32, 64, 65, 66]);
}

#[test]
fn forced_loss_resets_congestion_and_preserves_sequence() {
    let mut pipeline = established();
    for _ in 0..4 {
        pipeline.send(PAYLOAD).unwrap();
    }
    let seq_before = pipeline.context().machine.client().seq;
    let cwnd_before = pipeline.context().congestion.cwnd();
    assert_eq!(cwnd_before, 16);

    pipeline.force_loss_once();
    let report = pipeline.send(PAYLOAD).unwrap();

    assert_eq!(report.outcome, Outcome::Lost);
    // The lost segment still grew the window on send (16 -> 32) before the
    // collapse halved that back to 16.
    assert_eq!(report.cwnd, 1);
    assert_eq!(report.ssthresh, 16);
    assert_eq!(report.client_seq_after, seq_before);
    assert_eq!(pipeline.context().machine.client().seq, seq_before);

    let counters = pipeline.context().counters;
    assert_eq!(counters.data_packets_lost, 1);
    assert_eq!(counters.retransmissions, 1);
    assert_eq!(counters.packets_sent, 4);
}

#[test]
fn certain_loss_drops_every_cycle_while_active() {
    let config = StackConfig {
        loss_probability: 1.0,
        ..StackConfig::default()
    };
    let mut pipeline = StackPipeline::new(config);
    pipeline.establish(Some(1000), Some(5000)).unwrap();
    pipeline.set_loss_active(true);

    for _ in 0..3 {
        assert_eq!(pipeline.send(PAYLOAD).unwrap().outcome, Outcome::Lost);
    }
    assert_eq!(pipeline.context().machine.client().seq, 1001);

    pipeline.set_loss_active(false);
    assert_eq!(pipeline.send(PAYLOAD).unwrap().outcome, Outcome::Delivered);
    assert_eq!(pipeline.context().machine.client().seq, 1016);
}

#[test]
fn loss_simulation_off_means_no_drops_even_at_probability_one() {
    let config = StackConfig {
        loss_probability: 1.0,
        ..StackConfig::default()
    };
    let mut pipeline = StackPipeline::new(config);
    pipeline.establish(Some(1000), Some(5000)).unwrap();
    assert_eq!(pipeline.send(PAYLOAD).unwrap().outcome, Outcome::Delivered);
}

#[test]
fn corrupted_length_field_fails_network_but_not_link() {
    let mut pipeline = established();
    // Total length is 55 (0x0037); flipping bit 2 of the low byte shortens it
    // to 51, so the checksum breaks and the payload slice truncates.
    pipeline.corrupt_network_byte_once(3, 0x04);
    let report = pipeline.send(PAYLOAD).unwrap();

    assert_eq!(report.outcome, Outcome::Delivered);
    assert!(report.verdicts.physical);
    assert!(report.verdicts.link, "link frame keeps its own capture");
    assert!(!report.verdicts.network);
    assert!(!report.verdicts.transport);
    assert!(!report.verdicts.application);

    // Failures are surfaced, not fatal: the transfer still completes.
    assert_eq!(report.client_seq_after, 1016);
    assert_eq!(report.server_ack_after, 1016);
    assert_eq!(pipeline.context().counters.packets_sent, 1);
    assert_eq!(pipeline.context().counters.packets_received, 0);
}

#[test]
fn corrupted_payload_byte_leaves_network_header_valid() {
    let mut pipeline = established();
    // Byte 45 sits in the application payload region (40..55): the IP header
    // checksum does not cover it, the TCP checksum and byte compare do.
    pipeline.corrupt_network_byte_once(45, 0xFF);
    let report = pipeline.send(PAYLOAD).unwrap();

    assert!(report.verdicts.link);
    assert!(report.verdicts.network);
    assert!(!report.verdicts.transport);
    assert!(!report.verdicts.application);
}

#[test]
fn counters_accumulate_across_cycles() {
    let mut pipeline = established();
    for _ in 0..3 {
        pipeline.send(PAYLOAD).unwrap();
    }
    let report = pipeline.report();
    assert_eq!(report.counters.packets_sent, 3);
    assert_eq!(report.counters.app_data_sent_bytes, 45);
    assert_eq!(report.counters.total_overhead_bytes, 174);
    assert_eq!(report.cycles.len(), 3);

    let expected = 45.0 / (45.0 + 174.0) * 100.0;
    assert!((report.efficiency_percent - expected).abs() < 1e-9);
    assert!(report.estimated_throughput_bps > 0.0);
}

#[test]
fn congestion_event_collapses_window_and_degrades_rtt() {
    let mut pipeline = established();
    for _ in 0..3 {
        pipeline.send(PAYLOAD).unwrap();
    }
    assert_eq!(pipeline.context().congestion.cwnd(), 8);

    pipeline.trigger_congestion_event();
    let congestion = &pipeline.context().congestion;
    assert_eq!(congestion.cwnd(), 1);
    assert_eq!(congestion.ssthresh(), 4);
    assert_eq!(congestion.rtt_ms(), 75);
}

#[test]
fn send_requires_an_established_connection() {
    let mut pipeline = StackPipeline::new(StackConfig::default());
    assert_eq!(pipeline.send(PAYLOAD).unwrap_err(), PipelineError::NotConnected);
}

#[test]
fn same_seed_produces_identical_sessions() {
    let config = StackConfig {
        loss_probability: 0.5,
        seed: 99,
        ..StackConfig::default()
    };

    let run = |cfg: StackConfig| {
        let mut pipeline = StackPipeline::new(cfg);
        pipeline.establish(None, None).unwrap();
        pipeline.set_loss_active(true);
        let outcomes: Vec<_> = (0..10)
            .map(|_| pipeline.send(PAYLOAD).unwrap().outcome)
            .collect();
        (outcomes, pipeline.context().machine.client().seq)
    };

    assert_eq!(run(config.clone()), run(config));
}
