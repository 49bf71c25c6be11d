//! One send/receive cycle through the whole stack.
//!
//! Encode runs strictly downward (Application, Transport, Network, Link,
//! Physical), the fault injector gets one shot at the in-flight frame, then
//! decode runs strictly upward with an independent validity verdict at every
//! layer. A failed verdict never aborts the cycle: surfacing every layer's
//! result on every run is the point of this stack, so the pipeline keeps
//! going and reports.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

use stack_lab_abstract::{Endpoint, Layer, NullSink, PresentationSink, StackConfig};

use crate::checksum;
use crate::congestion::CongestionController;
use crate::connection::{ConnectionMachine, ConnectionState};
use crate::fault::{FaultEvent, FaultInjector};
use crate::line;
use crate::trace::{Counters, CycleReport, LayerVerdicts, Outcome, SessionReport, estimated_throughput_bps};
use crate::wire::{self, tcp_flags};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("cannot send: connection is not established")]
    NotConnected,
    #[error("cannot send: a transmission cycle is already in flight")]
    Busy,
    #[error("cannot establish: connection is not closed")]
    AlreadyConnected,
}

/// Injectable stand-in for propagation and processing delay. The pipeline
/// calls it between stages; a cycle never interleaves with another no matter
/// how long a pause takes.
pub trait Pacer {
    fn pause(&mut self, duration_ms: u64);
}

/// Default pacer: no delay at all (tests, headless runs).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPacer;

impl Pacer for NoopPacer {
    fn pause(&mut self, _duration_ms: u64) {}
}

/// Pacer that really sleeps, for demo runs a human watches.
#[derive(Debug, Default, Clone, Copy)]
pub struct SleepPacer;

impl Pacer for SleepPacer {
    fn pause(&mut self, duration_ms: u64) {
        std::thread::sleep(std::time::Duration::from_millis(duration_ms));
    }
}

/// All mutable simulation state, in one place and single-writer: the
/// connection machine, the congestion controller and the session counters.
#[derive(Debug, Clone)]
pub struct SimulationContext {
    pub machine: ConnectionMachine,
    pub congestion: CongestionController,
    pub counters: Counters,
}

/// Orchestrates handshake and transfer cycles against a presentation sink.
pub struct StackPipeline {
    config: StackConfig,
    context: SimulationContext,
    faults: FaultInjector,
    rng: StdRng,
    sink: Box<dyn PresentationSink>,
    pacer: Box<dyn Pacer>,
    in_flight: bool,
    cycles: Vec<CycleReport>,
}

impl StackPipeline {
    pub fn new(config: StackConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let faults = FaultInjector::new(&config);
        let congestion = CongestionController::new(config.initial_ssthresh, config.base_rtt_ms);
        Self {
            context: SimulationContext {
                machine: ConnectionMachine::new(),
                congestion,
                counters: Counters::default(),
            },
            faults,
            rng,
            sink: Box::new(NullSink),
            pacer: Box::new(NoopPacer),
            in_flight: false,
            cycles: Vec::new(),
            config,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn PresentationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_pacer(mut self, pacer: Box<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    pub fn state(&self) -> ConnectionState {
        self.context.machine.state()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    pub fn cycles(&self) -> &[CycleReport] {
        &self.cycles
    }

    pub fn last_cycle(&self) -> Option<&CycleReport> {
        self.cycles.last()
    }

    pub fn loss_active(&self) -> bool {
        self.faults.loss_active()
    }

    pub fn set_loss_active(&mut self, active: bool) {
        self.faults.set_loss_active(active);
        let probability = self.config.loss_probability;
        let message = if active {
            format!("Packet loss simulation ACTIVATED ({:.0}% chance)", probability * 100.0)
        } else {
            "Packet loss simulation DEACTIVATED".to_string()
        };
        self.narrate(Layer::System, &message, "");
    }

    pub fn force_loss_once(&mut self) {
        self.faults.force_loss_once();
    }

    pub fn corrupt_network_byte_once(&mut self, offset: usize, mask: u8) {
        self.faults.corrupt_network_byte_once(offset, mask);
    }

    /// External congestion signal: collapse the window and degrade the
    /// simulated round-trip time.
    pub fn trigger_congestion_event(&mut self) {
        self.context.congestion.on_congestion_event();
        let (cwnd, ssthresh, rtt) = (
            self.context.congestion.cwnd(),
            self.context.congestion.ssthresh(),
            self.context.congestion.rtt_ms(),
        );
        self.narrate(
            Layer::Transport,
            "Congestion detected!",
            &format!("CWND reset to {cwnd} MSS, SSThresh to {ssthresh} MSS, RTT to {rtt}ms"),
        );
    }

    /// Run the three-way handshake. ISNs default to random 32-bit values from
    /// the session's seeded source; tests and scenarios may pin them.
    pub fn establish(
        &mut self,
        client_isn: Option<u32>,
        server_isn: Option<u32>,
    ) -> Result<(), PipelineError> {
        if self.state() != ConnectionState::Closed {
            return Err(PipelineError::AlreadyConnected);
        }
        let client_isn = client_isn.unwrap_or_else(|| self.rng.random());
        let server_isn = server_isn.unwrap_or_else(|| self.rng.random());
        let medium = self.config.delay_medium_ms;

        self.narrate(Layer::Transport, "Initializing TCP connection", "");
        self.sink.set_status(Endpoint::Sender, Layer::Transport, "SYN_SENT");
        self.sink.set_status(Endpoint::Receiver, Layer::Transport, "LISTEN");
        self.context.machine.send_syn(client_isn);
        let window = self.context.congestion.window_bytes(self.config.mss);
        self.narrate(
            Layer::Transport,
            "Client -> Server: SYN",
            &format!("Seq={client_isn}, Win={window}"),
        );
        self.pacer.pause(medium);

        self.context.machine.receive_syn_ack(server_isn);
        self.sink.set_status(Endpoint::Receiver, Layer::Transport, "SYN_RCVD");
        let server_ack = self.context.machine.server().ack;
        self.narrate(
            Layer::Transport,
            "Server -> Client: SYN-ACK",
            &format!("Seq={server_isn}, Ack={server_ack}"),
        );
        self.pacer.pause(medium);

        self.context.machine.complete_handshake();
        let client = self.context.machine.client();
        self.narrate(
            Layer::Transport,
            "Client -> Server: ACK",
            &format!("Seq={}, Ack={}", client.seq, client.ack),
        );
        self.sink.set_status(Endpoint::Sender, Layer::Transport, "ESTABLISHED");
        self.sink.set_status(Endpoint::Receiver, Layer::Transport, "ESTABLISHED");
        self.narrate(Layer::System, "TCP connection established successfully", "");
        Ok(())
    }

    /// One full send/receive cycle for `payload`.
    ///
    /// Fails fast with [`PipelineError::NotConnected`] outside ESTABLISHED
    /// and [`PipelineError::Busy`] if a cycle is somehow still in flight;
    /// neither touches any state.
    pub fn send(&mut self, payload: &[u8]) -> Result<CycleReport, PipelineError> {
        if self.in_flight {
            return Err(PipelineError::Busy);
        }
        if !self.context.machine.is_established() {
            return Err(PipelineError::NotConnected);
        }
        self.in_flight = true;
        let report = self.run_cycle(payload);
        self.in_flight = false;
        self.cycles.push(report.clone());
        Ok(report)
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            config: self.config.clone(),
            state: self.context.machine.state(),
            client: self.context.machine.client(),
            server: self.context.machine.server(),
            counters: self.context.counters,
            efficiency_percent: self.context.counters.efficiency_percent(),
            estimated_throughput_bps: estimated_throughput_bps(&self.cycles),
            cycles: self.cycles.clone(),
        }
    }

    fn narrate(&mut self, layer: Layer, message: &str, detail: &str) {
        debug!(layer = layer.tag(), "{message} {detail}");
        self.sink.log_event(layer, message, detail);
    }

    fn run_cycle(&mut self, payload: &[u8]) -> CycleReport {
        let cfg = self.config.clone();
        self.context.counters.cycles_started += 1;
        let cycle_id = self.context.counters.cycles_started;
        let client_before = self.context.machine.client();
        self.narrate(Layer::System, &format!("--- Sending data packet {cycle_id} ---"), "");

        self.context.counters.app_data_sent_bytes += payload.len() as u64;

        // (a) Application: pass-through, captured as-is.
        self.sink.set_status(Endpoint::Sender, Layer::Application, "Processing");
        let app_table = wire::parse_http_headers(payload);
        self.sink.display_header_table(Endpoint::Sender, Layer::Application, &app_table);
        self.narrate(
            Layer::Application,
            "HTTP request prepared",
            &format!("({} bytes)", payload.len()),
        );
        self.pacer.pause(cfg.delay_short_ms);
        self.sink.set_status(Endpoint::Sender, Layer::Application, "Complete");

        // (b) Transport: the window grows before the field is computed.
        self.sink.set_status(Endpoint::Sender, Layer::Transport, "Segmenting");
        self.context.congestion.on_segment_sent();
        let window = self.context.congestion.window_bytes(cfg.mss);
        let segment = wire::build_transport_segment(
            &cfg,
            client_before.seq,
            client_before.ack,
            tcp_flags::PSH | tcp_flags::ACK,
            window,
            payload,
        );
        if let Some(view) = wire::parse_transport(&segment) {
            self.sink.display_header_table(Endpoint::Sender, Layer::Transport, &view.fields());
        }
        self.narrate(
            Layer::Transport,
            "Segment created",
            &format!("Seq={}, Len={}, Flags=PSH,ACK", client_before.seq, payload.len()),
        );
        debug!("transport unit:\n{}", wire::format_hex(&segment, 16));
        let mut overhead = wire::TRANSPORT_HEADER_LEN;
        self.pacer.pause(cfg.delay_medium_ms);
        self.sink.set_status(Endpoint::Sender, Layer::Transport, "Ready");

        // (c) Network: wrap the transport unit.
        self.sink.set_status(Endpoint::Sender, Layer::Network, "Routing");
        let identification = self.context.counters.packets_sent.wrapping_add(1) as u16;
        let network = wire::build_network_packet(&cfg, identification, &segment);
        if let Some(view) = wire::parse_network(&network) {
            self.sink.display_header_table(Endpoint::Sender, Layer::Network, &view.fields());
        }
        self.narrate(
            Layer::Network,
            "Packet created",
            &format!("{} -> {}, TotalLen={}", cfg.src_ip, cfg.dest_ip, network.len()),
        );
        debug!("network unit:\n{}", wire::format_hex(&network, 16));
        overhead += wire::NETWORK_HEADER_LEN;
        self.pacer.pause(cfg.delay_medium_ms);
        self.sink.set_status(Endpoint::Sender, Layer::Network, "Complete");

        // (d) Link: frame it, trailer appended.
        self.sink.set_status(Endpoint::Sender, Layer::Link, "Framing");
        let frame = wire::build_link_frame(&cfg, &network);
        if let Some(view) = wire::parse_link(&frame) {
            self.sink.display_header_table(Endpoint::Sender, Layer::Link, &view.fields());
        }
        self.narrate(
            Layer::Link,
            "Frame created",
            &format!("{} -> {}", cfg.src_mac, cfg.dest_mac),
        );
        debug!("link frame:\n{}", wire::format_hex(&frame, 16));
        overhead += wire::LINK_HEADER_LEN + wire::LINK_TRAILER_LEN;
        self.pacer.pause(cfg.delay_medium_ms);
        self.sink.set_status(Endpoint::Sender, Layer::Link, "Complete");

        // (e) Physical: serialize and line-code.
        self.sink.set_status(Endpoint::Sender, Layer::Physical, "Transmitting");
        let bits = line::bytes_to_bits(&frame);
        let symbols = line::manchester_encode(&bits);
        self.narrate(
            Layer::Physical,
            &format!("Transmitting {} bits (Manchester: {})", bits.len(), symbols.len()),
            &wire::format_bits(&symbols, 64),
        );
        self.pacer.pause(cfg.delay_medium_ms);
        self.sink.set_status(Endpoint::Sender, Layer::Physical, "Idle");

        // Each layer keeps its own capture of the in-flight transmission;
        // faults hit the network unit, the layer the receive side rebuilds
        // the upper stack from.
        let mut network_in_flight = network.to_vec();

        self.narrate(Layer::System, "Packet traveling through simulated infrastructure", "");
        self.sink.notify_transit_start();
        let rtt = self.context.congestion.rtt_ms();
        self.pacer.pause(rtt);
        self.sink.notify_transit_end();

        // (f) Fault injection point.
        match self.faults.sample(&mut self.rng, network_in_flight.len()) {
            Some(FaultEvent::Loss) => {
                return self.conclude_lost(cycle_id, payload.len(), client_before.seq, overhead, frame.len(), symbols.len());
            }
            Some(FaultEvent::Corruption { offset, mask }) => {
                let offset = offset % network_in_flight.len().max(1);
                network_in_flight[offset] ^= mask;
                self.narrate(
                    Layer::System,
                    "Corruption in transit",
                    &format!("network unit byte {offset} flipped by 0x{mask:02x}"),
                );
            }
            None => {}
        }

        // (g) Physical decode.
        self.narrate(Layer::System, &format!("--- Receiving packet {cycle_id} ---"), "");
        self.sink.set_status(Endpoint::Receiver, Layer::Physical, "Receiving");
        let decoded = line::manchester_decode(&symbols);
        let frame_rx = line::bits_to_bytes(&decoded.bits);
        let physical_ok = decoded.is_clean() && frame_rx.as_slice() == frame.as_ref();
        if physical_ok {
            self.narrate(Layer::Physical, "Bits received, Manchester decoded", "");
        } else {
            let invalid = decoded.invalid_positions.len();
            self.narrate(
                Layer::Physical,
                "Signal corruption: decoded bits mismatch expected frame",
                &format!("({invalid} invalid transitions)"),
            );
        }
        self.pacer.pause(cfg.delay_medium_ms);
        self.sink.set_status(Endpoint::Receiver, Layer::Physical, "Sync Locked");

        // (h) Link decode, judged against its own captured frame.
        self.sink.set_status(Endpoint::Receiver, Layer::Link, "Processing");
        let link_ok = wire::link_frame_valid(&frame);
        if let Some(view) = wire::parse_link(&frame) {
            self.sink.display_header_table(Endpoint::Receiver, Layer::Link, &view.fields());
        }
        if link_ok {
            self.narrate(Layer::Link, "Frame validated (FCS OK), decapsulating IP packet", "");
        } else {
            self.narrate(Layer::Link, "FCS mismatch! Frame potentially corrupted", "");
        }
        self.pacer.pause(cfg.delay_medium_ms);
        self.sink.set_status(Endpoint::Receiver, Layer::Link, "Ready");

        // (i) Network decode: parse, recompute the header checksum, and carve
        // the transport segment out with the parsed total length.
        self.sink.set_status(Endpoint::Receiver, Layer::Network, "Processing");
        let network_view = wire::parse_network(&network_in_flight);
        let network_ok = network_view
            .as_ref()
            .is_some_and(|view| view.checksum_valid(&network_in_flight));
        if let Some(view) = &network_view {
            let fields = view.fields();
            self.sink.display_header_table(Endpoint::Receiver, Layer::Network, &fields);
        }
        if network_ok {
            self.narrate(Layer::Network, "Packet validated (checksum OK), decapsulating TCP segment", "");
        } else {
            self.narrate(Layer::Network, "Header checksum mismatch! Packet potentially corrupted", "");
        }
        let segment_rx: &[u8] = match &network_view {
            Some(view) => {
                let end = (view.total_length as usize).min(network_in_flight.len());
                if end > wire::NETWORK_HEADER_LEN {
                    &network_in_flight[wire::NETWORK_HEADER_LEN..end]
                } else {
                    &[]
                }
            }
            None => &[],
        };
        self.pacer.pause(cfg.delay_medium_ms);
        self.sink.set_status(Endpoint::Receiver, Layer::Network, "Ready");

        // (j) Transport decode: pseudo-header rebuilt from the network header
        // as received.
        self.sink.set_status(Endpoint::Receiver, Layer::Transport, "Processing");
        let transport_view = wire::parse_transport(segment_rx);
        let transport_ok = match (&network_view, &transport_view) {
            (Some(net), Some(_)) => {
                let pseudo = checksum::pseudo_header(
                    net.src_ip,
                    net.dest_ip,
                    wire::IP_PROTOCOL_TCP,
                    segment_rx.len() as u16,
                );
                checksum::verify_tcp(&pseudo, segment_rx)
            }
            _ => false,
        };
        if let Some(view) = &transport_view {
            self.sink.display_header_table(Endpoint::Receiver, Layer::Transport, &view.fields());
        }
        if transport_ok {
            self.narrate(Layer::Transport, "Segment validated (checksum OK), decapsulating application data", "");
        } else {
            self.narrate(Layer::Transport, "Checksum mismatch! Segment potentially corrupted", "");
        }
        self.pacer.pause(cfg.delay_medium_ms);
        self.sink.set_status(Endpoint::Receiver, Layer::Transport, "ESTABLISHED");

        // (k) Application compare, byte for byte.
        self.sink.set_status(Endpoint::Receiver, Layer::Application, "Processing");
        let payload_rx: &[u8] = if segment_rx.len() >= wire::TRANSPORT_HEADER_LEN {
            &segment_rx[wire::TRANSPORT_HEADER_LEN..]
        } else {
            &[]
        };
        let application_ok = payload_rx == payload;
        let rx_table = wire::parse_http_headers(payload_rx);
        self.sink.display_header_table(Endpoint::Receiver, Layer::Application, &rx_table);
        if application_ok {
            self.narrate(Layer::Application, "Data successfully reconstructed and matches original", "");
            self.context.counters.packets_received += 1;
        } else {
            self.narrate(Layer::Application, "Data mismatch! Reconstructed data does not match original", "");
        }
        self.pacer.pause(cfg.delay_short_ms);
        self.sink.set_status(Endpoint::Receiver, Layer::Application, "Complete");

        // (l) Completion: sequence numbers and counters advance no matter
        // what the verdicts said.
        self.context.machine.data_received(payload.len() as u32);
        let server = self.context.machine.server();
        self.narrate(
            Layer::Transport,
            "Server -> Client: ACK (for data)",
            &format!("Seq={}, Ack={}", server.seq, server.ack),
        );
        self.pacer.pause(cfg.delay_short_ms);
        self.context.machine.transfer_complete(payload.len() as u32);
        self.context.counters.packets_sent += 1;
        self.context.counters.total_overhead_bytes += overhead as u64;

        CycleReport {
            cycle_id,
            outcome: Outcome::Delivered,
            payload_len: payload.len(),
            verdicts: LayerVerdicts {
                physical: physical_ok,
                link: link_ok,
                network: network_ok,
                transport: transport_ok,
                application: application_ok,
            },
            client_seq_before: client_before.seq,
            client_seq_after: self.context.machine.client().seq,
            server_ack_after: server.ack,
            cwnd: self.context.congestion.cwnd(),
            ssthresh: self.context.congestion.ssthresh(),
            rtt_ms: self.context.congestion.rtt_ms(),
            overhead_bytes: overhead,
            frame_len: frame.len(),
            line_symbols: symbols.len(),
        }
    }

    /// Loss short-circuit: the receive side never runs, sequence numbers stay
    /// put, the controller collapses, and a retransmission is counted.
    fn conclude_lost(
        &mut self,
        cycle_id: u64,
        payload_len: usize,
        client_seq: u32,
        overhead: usize,
        frame_len: usize,
        line_symbols: usize,
    ) -> CycleReport {
        self.narrate(Layer::System, &format!("Packet {cycle_id} LOST in transit!"), "");
        self.context.counters.data_packets_lost += 1;
        self.context.counters.retransmissions += 1;
        self.context.counters.total_overhead_bytes += overhead as u64;
        self.context.congestion.on_loss_detected();
        let (cwnd, ssthresh) = (
            self.context.congestion.cwnd(),
            self.context.congestion.ssthresh(),
        );
        self.narrate(
            Layer::Transport,
            "Loss response",
            &format!("CWND reset to {cwnd} MSS, SSThresh to {ssthresh} MSS"),
        );
        CycleReport {
            cycle_id,
            outcome: Outcome::Lost,
            payload_len,
            verdicts: LayerVerdicts::default(),
            client_seq_before: client_seq,
            client_seq_after: client_seq,
            server_ack_after: self.context.machine.server().ack,
            cwnd,
            ssthresh,
            rtt_ms: self.context.congestion.rtt_ms(),
            overhead_bytes: overhead,
            frame_len,
            line_symbols,
        }
    }
}
