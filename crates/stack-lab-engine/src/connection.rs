//! Connection state and sequence-number bookkeeping for the three-way
//! handshake and data transfer. Teardown is not modeled; ESTABLISHED is
//! terminal.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// No connection exists; initial state.
    Closed,
    /// Client sent its SYN; waiting for the SYN-ACK.
    SynSent,
    /// Server answered with SYN-ACK; waiting for the final ACK.
    SynRcvd,
    /// Handshake complete on both sides; data may flow.
    Established,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "CLOSED",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::SynRcvd => "SYN_RCVD",
            ConnectionState::Established => "ESTABLISHED",
        }
    }
}

/// One peer's sequence and acknowledgment numbers. All arithmetic wraps
/// modulo 2^32.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SequenceSpace {
    pub seq: u32,
    pub ack: u32,
}

impl SequenceSpace {
    fn advance(&mut self, count: u32) {
        self.seq = self.seq.wrapping_add(count);
    }
}

/// Tracks the connection state and both peers' sequence spaces. All
/// transitions and sequence updates go through here.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionMachine {
    state: ConnectionState,
    client: SequenceSpace,
    server: SequenceSpace,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Closed,
            client: SequenceSpace::default(),
            server: SequenceSpace::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client(&self) -> SequenceSpace {
        self.client
    }

    pub fn server(&self) -> SequenceSpace {
        self.server
    }

    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Established
    }

    /// CLOSED -> SYN_SENT: the client emits SYN carrying its initial
    /// sequence number.
    pub fn send_syn(&mut self, client_isn: u32) {
        debug_assert_eq!(self.state, ConnectionState::Closed);
        self.client.seq = client_isn;
        self.state = ConnectionState::SynSent;
    }

    /// SYN_SENT -> SYN_RCVD: the server picks its own initial sequence number
    /// and acknowledges the client's SYN, which consumes one sequence slot.
    pub fn receive_syn_ack(&mut self, server_isn: u32) {
        debug_assert_eq!(self.state, ConnectionState::SynSent);
        self.server.seq = server_isn;
        self.server.ack = self.client.seq.wrapping_add(1);
        self.client.advance(1);
        self.state = ConnectionState::SynRcvd;
    }

    /// SYN_RCVD -> ESTABLISHED: the client acknowledges the server's SYN,
    /// which consumes one of the server's sequence slots.
    pub fn complete_handshake(&mut self) {
        debug_assert_eq!(self.state, ConnectionState::SynRcvd);
        self.client.ack = self.server.seq.wrapping_add(1);
        self.server.advance(1);
        self.state = ConnectionState::Established;
    }

    /// The server received `payload_len` application bytes and acknowledges
    /// them immediately (no reordering in this stack).
    pub fn data_received(&mut self, payload_len: u32) {
        debug_assert!(self.is_established());
        self.server.ack = self.client.seq.wrapping_add(payload_len);
    }

    /// The round trip finished; the client's sequence number moves past the
    /// transferred bytes.
    pub fn transfer_complete(&mut self, payload_len: u32) {
        debug_assert!(self.is_established());
        self.client.advance(payload_len);
    }
}
