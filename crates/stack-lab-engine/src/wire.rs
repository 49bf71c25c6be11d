//! Fixed-width header build and parse for the Transport, Network and Link
//! layers. The Application layer is pass-through; its only codec concern is
//! the display-side HTTP header table.
//!
//! Encode embeds the freshly computed checksum back into the header by byte
//! offset before appending the inner unit. Decode slices fields back out and
//! reports them; whether a unit is *valid* is judged by the pipeline, which
//! recomputes checksums and compares against what arrived.

use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes, BytesMut};
use stack_lab_abstract::{HeaderFields, MacAddr, StackConfig};

use crate::checksum;

/// TCP header flags. Bits 2, 5, 6 and 7 stay zero in this stack.
pub mod tcp_flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
}

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const IP_PROTOCOL_TCP: u8 = 6;

pub const TRANSPORT_HEADER_LEN: usize = 20;
pub const NETWORK_HEADER_LEN: usize = 20;
pub const LINK_HEADER_LEN: usize = 14;
pub const LINK_TRAILER_LEN: usize = 4;

pub fn flag_names(flags: u8) -> String {
    let mut names = Vec::new();
    if flags & tcp_flags::SYN != 0 {
        names.push("SYN");
    }
    if flags & tcp_flags::ACK != 0 {
        names.push("ACK");
    }
    if flags & tcp_flags::PSH != 0 {
        names.push("PSH");
    }
    if flags & tcp_flags::FIN != 0 {
        names.push("FIN");
    }
    if names.is_empty() {
        names.push("none");
    }
    names.join(",")
}

/// Build a 20-byte TCP header around `payload`, checksum embedded.
pub fn build_transport_segment(
    config: &StackConfig,
    seq: u32,
    ack: u32,
    flags: u8,
    window: u16,
    payload: &[u8],
) -> Bytes {
    let mut segment = BytesMut::with_capacity(TRANSPORT_HEADER_LEN + payload.len());
    segment.put_u16(config.src_port);
    segment.put_u16(config.dest_port);
    segment.put_u32(seq);
    segment.put_u32(ack);
    segment.put_u8(5 << 4); // data offset 5 words, reserved zero
    segment.put_u8(flags);
    segment.put_u16(window);
    segment.put_u16(0); // checksum, backfilled below
    segment.put_u16(0); // urgent pointer

    let pseudo = checksum::pseudo_header(
        config.src_ip,
        config.dest_ip,
        IP_PROTOCOL_TCP,
        (TRANSPORT_HEADER_LEN + payload.len()) as u16,
    );
    let csum = checksum::tcp_checksum(&pseudo, &segment[..], payload);
    segment[checksum::TCP_CHECKSUM_OFFSET..checksum::TCP_CHECKSUM_OFFSET + 2]
        .copy_from_slice(&csum.to_be_bytes());

    segment.put_slice(payload);
    segment.freeze()
}

/// Build a 20-byte IPv4 header around a transport segment, checksum embedded.
pub fn build_network_packet(config: &StackConfig, identification: u16, transport: &[u8]) -> Bytes {
    let mut packet = BytesMut::with_capacity(NETWORK_HEADER_LEN + transport.len());
    packet.put_u8(0x45); // version 4, IHL 5
    packet.put_u8(0x00); // DSCP/ECN
    packet.put_u16((NETWORK_HEADER_LEN + transport.len()) as u16);
    packet.put_u16(identification);
    packet.put_u16(0x4000); // don't fragment, offset zero
    packet.put_u8(64); // TTL
    packet.put_u8(IP_PROTOCOL_TCP);
    packet.put_u16(0); // checksum, backfilled below
    packet.put_slice(&config.src_ip.octets());
    packet.put_slice(&config.dest_ip.octets());

    let csum = checksum::ip_checksum(&packet[..]);
    packet[checksum::IP_CHECKSUM_OFFSET..checksum::IP_CHECKSUM_OFFSET + 2]
        .copy_from_slice(&csum.to_be_bytes());

    packet.put_slice(transport);
    packet.freeze()
}

/// Frame a network packet: MAC header in front, frame check behind.
pub fn build_link_frame(config: &StackConfig, network: &[u8]) -> Bytes {
    let mut frame =
        BytesMut::with_capacity(LINK_HEADER_LEN + network.len() + LINK_TRAILER_LEN);
    frame.put_slice(&config.dest_mac.octets());
    frame.put_slice(&config.src_mac.octets());
    frame.put_u16(ETHERTYPE_IPV4);
    frame.put_slice(network);
    let fcs = checksum::frame_check(&frame[..]);
    frame.put_u32(fcs);
    frame.freeze()
}

/// Recompute the frame check over everything before the trailer and compare.
pub fn link_frame_valid(frame: &[u8]) -> bool {
    if frame.len() < LINK_HEADER_LEN + LINK_TRAILER_LEN {
        return false;
    }
    let (body, trailer) = frame.split_at(frame.len() - LINK_TRAILER_LEN);
    let received = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    checksum::frame_check(body) == received
}

#[derive(Debug, Clone)]
pub struct TransportView {
    pub src_port: u16,
    pub dest_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub data_offset_bytes: u8,
    pub flags: u8,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
}

/// Slice a TCP header back out of a segment. `None` if too short to hold one.
pub fn parse_transport(segment: &[u8]) -> Option<TransportView> {
    if segment.len() < TRANSPORT_HEADER_LEN {
        return None;
    }
    Some(TransportView {
        src_port: u16::from_be_bytes([segment[0], segment[1]]),
        dest_port: u16::from_be_bytes([segment[2], segment[3]]),
        seq: u32::from_be_bytes([segment[4], segment[5], segment[6], segment[7]]),
        ack: u32::from_be_bytes([segment[8], segment[9], segment[10], segment[11]]),
        data_offset_bytes: (segment[12] >> 4) * 4,
        flags: segment[13],
        window: u16::from_be_bytes([segment[14], segment[15]]),
        checksum: u16::from_be_bytes([segment[16], segment[17]]),
        urgent: u16::from_be_bytes([segment[18], segment[19]]),
    })
}

impl TransportView {
    pub fn fields(&self) -> HeaderFields {
        let mut f = HeaderFields::new();
        f.push("Source Port", self.src_port.to_string());
        f.push("Dest Port", self.dest_port.to_string());
        f.push("Sequence Num", self.seq.to_string());
        f.push("Ack Num", self.ack.to_string());
        f.push("Data Offset", format!("{} bytes", self.data_offset_bytes));
        f.push(
            "Flags",
            format!("0x{:02x} ({})", self.flags, flag_names(self.flags)),
        );
        f.push("Window Size", self.window.to_string());
        f.push("Checksum", format!("0x{:04x}", self.checksum));
        f.push("Urgent Pointer", self.urgent.to_string());
        f
    }
}

#[derive(Debug, Clone)]
pub struct NetworkView {
    pub version: u8,
    pub ihl_bytes: u8,
    pub dscp_ecn: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src_ip: Ipv4Addr,
    pub dest_ip: Ipv4Addr,
}

/// Slice an IPv4 header back out of a packet. `None` if too short to hold one.
pub fn parse_network(packet: &[u8]) -> Option<NetworkView> {
    if packet.len() < NETWORK_HEADER_LEN {
        return None;
    }
    Some(NetworkView {
        version: packet[0] >> 4,
        ihl_bytes: (packet[0] & 0x0F) * 4,
        dscp_ecn: packet[1],
        total_length: u16::from_be_bytes([packet[2], packet[3]]),
        identification: u16::from_be_bytes([packet[4], packet[5]]),
        flags_fragment: u16::from_be_bytes([packet[6], packet[7]]),
        ttl: packet[8],
        protocol: packet[9],
        checksum: u16::from_be_bytes([packet[10], packet[11]]),
        src_ip: Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]),
        dest_ip: Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]),
    })
}

impl NetworkView {
    /// Recomputed checksum matches the one that arrived in the header.
    pub fn checksum_valid(&self, packet: &[u8]) -> bool {
        packet.len() >= NETWORK_HEADER_LEN
            && checksum::ip_checksum(&packet[..NETWORK_HEADER_LEN]) == self.checksum
    }

    pub fn fields(&self) -> HeaderFields {
        let mut f = HeaderFields::new();
        f.push("Version", self.version.to_string());
        f.push("IHL", format!("{} bytes", self.ihl_bytes));
        f.push("DSCP/ECN", format!("0x{:02x}", self.dscp_ecn));
        f.push("Total Length", format!("{} bytes", self.total_length));
        f.push("Identification", format!("0x{:04x}", self.identification));
        f.push("Flags/Frag Offset", format!("0x{:04x}", self.flags_fragment));
        f.push("TTL", self.ttl.to_string());
        f.push(
            "Protocol",
            format!(
                "0x{:02x} ({})",
                self.protocol,
                if self.protocol == IP_PROTOCOL_TCP { "TCP" } else { "Other" }
            ),
        );
        f.push("Header Checksum", format!("0x{:04x}", self.checksum));
        f.push("Source IP", self.src_ip.to_string());
        f.push("Dest IP", self.dest_ip.to_string());
        f
    }
}

#[derive(Debug, Clone)]
pub struct LinkView {
    pub dest_mac: MacAddr,
    pub src_mac: MacAddr,
    pub ethertype: u16,
    pub fcs: u32,
}

/// Slice the MAC header and trailer back out of a frame.
pub fn parse_link(frame: &[u8]) -> Option<LinkView> {
    if frame.len() < LINK_HEADER_LEN + LINK_TRAILER_LEN {
        return None;
    }
    let mut dest = [0u8; 6];
    let mut src = [0u8; 6];
    dest.copy_from_slice(&frame[0..6]);
    src.copy_from_slice(&frame[6..12]);
    let trailer = &frame[frame.len() - LINK_TRAILER_LEN..];
    Some(LinkView {
        dest_mac: MacAddr(dest),
        src_mac: MacAddr(src),
        ethertype: u16::from_be_bytes([frame[12], frame[13]]),
        fcs: u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]),
    })
}

impl LinkView {
    pub fn fields(&self) -> HeaderFields {
        let mut f = HeaderFields::new();
        f.push("Dest MAC", self.dest_mac.to_string());
        f.push("Source MAC", self.src_mac.to_string());
        f.push(
            "EtherType",
            format!(
                "0x{:04x} ({})",
                self.ethertype,
                if self.ethertype == ETHERTYPE_IPV4 { "IPv4" } else { "Other" }
            ),
        );
        f.push("FCS", format!("0x{:08x}", self.fcs));
        f
    }
}

/// Display-side table for an HTTP request payload: the request line, then one
/// row per `Name: Value` header until the blank separator line.
pub fn parse_http_headers(payload: &[u8]) -> HeaderFields {
    let text = String::from_utf8_lossy(payload);
    let mut fields = HeaderFields::new();
    let mut lines = text.lines();
    if let Some(request_line) = lines.next() {
        fields.push("Request Line", request_line.trim_end());
    }
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            fields.push(name.trim(), value.trim());
        }
    }
    fields
}

/// Hex dump with `bytes_per_line` bytes per row, for sink detail strings.
pub fn format_hex(bytes: &[u8], bytes_per_line: usize) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            if i % bytes_per_line == 0 {
                out.push('\n');
            } else {
                out.push(' ');
            }
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Bit dump grouped per byte, truncated past `limit` bits. Sentinel bits
/// render as `?`.
pub fn format_bits(bits: &[u8], limit: usize) -> String {
    let mut out = String::new();
    for (i, &bit) in bits.iter().take(limit).enumerate() {
        if i > 0 && i % 8 == 0 {
            out.push(' ');
        }
        out.push(match bit {
            0 => '0',
            1 => '1',
            _ => '?',
        });
    }
    if bits.len() > limit {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::verify16;

    fn config() -> StackConfig {
        StackConfig::default()
    }

    #[test]
    fn transport_segment_layout_matches_wire_table() {
        let cfg = config();
        let payload = b"abc";
        let segment = build_transport_segment(
            &cfg,
            1001,
            5001,
            tcp_flags::PSH | tcp_flags::ACK,
            2920,
            payload,
        );

        assert_eq!(segment.len(), TRANSPORT_HEADER_LEN + payload.len());
        let view = parse_transport(&segment).unwrap();
        assert_eq!(view.src_port, 12345);
        assert_eq!(view.dest_port, 80);
        assert_eq!(view.seq, 1001);
        assert_eq!(view.ack, 5001);
        assert_eq!(view.data_offset_bytes, 20);
        assert_eq!(view.flags, 0x18);
        assert_eq!(view.window, 2920);
        assert_eq!(view.urgent, 0);

        // Received checksum re-verifies through the pseudo-header.
        let pseudo = checksum::pseudo_header(
            cfg.src_ip,
            cfg.dest_ip,
            IP_PROTOCOL_TCP,
            segment.len() as u16,
        );
        assert!(checksum::verify_tcp(&pseudo, &segment));
    }

    #[test]
    fn network_packet_layout_matches_wire_table() {
        let cfg = config();
        let transport = [0u8; 25];
        let packet = build_network_packet(&cfg, 7, &transport);

        let view = parse_network(&packet).unwrap();
        assert_eq!(view.version, 4);
        assert_eq!(view.ihl_bytes, 20);
        assert_eq!(view.total_length, 45);
        assert_eq!(view.identification, 7);
        assert_eq!(view.flags_fragment, 0x4000);
        assert_eq!(view.ttl, 64);
        assert_eq!(view.protocol, IP_PROTOCOL_TCP);
        assert_eq!(view.src_ip, cfg.src_ip);
        assert_eq!(view.dest_ip, cfg.dest_ip);
        assert!(view.checksum_valid(&packet));
        assert!(verify16(&packet[..NETWORK_HEADER_LEN]));
    }

    #[test]
    fn corrupted_network_header_fails_validation() {
        let cfg = config();
        let mut packet = build_network_packet(&cfg, 1, &[0u8; 10]).to_vec();
        packet[3] ^= 0x04;
        let view = parse_network(&packet).unwrap();
        assert!(!view.checksum_valid(&packet));
    }

    #[test]
    fn link_frame_carries_valid_trailer() {
        let cfg = config();
        let frame = build_link_frame(&cfg, &[0xAB; 40]);
        assert_eq!(frame.len(), LINK_HEADER_LEN + 40 + LINK_TRAILER_LEN);
        assert!(link_frame_valid(&frame));

        let view = parse_link(&frame).unwrap();
        assert_eq!(view.dest_mac, cfg.dest_mac);
        assert_eq!(view.src_mac, cfg.src_mac);
        assert_eq!(view.ethertype, ETHERTYPE_IPV4);

        let mut corrupted = frame.to_vec();
        corrupted[20] ^= 0x01;
        assert!(!link_frame_valid(&corrupted));
    }

    #[test]
    fn http_table_splits_request_line_and_headers() {
        let fields =
            parse_http_headers(b"GET / HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n");
        assert_eq!(fields.get("Request Line"), Some("GET / HTTP/1.1"));
        assert_eq!(fields.get("Host"), Some("example.com"));
        assert_eq!(fields.get("Accept"), Some("*/*"));
    }

    #[test]
    fn hex_and_bit_dumps_format_for_display() {
        assert_eq!(format_hex(&[0xDE, 0xAD, 0xBE], 2), "de ad\nbe");
        assert_eq!(format_bits(&[1, 0, 1, 0, 1, 0, 1, 0, 1], 8), "10101010...");
        assert_eq!(format_bits(&[0, 1, 0xFF], 8), "01?");
    }

    #[test]
    fn short_buffers_parse_to_none() {
        assert!(parse_transport(&[0u8; 19]).is_none());
        assert!(parse_network(&[0u8; 19]).is_none());
        assert!(parse_link(&[0u8; 17]).is_none());
    }
}
