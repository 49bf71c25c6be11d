use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A 48-bit hardware address, printed in the usual colon-hex form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| format!("MAC address too short: {s}"))?;
            *octet =
                u8::from_str_radix(part, 16).map_err(|e| format!("bad MAC octet {part}: {e}"))?;
        }
        if parts.next().is_some() {
            return Err(format!("MAC address too long: {s}"));
        }
        Ok(MacAddr(octets))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    pub src_ip: Ipv4Addr,
    pub dest_ip: Ipv4Addr,
    pub src_mac: MacAddr,
    pub dest_mac: MacAddr,
    pub src_port: u16,
    pub dest_port: u16,
    /// Maximum segment size in bytes; one congestion-window unit.
    pub mss: u16,
    /// Slow-start threshold at connection start, in MSS units.
    pub initial_ssthresh: u32,
    pub base_rtt_ms: u64,
    /// Probability that an in-flight frame is dropped while loss simulation is active.
    pub loss_probability: f64,
    /// Probability that one byte of the in-flight network unit is flipped.
    pub corrupt_probability: f64,
    pub seed: u64,
    pub delay_short_ms: u64,
    pub delay_medium_ms: u64,
    pub delay_long_ms: u64,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            src_ip: Ipv4Addr::new(192, 168, 1, 100),
            dest_ip: Ipv4Addr::new(203, 0, 113, 50),
            src_mac: MacAddr([0x00, 0x1A, 0x2B, 0x3C, 0x4D, 0x5E]),
            dest_mac: MacAddr([0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE]),
            src_port: 12345,
            dest_port: 80,
            mss: 1460,
            initial_ssthresh: 64,
            base_rtt_ms: 50,
            loss_probability: 0.3,
            corrupt_probability: 0.0,
            seed: 0,
            delay_short_ms: 300,
            delay_medium_ms: 500,
            delay_long_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_round_trips_through_display() {
        let mac: MacAddr = "00:1A:2B:3C:4D:5E".parse().unwrap();
        assert_eq!(mac.octets(), [0x00, 0x1A, 0x2B, 0x3C, 0x4D, 0x5E]);
        assert_eq!(mac.to_string(), "00:1A:2B:3C:4D:5E");
    }

    #[test]
    fn mac_rejects_malformed_input() {
        assert!("00:1A:2B:3C:4D".parse::<MacAddr>().is_err());
        assert!("00:1A:2B:3C:4D:5E:FF".parse::<MacAddr>().is_err());
        assert!("00:1A:2B:3C:4D:GG".parse::<MacAddr>().is_err());
    }
}
