use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the stack's layers, plus a catch-all for engine-level narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layer {
    System,
    Application,
    Transport,
    Network,
    Link,
    Physical,
}

impl Layer {
    /// Short tag used in log lines, matching the sink's narration style.
    pub fn tag(&self) -> &'static str {
        match self {
            Layer::System => "sys",
            Layer::Application => "app",
            Layer::Transport => "tcp",
            Layer::Network => "ip",
            Layer::Link => "eth",
            Layer::Physical => "phy",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Which side of the simulated wire a status or header table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Sender,
    Receiver,
}

impl Endpoint {
    pub fn peer(&self) -> Self {
        match self {
            Endpoint::Sender => Endpoint::Receiver,
            Endpoint::Receiver => Endpoint::Sender,
        }
    }
}

/// Ordered name/value rows decoded from a header, for display only.
///
/// The pipeline never reads these back; they exist so a sink can render a
/// field table the way the decoder saw it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HeaderFields {
    rows: Vec<(String, String)>,
}

impl HeaderFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.rows.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rows.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_preserve_insertion_order() {
        let mut fields = HeaderFields::new();
        fields.push("Source Port", "12345");
        fields.push("Dest Port", "80");
        let names: Vec<_> = fields.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["Source Port", "Dest Port"]);
        assert_eq!(fields.get("Dest Port"), Some("80"));
    }
}
