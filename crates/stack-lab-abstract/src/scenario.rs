use serde::Deserialize;

use crate::config::StackConfig;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub config: ScenarioOverride,
    pub actions: Vec<ScenarioAction>,
    pub assertions: Vec<ScenarioAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ScenarioOverride {
    pub loss_probability: Option<f64>,
    pub corrupt_probability: Option<f64>,
    pub seed: Option<u64>,
    pub mss: Option<u16>,
    pub initial_ssthresh: Option<u32>,
    pub base_rtt_ms: Option<u64>,
}

impl ScenarioOverride {
    pub fn apply_to(&self, config: &mut StackConfig) {
        if let Some(v) = self.loss_probability {
            config.loss_probability = v;
        }
        if let Some(v) = self.corrupt_probability {
            config.corrupt_probability = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.mss {
            config.mss = v;
        }
        if let Some(v) = self.initial_ssthresh {
            config.initial_ssthresh = v;
        }
        if let Some(v) = self.base_rtt_ms {
            config.base_rtt_ms = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAction {
    /// Run the three-way handshake, optionally with fixed initial sequence numbers.
    Establish {
        client_isn: Option<u32>,
        server_isn: Option<u32>,
    },
    /// Send one application payload through the stack.
    Send { payload: String },
    /// Toggle the random loss coin flip.
    SetLoss { active: bool },
    /// Deterministically drop the next frame, regardless of probability.
    ForceLossOnce,
    /// Deterministically flip `mask` into one byte of the next in-flight network unit.
    CorruptNetworkByteOnce { offset: usize, mask: u8 },
    /// Signal an external congestion event to the controller.
    CongestionEvent,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAssertion {
    /// The connection reached ESTABLISHED.
    StateEstablished,
    /// Exact client sequence number after the actions ran.
    ClientSeq { equals: u32 },
    /// Exact client acknowledgment number after the actions ran.
    ClientAck { equals: u32 },
    /// Exact server acknowledgment number after the actions ran.
    ServerAck { equals: u32 },
    /// The most recent cycle was lost (or delivered, with `lost = false`).
    LastOutcome { lost: bool },
    /// Every layer of the most recent delivered cycle validated clean.
    AllLayersValid,
    /// A named layer failed validation in the most recent cycle.
    LayerInvalid { layer: String },
    Cwnd { equals: u32 },
    Ssthresh { equals: u32 },
    Retransmissions { min: u32 },
}
