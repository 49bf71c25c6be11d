pub mod checksum;
pub mod congestion;
pub mod connection;
pub mod fault;
pub mod line;
pub mod pipeline;
pub mod scenario;
pub mod trace;
pub mod wire;

pub use congestion::CongestionController;
pub use connection::{ConnectionMachine, ConnectionState, SequenceSpace};
pub use fault::{FaultEvent, FaultInjector};
pub use pipeline::{NoopPacer, Pacer, PipelineError, SimulationContext, SleepPacer, StackPipeline};
pub use trace::{Counters, CycleReport, LayerVerdicts, Outcome, SessionReport};
