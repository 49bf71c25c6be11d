pub mod config;
pub mod layer;
pub mod scenario;
pub mod sink;

pub use config::{MacAddr, StackConfig};
pub use layer::{Endpoint, HeaderFields, Layer};
pub use scenario::{ScenarioAction, ScenarioAssertion, ScenarioOverride, TestScenario};
pub use sink::{NullSink, PresentationSink};
