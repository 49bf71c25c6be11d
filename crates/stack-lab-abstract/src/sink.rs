use crate::layer::{Endpoint, HeaderFields, Layer};

/// The capability the engine offers to a visualizer.
///
/// The engine only ever calls into this trait; it never reads anything back,
/// so a sink cannot influence protocol behavior. Every method defaults to a
/// no-op — headless environments implement nothing.
pub trait PresentationSink {
    /// Narrate one step, tagged with the layer it happened at.
    /// `detail` carries packet info (seq/ack, sizes, hex dumps) and may be empty.
    fn log_event(&mut self, _layer: Layer, _message: &str, _detail: &str) {}

    /// Show the decoded field table for one header.
    fn display_header_table(
        &mut self,
        _endpoint: Endpoint,
        _layer: Layer,
        _fields: &HeaderFields,
    ) {
    }

    /// Update the short status text of one layer box.
    fn set_status(&mut self, _endpoint: Endpoint, _layer: Layer, _status: &str) {}

    /// The frame has left the sender's physical layer.
    fn notify_transit_start(&mut self) {}

    /// The frame has arrived at the receiver's physical layer (or was lost).
    fn notify_transit_end(&mut self) {}
}

/// Sink that discards everything. The engine must behave identically under it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PresentationSink for NullSink {}
