/*
[INPUT]:  Public API exports for the cexlink-engine crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod composite;
pub mod config;
pub mod events;
pub mod position;
pub mod telemetry;

// Re-export main types for convenience
pub use composite::{CompositeExchange, PositionSnapshot};
pub use config::{ConnectivityConfig, PositionConfig};
pub use events::{
    ChannelEventHandler, ExchangeEvent, ExchangeEventHandler, NoopEventHandler, StreamKind,
};
pub use position::{Position, PositionChange, PositionTracker, ReversalPolicy};
pub use telemetry::init_tracing;
