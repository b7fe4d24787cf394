// MyMusic Transport - Library exports for tests and benchmarks

pub mod audio;
pub mod error;
pub mod messaging;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use audio::offline::{OfflineRenderer, TickListener};
pub use audio::signal::Signal;
pub use audio::timing::EngineClock;
pub use error::{TransportError, TransportResult};
pub use messaging::{
    EventConsumer, EventProducer, Subscription, TransportEvent, TransportEventKind,
    create_event_channel,
};
pub use sequencer::{
    EventClass, EventId, Tempo, Time, TimeConverter, TimeSignature, Transport, TransportSettings,
    TransportState,
};
