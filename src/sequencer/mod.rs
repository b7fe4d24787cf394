// Sequencer module
// Musical time, the transport clock, and callback scheduling against it

pub mod clock;
pub mod looping;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod swing;
pub mod sync;
pub mod time;
pub mod timeline;
pub mod transport;

pub use clock::Clock;
pub use looping::LoopRegion;
pub use scheduler::{Callback, Scheduler};
pub use settings::TransportSettings;
pub use state::{StateChange, StateTimeline, TransportState};
pub use swing::SwingEngine;
pub use sync::SignalSync;
pub use time::{DEFAULT_PPQ, Time, TimeConverter, TimeSignature};
pub use timeline::{EventClass, EventId, EventKind, Occurrence, ScheduledEvent, Timeline};
pub use transport::{DEFAULT_BPM, Tempo, Transport};
