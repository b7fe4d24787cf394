// Messaging - transport notifications and the lock-free channel that carries them

pub mod channels;
pub mod events;

pub use channels::{EventConsumer, EventProducer, create_event_channel};
pub use events::{EventRegistry, Subscription, TransportEvent, TransportEventKind};
