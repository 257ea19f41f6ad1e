//! Remote API surface: request translation and transport, plus the typed
//! event writes built on top of the queue.

pub mod events;
pub mod transport;

pub use events::{BabyEvent, EventType, EventsClient};
pub use transport::{HttpTransport, ReplayRequest, Transport};
