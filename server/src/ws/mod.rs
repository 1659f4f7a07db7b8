pub mod actor;
pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod hub;
pub mod outbox;
pub mod protocol;

/// Stable key naming one user account (the account email).
pub type Identity = String;

pub use connection::{CloseReason, ConnectionHandle};
pub use hub::{DeliveryStatus, Hub, HubError};
pub use protocol::{Envelope, EnvelopeKind};
