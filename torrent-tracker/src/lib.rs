//! Peer discovery over the UDP tracker protocol.
//!
//! A [`TrackerClient`] owns one datagram channel and runs any number of
//! connect → announce [`TrackerSession`]s over it, routing each inbound
//! datagram by transaction id.

pub mod client;
pub mod config;
pub mod error;
pub mod peer;
pub mod session;
pub mod tracker;
pub mod transport;

pub use client::{SessionHandle, SessionId, TrackerClient};
pub use config::TrackerConfig;
pub use error::{TrackerError, TrackerResult};
pub use peer::{PeerId, PeerIdentity};
pub use session::{ConnectionContext, SessionState, SessionStep, TrackerSession};
pub use tracker::TrackerEndpoint;
pub use transport::{Transport, UdpTransport};
