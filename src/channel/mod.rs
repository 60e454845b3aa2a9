//! Real-time channel
//!
//! The module is organized by concern, each submodule with a single
//! responsibility:
//!
//! | Module       | Responsibility                                    |
//! |--------------|---------------------------------------------------|
//! | `transport`  | WebSocket connect/send/receive (JSON frames)      |
//! | `connection` | Auth handshake → an established, live channel     |
//! | `events`     | Handler registry with isolated dispatch           |
//! | `backoff`    | Reconnect delay schedule                          |
//! | `manager`    | The reconnecting state machine over all of it     |
//!
//! A connection only exists once the server accepted the handshake and
//! assigned a connection id — "connected" is a value you hold, not a flag
//! you poll.

mod backoff;
mod transport;

pub mod connection;
pub mod events;
pub mod manager;

pub use connection::{ChannelConnector, EstablishedChannel, WsConnector};
pub use events::{ChannelEvent, EventSubscription};
pub use manager::{ChannelManager, ChannelState, ChannelStateEvents, ChannelStatus};
