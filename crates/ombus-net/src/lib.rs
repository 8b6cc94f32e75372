//! Broadcast TCP transport: a single server fans records out to many
//! clients over the framed wire protocol shared with `ombus-shm`'s record
//! model (`ombus-core`). Non-blocking sockets throughout, framed with a
//! fixed 16-byte record header rather than a length-prefixed one.

mod client;
mod frame;
mod outbound;
mod reconnect;
mod server;

pub use client::{Client, ClientConfig};
pub use frame::FrameHeader;
pub use reconnect::{AutoReconnectClient, AutoReconnectConfig};
pub use server::{Server, ServerConfig, ServerStats, ServerStatsSnapshot};
