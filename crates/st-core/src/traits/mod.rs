//! Core trait definitions

mod channel;
mod connection;

pub use channel::{ChannelEvent, TailChannel};
pub use connection::{ClientConnection, TailConnection};
