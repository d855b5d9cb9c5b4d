//! Turn Transport
//!
//! How a [`ChatSession`](crate::streaming::ChatSession) reaches the turn
//! submission endpoint.
//!
//! # Design Philosophy
//!
//! The session only needs two things from the network: open a turn and read
//! the reply as raw bytes. [`TurnTransport`] is that seam. The HTTP
//! implementation talks to the daemon; tests plug in a scripted transport
//! that emits chunks on demand.

mod http;
mod traits;

pub use http::HttpTurnTransport;
pub use traits::{ReplyStream, TurnError, TurnResponse, TurnTransport};
