//! A staged, packet-queue outbound pipeline for an embedded HTTP/1.1
//! server.
//!
//! Handlers produce response packets; filters (chunked transfer-encoding,
//! byte ranges) transform them in flight; connectors (vectored write,
//! sendfile) write them to the socket. See [`pipeline`] for how a
//! connection's stage chain is driven turn by turn.
#![recursion_limit="100"]

extern crate futures;
extern crate httparse;
extern crate tokio_core;
extern crate tokio_io;
extern crate netbuf;
extern crate rand;
extern crate libc;
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;
#[cfg(feature = "sendfile")]
extern crate tk_sendfile;
#[cfg(feature = "date_header")]
extern crate httpdate;

pub mod config;
pub mod context;
pub mod error;
pub mod head;
mod enums;
mod headers;
mod message;
pub mod packet;
pub mod queue;
pub mod stage;
pub mod pipeline;
pub mod listener;
pub mod timer;
pub mod filters;
pub mod connectors;

pub use enums::{Version, Status, Method, Header};
pub use error::Error;
pub use config::Config;
pub use packet::{Packet, Kind as PacketKind};
pub use queue::Queue;
pub use context::{Context, Range};
pub use message::{MessageState, Body, HeaderError};
