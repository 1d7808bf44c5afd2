//! Terminal stages that perform the actual write syscalls.

pub mod net;
#[cfg(feature = "sendfile")]
pub mod sendfile;
