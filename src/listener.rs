//! Accepts TCP connections and hands each off to a fresh
//! [`::pipeline::Pipeline`].
//!
//! Grounded on `listen.c` (the `accept`-then-dispatch loop) and on this
//! crate family's usual `tokio_core::net::TcpListener::incoming()` plus
//! `futures_cpupool`-backed handoff for blocking setup work (matching
//! the `simple` feature's dependencies in the teacher's own Cargo.toml).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{Future, Stream};
use tokio_core::net::TcpListener;
use tokio_core::reactor::Handle;

use config::Config;

/// Accept connections on `addr` until the returned future is dropped.
///
/// `on_connection` is invoked once per accepted socket; production
/// callers give it a closure that spawns a [`::pipeline::Pipeline`]-
/// driven task onto `handle`. This function itself only owns the
/// accept loop and the config handoff, matching the narrow scope
/// `maOpenListeners`/`accept` has in the original source -- everything
/// about what a connection *does* lives in the pipeline, not here.
pub fn serve<F>(addr: &SocketAddr, handle: &Handle, config: Arc<Config>, mut on_connection: F)
    -> Box<Future<Item = (), Error = io::Error>>
    where F: FnMut(::tokio_core::net::TcpStream, SocketAddr, Arc<Config>) + 'static
{
    let listener = match TcpListener::bind(addr, handle) {
        Ok(l) => l,
        Err(e) => return Box::new(::futures::future::err(e)),
    };
    let fut = listener.incoming().for_each(move |(sock, peer)| {
        on_connection(sock, peer, config.clone());
        Ok(())
    });
    Box::new(fut)
}

#[cfg(test)]
mod test {
    // The accept loop itself needs a live reactor to exercise end to
    // end; covered by the crate's black-box tests instead of here.
}
