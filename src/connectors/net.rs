//! Non-blocking vectored-write connector.
//!
//! Grounded on `netConnector.c`: aggregate as many queued prefix/content
//! buffers as fit in one `iovec` (bounded by `max_iovec`), issue one
//! `writev`-equivalent syscall, then trim the queue by however many
//! bytes actually went out. Stable `std::io::IoSlice` /
//! `Write::write_vectored` is used instead of raw `libc::writev` for the
//! same reason the `gattaca-com-flux` stream wrapper does: it is the
//! safe, portable equivalent and the kernel call it lowers to is the
//! same one.

use std::io::{self, IoSlice, Write};

use tokio_io::AsyncWrite;

use context::Context;
use error::Error;
use message::MessageState;
use packet::Kind;
use pipeline::Pipeline;
use queue::Queue;
use stage::Serviced;

/// Build the iovec for this turn.
///
/// Lazily materializes HEADER packets via `header_state` on first visit,
/// stops at `max_iovec`, and marks `queue.flags.eof` if it walks onto the
/// END marker. Returns the slices to write and their total length.
fn build_vector<'q>(ctx: &mut Context, queue: &'q mut Queue, header_state: &mut MessageState,
    max_iovec: usize) -> (Vec<IoSlice<'q>>, u64)
{
    let mut total = 0u64;
    let mut slices: Vec<IoSlice> = Vec::with_capacity(max_iovec);
    // Fill headers before taking any borrows used for the slice vector,
    // since `done_headers` needs a `&mut Buf` into the same packet. The
    // status line and header fields are already in `buf` by the time the
    // HEADER packet reaches the queue (written by the external header
    // formatter via `MessageState`); the connector's only remaining job
    // is to close the block with the blank line on its first visit.
    if let Some(packet) = queue.front_mut() {
        if let Kind::Header(ref mut buf) = packet.kind {
            if !header_state.is_after_headers() {
                let _ = header_state.done_headers(buf);
            }
        }
    }
    for packet in queue.iter() {
        if matches!(packet.kind, Kind::End) {
            if packet.prefix.is_none() {
                break;
            }
        } else if ctx.flags.no_body && !matches!(packet.kind, Kind::Header(..)) {
            trace!("net connector: discarding body packet on a no-body response");
            continue;
        }
        if let Some(ref prefix) = packet.prefix {
            if prefix.len() > 0 {
                slices.push(IoSlice::new(&prefix[..]));
                total += prefix.len() as u64;
            }
        }
        match packet.kind {
            Kind::Header(ref buf) | Kind::Data(ref buf) => {
                if buf.len() > 0 {
                    slices.push(IoSlice::new(&buf[..]));
                    total += buf.len() as u64;
                }
            }
            Kind::Extent(..) => {
                // The plain net connector cannot transmit file extents;
                // a response that needs one always routes through the
                // sendfile connector instead.
                break;
            }
            Kind::End => {}
        }
        if slices.len() >= max_iovec.saturating_sub(2) {
            break;
        }
    }
    (slices, total)
}

/// Drop every packet this turn's vector build skipped over because the
/// response carries no body (1xx, 204, 304, or a `HEAD` response).
///
/// `build_vector` only reads past these packets to reach the terminating
/// END marker; without this, `queue.count()` would never reach zero for
/// such a response and the connection could never be judged complete.
fn discard_bodyless_packets(ctx: &Context, queue: &mut Queue) {
    if !ctx.flags.no_body {
        return;
    }
    while let Some(packet) = queue.front() {
        if matches!(packet.kind, Kind::End | Kind::Header(..)) {
            break;
        }
        queue.pop_front();
    }
}

/// Run one service turn of the net connector against `sock`.
///
/// Loops building and writing vectors until the socket blocks
/// (`WouldBlock`/zero-length write) or the queue is drained, matching
/// `netOutgoingService`'s `while (q->first || q->ioIndex)` loop -- here
/// collapsed to "while there is something to build a vector from",
/// since nothing survives a completed write but the trimmed queue.
///
/// `close` is the already-decided `Connection: close` outcome for this
/// response; once a turn builds an empty vector against an end-of-queue
/// response, the request is complete and `pipeline.complete_request`
/// transitions it to `KeepAlive` or `Closed`, matching §4.4 step 4.
pub fn service<W: AsyncWrite>(pipeline: &mut Pipeline, header_state: &mut MessageState,
    sock: &mut W, max_iovec: usize, close: bool) -> Result<Serviced, Error>
{
    let mut total_written = 0u64;
    loop {
        discard_bodyless_packets(&pipeline.context, &mut pipeline.connector_queue);
        let (slices, to_write) = build_vector(&mut pipeline.context, &mut pipeline.connector_queue,
            header_state, max_iovec);
        if slices.is_empty() {
            if pipeline.connector_queue.flags.eof {
                debug!("net connector: response complete, {} bytes written", total_written);
                pipeline.complete_request(close);
            }
            break;
        }
        match sock.write_vectored(&slices) {
            Ok(0) => break,
            Ok(written) => {
                let written = written as u64;
                pipeline.context.bytes_written += written;
                total_written += written;
                pipeline.connector_queue.advance(written);
                if written < to_write {
                    // Partial write: the socket is not ready for more,
                    // stop this turn rather than spin.
                    trace!("net connector: partial write {}/{} bytes", written, to_write);
                    break;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                // EPIPE/ECONNRESET and anything else all disconnect the
                // same way here; the caller drops the queue's remaining
                // packets once this bubbles up as a terminated request.
                warn!("net connector: socket error, disconnecting: {}", e);
                return Err(Error::Socket(e));
            }
        }
    }
    let again = pipeline.connector_queue.count() > 0 || !pipeline.connector_queue.is_empty();
    Ok(Serviced { bytes: total_written, again: again })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write as _;
    use futures::{Async, Poll};
    use netbuf::Buf;
    use packet::Packet;
    use message::{MessageState, Body};
    use enums::Version;
    use pipeline::ConnState;

    struct MemSock(Vec<u8>);
    impl Write for MemSock {
        fn write(&mut self, b: &[u8]) -> io::Result<usize> {
            self.0.extend_from_slice(b);
            Ok(b.len())
        }
        fn write_vectored(&mut self, bufs: &[IoSlice]) -> io::Result<usize> {
            let mut n = 0;
            for b in bufs {
                self.0.extend_from_slice(b);
                n += b.len();
            }
            Ok(n)
        }
        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }
    impl AsyncWrite for MemSock {
        fn shutdown(&mut self) -> Poll<(), io::Error> {
            Ok(Async::Ready(()))
        }
    }

    #[test]
    fn writes_header_then_body_in_one_turn_and_completes() {
        let mut pipeline = Pipeline::new(1 << 20, 0, 10);
        pipeline.connector_queue.put(Packet::header());
        let mut body = Buf::new();
        body.write_all(b"hello").unwrap();
        pipeline.connector_queue.put(Packet::data(body));
        pipeline.connector_queue.put(Packet::end());

        let mut header_state = MessageState::ResponseStart {
            version: Version::Http11, body: Body::Normal, close: false,
        };
        if let Some(packet) = pipeline.connector_queue.front_mut() {
            if let Kind::Header(ref mut buf) = packet.kind {
                header_state.response_status(buf, 200, "OK");
                header_state.add_length(buf, 5).unwrap();
            }
        }

        let mut sock = MemSock(Vec::new());
        let result = service(&mut pipeline, &mut header_state, &mut sock, 24, false).unwrap();
        assert!(result.bytes > 0);
        assert!(sock.0.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(sock.0.ends_with(b"hello"));
        assert_eq!(pipeline.state, ConnState::KeepAlive);
    }

    #[test]
    fn head_response_discards_body_and_completes() {
        let mut pipeline = Pipeline::new(1 << 20, 0, 10);
        pipeline.context.flags.no_body = true;
        pipeline.connector_queue.put(Packet::header());
        let mut body = Buf::new();
        body.write_all(b"hello").unwrap();
        pipeline.connector_queue.put(Packet::data(body));
        pipeline.connector_queue.put(Packet::end());

        let mut header_state = MessageState::ResponseStart {
            version: Version::Http11, body: Body::Head, close: true,
        };
        if let Some(packet) = pipeline.connector_queue.front_mut() {
            if let Kind::Header(ref mut buf) = packet.kind {
                header_state.response_status(buf, 200, "OK");
                header_state.add_length(buf, 5).unwrap();
            }
        }

        let mut sock = MemSock(Vec::new());
        let result = service(&mut pipeline, &mut header_state, &mut sock, 24, true).unwrap();
        assert!(sock.0.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(!sock.0.ends_with(b"hello"));
        assert_eq!(pipeline.connector_queue.count(), 0);
        assert_eq!(pipeline.state, ConnState::Closed);
    }
}
