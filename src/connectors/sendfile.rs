//! Sendfile connector: mixes in-memory header/chunk-framing buffers with
//! one file-backed extent per turn.
//!
//! Grounded on `sendConnector.c`. Real `sendfile(2)` on Linux (unlike
//! FreeBSD's `SF_HDTR`) cannot combine a header vector and a file region
//! in one call, so "one connector turn" here means one `writev` of the
//! header vector immediately followed by one `sendfile` of the file
//! region, with both results folded into a single accounting step --
//! the queue/iovec bookkeeping (`ioCount`/`adjustVec`) still behaves as
//! if it were the single syscall the original assumes.

use std::fs::File;
use std::io::{self, IoSlice, Write};

use tokio_io::AsyncWrite;

use context::Context;
use error::Error;
use message::MessageState;
use packet::Kind;
use pipeline::Pipeline;
use queue::Queue;
use stage::Serviced;

/// Open the file backing this response, per `sendOpen`.
///
/// Returns `Ok(None)` when the response carries no body at all (1xx,
/// 204, 304, or a `HEAD` response) -- the original skips opening the
/// file in that case too.
pub fn open(ctx: &Context, path: &str) -> Result<Option<File>, Error> {
    if ctx.flags.no_body {
        return Ok(None);
    }
    File::open(path).map(Some).map_err(Error::FileNotFound)
}

struct Vector<'q> {
    slices: Vec<IoSlice<'q>>,
    header_bytes: u64,
    extent: Option<(u64, u64)>,
}

/// Build this turn's vector: in-memory slices first, at most one
/// extent, which must be last, matching `buildSendVec`'s one-data-packet
/// constraint.
fn build_vector<'q>(ctx: &mut Context, queue: &'q mut Queue, header_state: &mut MessageState,
    max_iovec: usize) -> Vector<'q>
{
    // As in the net connector: `buf` already holds the status line and
    // header fields by the time this packet is queued; only the closing
    // blank line is filled in lazily, on first visit.
    if let Some(packet) = queue.front_mut() {
        if let Kind::Header(ref mut buf) = packet.kind {
            if !header_state.is_after_headers() {
                let _ = header_state.done_headers(buf);
            }
        }
    }
    let mut slices = Vec::with_capacity(max_iovec);
    let mut header_bytes = 0u64;
    let mut extent = None;
    for packet in queue.iter() {
        if matches!(packet.kind, Kind::End) && packet.prefix.is_none() {
            break;
        }
        if ctx.flags.no_body && !matches!(packet.kind, Kind::Header(..)) {
            trace!("sendfile connector: discarding body packet on a no-body response");
            continue;
        }
        if let Some(ref prefix) = packet.prefix {
            if prefix.len() > 0 {
                slices.push(IoSlice::new(&prefix[..]));
                header_bytes += prefix.len() as u64;
            }
        }
        match packet.kind {
            Kind::Header(ref buf) | Kind::Data(ref buf) => {
                if buf.len() > 0 {
                    slices.push(IoSlice::new(&buf[..]));
                    header_bytes += buf.len() as u64;
                }
            }
            Kind::Extent(_, offset, length) => {
                if length > 0 {
                    extent = Some((offset, length));
                }
                break; // extent must be the last entry built this turn
            }
            Kind::End => {}
        }
        if slices.len() >= max_iovec.saturating_sub(2) {
            break;
        }
    }
    Vector { slices: slices, header_bytes: header_bytes, extent: extent }
}

/// Drop every packet this turn's vector build skipped over because the
/// response carries no body (1xx, 204, 304, or a `HEAD` response).
///
/// Mirrors `net::discard_bodyless_packets`: without this, a no-body
/// response's queue would never drain and the connection could never be
/// judged complete.
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

/// Run one service turn: a vectored write of the header slices, then (if
/// the vector fully drained) one blocking-free sendfile of the extent.
///
/// `send_file` performs the platform sendfile call; production callers
/// pass a closure that drives `tk_sendfile::Sendfile`'s `Destination`/
/// `FileOpener` traits against the connection's socket directly (that
/// binding lives with the runner, which already owns the socket type
/// the traits are implemented against), tests pass an in-memory
/// stand-in.
///
/// `close` is the already-decided `Connection: close` outcome for this
/// response, threaded through to `pipeline.complete_request` once a turn
/// builds an empty vector against an end-of-queue response, matching
/// §4.4 step 4.
pub fn service<W, F>(pipeline: &mut Pipeline, header_state: &mut MessageState,
    sock: &mut W, file: &mut File, max_iovec: usize, close: bool, mut send_file: F)
    -> Result<Serviced, Error>
    where W: AsyncWrite, F: FnMut(&mut File, u64, u64) -> io::Result<u64>
{
    let mut total_written = 0u64;
    loop {
        discard_bodyless_packets(&pipeline.context, &mut pipeline.connector_queue);
        let vector = build_vector(&mut pipeline.context, &mut pipeline.connector_queue,
            header_state, max_iovec);
        if vector.slices.is_empty() && vector.extent.is_none() {
            if pipeline.connector_queue.flags.eof {
                debug!("sendfile connector: response complete, {} bytes written", total_written);
                pipeline.complete_request(close);
            }
            break;
        }
        let mut written = 0u64;
        if !vector.slices.is_empty() {
            match sock.write_vectored(&vector.slices) {
                Ok(0) => break,
                Ok(n) => written += n as u64,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("sendfile connector: socket error, disconnecting: {}", e);
                    return Err(Error::Socket(e));
                }
            }
        }
        if written >= vector.header_bytes {
            if let Some((offset, length)) = vector.extent {
                match send_file(file, offset, length) {
                    Ok(n) => written += n,
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => {
                        warn!("sendfile connector: sendfile error, disconnecting: {}", e);
                        return Err(Error::Socket(e));
                    }
                }
            }
        }
        if written == 0 {
            break;
        }
        pipeline.context.bytes_written += written;
        total_written += written;
        pipeline.connector_queue.advance(written);
    }
    let again = pipeline.connector_queue.count() > 0 || !pipeline.connector_queue.is_empty();
    Ok(Serviced { bytes: total_written, again: again })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write as _};
    use std::cell::RefCell;
    use std::rc::Rc;
    use futures::{Async, Poll};
    use packet::Packet;
    use message::{MessageState, Body};
    use enums::Version;
    use pipeline::ConnState;
    use std::fs;
    use std::env;

    struct MemSock(Rc<RefCell<Vec<u8>>>);
    impl Write for MemSock {
        fn write(&mut self, b: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(b);
            Ok(b.len())
        }
        fn write_vectored(&mut self, bufs: &[IoSlice]) -> io::Result<usize> {
            let mut out = self.0.borrow_mut();
            let mut n = 0;
            for b in bufs {
                out.extend_from_slice(b);
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
    fn header_then_extent_in_one_turn_and_completes() {
        let dir = env::temp_dir();
        let path = dir.join("httpflow-sendfile-test.bin");
        fs::write(&path, b"0123456789").unwrap();
        let mut file = File::open(&path).unwrap();

        let mut pipeline = Pipeline::new(1 << 20, 0, 10);
        pipeline.connector_queue.put(Packet::header());
        pipeline.connector_queue.put(Packet::extent(File::open(&path).unwrap(), 0, 10));
        pipeline.connector_queue.put(Packet::end());

        let mut header_state = MessageState::ResponseStart {
            version: Version::Http11, body: Body::Normal, close: false,
        };
        if let Some(packet) = pipeline.connector_queue.front_mut() {
            if let Kind::Header(ref mut buf) = packet.kind {
                header_state.response_status(buf, 200, "OK");
                header_state.add_length(buf, 10).unwrap();
            }
        }

        let out = Rc::new(RefCell::new(Vec::new()));
        let mut sock = MemSock(out.clone());
        let result = service(&mut pipeline, &mut header_state, &mut sock, &mut file, 24, false,
            |f, offset, length| {
                f.seek(SeekFrom::Start(offset)).unwrap();
                let mut data = vec![0u8; length as usize];
                f.read_exact(&mut data).unwrap();
                out.borrow_mut().extend_from_slice(&data);
                Ok(length)
            }).unwrap();

        assert!(result.bytes > 0);
        assert!(out.borrow().ends_with(b"0123456789"));
        assert_eq!(pipeline.state, ConnState::KeepAlive);
        fs::remove_file(&path).ok();
    }
}
