//! Outbound chunk framer and inbound chunk-spec parser.
//!
//! Grounded on `chunkFilter.c`. The wire format is the usual
//! `HEX_SIZE CRLF BYTES CRLF`, terminated by `0 CRLF CRLF`, but this
//! implementation reaches it via an "inverted" framing: each outbound
//! data packet's *prefix* is `CRLF HEX_SIZE CRLF` rather than a trailing
//! `CRLF` after the previous chunk's data, and the inbound parser
//! expects the same shape -- the leading `\r\n` it validates is the
//! *previous* chunk's trailing CRLF, reinterpreted as part of the next
//! chunk-spec line. Concatenated end to end the bytes on the wire are
//! identical to the textbook grammar.

use std::io::Write;

use httparse::{self, Status};
use netbuf::Buf;

use error::Error;
use context::Context;
use queue::Queue;
use packet::{Kind, Packet};
use stage::Serviced;

/// Decide the chunk size for this response and whether chunking applies
/// at all, per the first-call bookkeeping in `outgoingChunkService`.
///
/// Returns `true` if the chunk filter should frame this response;
/// `false` means the entity length turned out to already be known (the
/// queue holds its END packet already) so plain framing is used instead.
pub fn open(ctx: &mut Context, queue: &Queue, max_chunk_size: u64) -> bool {
    let last_is_end = queue.iter().last()
        .map_or(false, |p| matches!(p.kind, Kind::End));
    if last_is_end {
        if ctx.chunk_size.is_none() && ctx.length.is_none() {
            ctx.length = Some(queue.count());
            return false;
        }
    } else if ctx.chunk_size.is_none() {
        ctx.chunk_size = Some(::std::cmp::min(max_chunk_size, queue.max()));
    }
    ctx.chunk_size.is_some()
}

/// Attach the `"\r\nHEX\r\n"` (or `"\r\n0\r\n\r\n"` terminator) prefix to
/// a packet about to be forwarded, unless it already has one.
///
/// Prefix bytes never count against `Queue::count`, matching the
/// original note that "prefixes don't count in the queue length".
pub fn set_chunk_prefix(content_len: u64) -> Buf {
    let mut prefix = Buf::new();
    if content_len > 0 {
        write!(prefix, "\r\n{:x}\r\n", content_len).unwrap();
    } else {
        prefix.write_all(b"\r\n0\r\n\r\n").unwrap();
    }
    prefix
}

/// Drain `queue` toward `next`, framing each packet as a chunk once the
/// filter is active, matching `outgoingChunkService`'s per-packet steps:
/// oversized packets are split to `chunk_size`, a refusal downstream
/// stops the turn with the packet put back, and every forwarded packet
/// (including the END marker, which carries the terminator) picks up a
/// `"\r\nHEX\r\n"` prefix.
///
/// When [`open`] decides the entity length is already known, chunking is
/// bypassed for this response: packets are moved to `next` unframed.
pub fn outgoing_service(ctx: &mut Context, queue: &mut Queue, next: &mut Queue,
    max_chunk_size: u64) -> Result<Serviced, Error>
{
    if !queue.flags.serviced {
        queue.flags.serviced = true;
        open(ctx, queue, max_chunk_size);
    }
    let chunk_size = ctx.chunk_size;
    let mut moved = 0u64;
    while let Some(mut packet) = queue.pop_front() {
        let is_header = matches!(packet.kind, Kind::Header(..));
        let is_end = matches!(packet.kind, Kind::End);
        if let Some(limit) = chunk_size {
            if !is_header && !is_end && packet.content_len() > limit {
                let (head, tail) = packet.split_at(limit);
                packet = head;
                if let Some(tail) = tail {
                    queue.put_back(tail);
                }
            }
        }
        if !next.will_accept(packet.content_len()) {
            queue.put_back(packet);
            break;
        }
        if chunk_size.is_some() && !is_header {
            let prefix = set_chunk_prefix(packet.content_len());
            packet.set_prefix(prefix);
        }
        moved += packet.content_len();
        next.put(packet);
        if is_end {
            break;
        }
    }
    Ok(Serviced { bytes: moved, again: !queue.is_empty() })
}

/// State of the inbound chunk-spec parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Waiting for the next `CRLF HEX CRLF` chunk-spec line.
    Start,
    /// Forwarding up to `remaining` bytes of chunk data unchanged.
    Data { remaining: u64 },
    /// The zero-size terminating chunk has been seen.
    Eof,
}

/// Inbound chunk decoder: consumes bytes straight out of the connection's
/// read buffer and reports how many were spec-line bytes versus how many
/// are data bytes ready to be handed to the request body consumer.
#[derive(Debug)]
pub struct Decoder {
    state: ParseState,
    default_chunk: u64,
}

/// Longest a chunk-spec line is allowed to run before it is considered
/// malformed, matching the original parser's 80-byte lookahead cap.
const MAX_SPEC_LINE: usize = 80;

impl Decoder {
    pub fn new(default_chunk: u64) -> Decoder {
        Decoder { state: ParseState::Start, default_chunk: default_chunk }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, ParseState::Eof)
    }

    /// Parse as much of `buf` as currently forms complete chunk-spec
    /// lines or complete chunk data, consuming it from `buf` and
    /// returning the number of data bytes (already removed from the
    /// spec-line framing) now sitting at the front of `buf` ready to be
    /// consumed by the caller as request body.
    pub fn parse(&mut self, buf: &mut Buf) -> Result<usize, Error> {
        let mut available = 0;
        loop {
            match self.state {
                ParseState::Eof => break,
                ParseState::Data { remaining } => {
                    let take = ::std::cmp::min(remaining, (buf.len() as u64).saturating_sub(available as u64));
                    available += take as usize;
                    let left = remaining - take;
                    if left == 0 {
                        self.state = ParseState::Start;
                        // Stop here rather than looking for the next
                        // chunk-spec line in the same call: the Start arm
                        // below consumes from the front of `buf`, which
                        // would destroy the `available` bytes this call
                        // is about to hand back before the caller can
                        // read them. The caller consumes what it got and
                        // calls `parse` again for the rest.
                        if available > 0 {
                            break;
                        }
                    } else {
                        self.state = ParseState::Data { remaining: left };
                        break;
                    }
                }
                ParseState::Start => {
                    if buf.len() - available < 3 {
                        break;
                    }
                    let window = &buf[available..];
                    if window[0] != b'\r' || window[1] != b'\n' {
                        debug!("chunk decoder: expected a chunk-spec CRLF, got {:?}", &window[..2]);
                        return Err(Error::BadChunk);
                    }
                    // The chunk-spec proper (hex size, optional
                    // extensions, terminating CRLF) is exactly what
                    // `httparse::parse_chunk_size` parses; only the
                    // leading CRLF above -- this framing's reinterpreted
                    // previous-chunk trailer -- is ours to check first.
                    let spec = &window[2..];
                    let capped = if spec.len() > MAX_SPEC_LINE { &spec[..MAX_SPEC_LINE] } else { spec };
                    let (used, size) = match httparse::parse_chunk_size(capped) {
                        Ok(Status::Complete((used, size))) => (used, size),
                        Ok(Status::Partial) => {
                            if spec.len() > MAX_SPEC_LINE {
                                return Err(Error::BadChunk);
                            }
                            break; // need more bytes
                        }
                        Err(err) => return Err(Error::ChunkSize(err)),
                    };
                    if self.default_chunk > 0 && size > self.default_chunk {
                        warn!("chunk decoder: chunk size {} exceeds limit {}", size, self.default_chunk);
                        return Err(Error::LimitExceeded("chunk size"));
                    }
                    buf.consume(available + 2 + used);
                    available = 0;
                    if size == 0 {
                        // Lenient: consume a trailing bare CRLF if present.
                        if buf.len() >= 2 && &buf[0..2] == b"\r\n" {
                            buf.consume(2);
                        }
                        self.state = ParseState::Eof;
                    } else {
                        self.state = ParseState::Data { remaining: size };
                    }
                }
            }
        }
        Ok(available)
    }
}

/// Drain queued inbound packets, stripping chunk-spec framing via a
/// per-request [`Decoder`] stashed on `ctx`, matching `chunkFilter.c`'s
/// `incomingData`: this is the one stage in this crate that fills that
/// slot, since the other filters only ever transform the outbound side.
///
/// Complete chunk bodies are coalesced into a single plain DATA packet
/// and re-queued; whatever tail of a packet's buffer `parse` could not
/// yet turn into data (an in-progress or not-yet-seen chunk-spec line)
/// is held in `ctx.chunk_leftover` and glued onto the front of whatever
/// arrives on the next call. An END packet is appended once the
/// terminating zero-size chunk has been seen.
pub fn incoming_data(ctx: &mut Context, queue: &mut Queue) -> Result<(), Error> {
    if ctx.chunk_decoder.is_none() {
        ctx.chunk_decoder = Some(Decoder::new(ctx.inbound_chunk_limit));
    }
    let mut output = Vec::new();
    let mut saw_end = false;
    while let Some(mut packet) = queue.pop_front() {
        if matches!(packet.kind, Kind::End) {
            saw_end = true;
            break;
        }
        if let Kind::Data(ref mut buf) = packet.kind {
            if !ctx.chunk_leftover.is_empty() {
                let mut combined = Buf::new();
                combined.extend(&ctx.chunk_leftover);
                combined.extend(&buf[..]);
                ctx.chunk_leftover.clear();
                *buf = combined;
            }
            // `parse` only ever completes one chunk's worth of data per
            // call (see the Decoder::parse `Data` arm), so drain it in a
            // loop to coalesce everything this buffer already holds.
            loop {
                let n = {
                    let decoder = ctx.chunk_decoder.as_mut().unwrap();
                    decoder.parse(buf)?
                };
                if n == 0 {
                    break;
                }
                output.extend_from_slice(&buf[..n]);
                buf.consume(n);
                if ctx.chunk_decoder.as_ref().unwrap().is_done() {
                    break;
                }
            }
            ctx.chunk_leftover.extend_from_slice(&buf[..]);
        }
        if ctx.chunk_decoder.as_ref().map_or(false, |d| d.is_done()) {
            break;
        }
    }
    if !output.is_empty() {
        let mut buf = Buf::new();
        buf.write_all(&output).unwrap();
        queue.put(Packet::data(buf));
    }
    if saw_end || ctx.chunk_decoder.as_ref().map_or(false, |d| d.is_done()) {
        queue.put(Packet::end());
    }
    Ok(())
}
