//! The unit of flow through the outbound pipeline.
//!
//! Grounded on `MaPacket` in the original connector/filter sources
//! (`netConnector.c`, `sendConnector.c`, `chunkFilter.c`): every packet
//! carries an optional `prefix` buffer (framing bytes a filter prepends
//! without touching the payload) plus a `content` payload, and is tagged
//! so connectors know whether it is a header block, ordinary data, a
//! file-backed extent, or the end-of-stream marker.

use std::fs::File;

use netbuf::Buf;

/// Flags that travel with a packet independently of its kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags {
    /// This packet carries the (still unfilled) response header block.
    /// Connectors call `MessageState::done_headers` the first time they
    /// see it and never again.
    pub header: bool,
}

/// The payload a packet carries.
pub enum Kind {
    /// Status line and headers, filled lazily by the connector on its
    /// first visit via [`::message::MessageState`].
    Header(Buf),
    /// Ordinary in-memory body bytes.
    Data(Buf),
    /// A file-backed byte range: `(file, offset, length)`. The sendfile
    /// connector is the only stage allowed to consume these; at most one
    /// may be in flight per queue and it must be the last packet built
    /// into a given vector.
    Extent(File, u64, u64),
    /// Zero-length marker: there is no more data after this packet. Its
    /// presence (not its length) is what flags end-of-stream, since a
    /// packet can be legitimately empty mid-stream (e.g. a chunk filter
    /// flush with no new bytes buffered).
    End,
}

impl ::std::fmt::Debug for Kind {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        match *self {
            Kind::Header(ref b) => write!(f, "Header({} bytes)", b.len()),
            Kind::Data(ref b) => write!(f, "Data({} bytes)", b.len()),
            Kind::Extent(_, off, len) => write!(f, "Extent(off={}, len={})", off, len),
            Kind::End => write!(f, "End"),
        }
    }
}

/// A single unit in a queue.
///
/// `prefix` bytes (if any) are always written before `content`/`extent`
/// bytes and are consumed independently of `count` bookkeeping, matching
/// `packet->prefix` in the original sources: a chunk-size line prepended
/// to a data packet, for instance, does not count against `Queue::count`.
#[derive(Debug)]
pub struct Packet {
    pub flags: PacketFlags,
    pub prefix: Option<Buf>,
    pub kind: Kind,
}

impl Packet {
    /// Build a HEADER packet. Its content buffer starts empty; the
    /// external header formatter (`fillHeaders` in §6) writes the status
    /// line and header fields into it via [`::message::MessageState`]
    /// before the packet is queued. The connector's only remaining job,
    /// on its first visit, is to close the block with the blank line
    /// (`MessageState::done_headers`) -- see `connectors::net::service`.
    pub fn header() -> Packet {
        Packet {
            flags: PacketFlags { header: true },
            prefix: None,
            kind: Kind::Header(Buf::new()),
        }
    }

    /// Build a DATA packet out of buffered bytes.
    pub fn data(buf: Buf) -> Packet {
        Packet { flags: PacketFlags::default(), prefix: None, kind: Kind::Data(buf) }
    }

    /// Build an EXTENT packet backed by a file region.
    pub fn extent(file: File, offset: u64, length: u64) -> Packet {
        Packet {
            flags: PacketFlags::default(),
            prefix: None,
            kind: Kind::Extent(file, offset, length),
        }
    }

    /// Build the end-of-stream marker packet.
    pub fn end() -> Packet {
        Packet { flags: PacketFlags::default(), prefix: None, kind: Kind::End }
    }

    /// Prepend framing bytes (e.g. a chunk-size line) ahead of `content`.
    ///
    /// Filters call this instead of writing the framing directly into
    /// `content`, so that the bytes can be trimmed independently as they
    /// are written, same as the original `packet->prefix` buffer.
    pub fn set_prefix(&mut self, buf: Buf) {
        self.prefix = Some(buf);
    }

    /// Length of the content this packet carries, not counting `prefix`.
    ///
    /// This is the quantity `Queue::count` tracks, matching
    /// `maGetPacketLength()` in the original sources.
    pub fn content_len(&self) -> u64 {
        match self.kind {
            Kind::Header(ref b) => b.len() as u64,
            Kind::Data(ref b) => b.len() as u64,
            Kind::Extent(_, _, len) => len,
            Kind::End => 0,
        }
    }

    /// True once both `prefix` and content are fully drained.
    pub fn is_empty(&self) -> bool {
        let prefix_done = self.prefix.as_ref().map_or(true, |b| b.len() == 0);
        prefix_done && self.content_len() == 0
    }

    /// Split a DATA/EXTENT packet's content at `n` bytes, matching
    /// `Queue::resize` in the design notes: the first `n` bytes stay in
    /// `self` (returned as the head) and whatever remains is returned as
    /// a new tail packet, or `None` if `n` already covers everything.
    ///
    /// HEADER and END packets are never split (the caller never offers
    /// more than their whole, and both carry no resizable content).
    /// Splitting an `Extent` duplicates the file descriptor with
    /// `File::try_clone` so both halves can be drained independently.
    pub fn split_at(self, n: u64) -> (Packet, Option<Packet>) {
        let flags = self.flags;
        match self.kind {
            Kind::Data(mut buf) => {
                let total = buf.len() as u64;
                if total <= n {
                    (Packet { flags: flags, prefix: None, kind: Kind::Data(buf) }, None)
                } else {
                    let mut tail = Buf::new();
                    tail.extend(&buf[n as usize..]);
                    buf.remove_range(n as usize..);
                    (Packet { flags: flags, prefix: None, kind: Kind::Data(buf) },
                     Some(Packet { flags: flags, prefix: None, kind: Kind::Data(tail) }))
                }
            }
            Kind::Extent(file, offset, length) => {
                if length <= n {
                    (Packet { flags: flags, prefix: None, kind: Kind::Extent(file, offset, length) }, None)
                } else {
                    let tail_file = file.try_clone().expect("dup fd to split a range extent");
                    (Packet { flags: flags, prefix: None, kind: Kind::Extent(file, offset, n) },
                     Some(Packet { flags: flags, prefix: None,
                         kind: Kind::Extent(tail_file, offset + n, length - n) }))
                }
            }
            other => (Packet { flags: flags, prefix: None, kind: other }, None),
        }
    }

    /// Drop the first `n` bytes of content without emitting them
    /// anywhere -- the range filter's "discard" and "skip ahead" steps,
    /// which never cross into the downstream queue.
    pub fn discard_prefix(&mut self, n: u64) {
        match self.kind {
            Kind::Data(ref mut buf) => buf.consume(n as usize),
            Kind::Extent(_, ref mut offset, ref mut length) => {
                *offset += n;
                *length -= n;
            }
            Kind::Header(..) | Kind::End => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_packet_starts_empty() {
        let p = Packet::header();
        assert!(p.flags.header);
        assert_eq!(p.content_len(), 0);
    }

    #[test]
    fn end_marker_has_no_content() {
        let p = Packet::end();
        assert_eq!(p.content_len(), 0);
        assert!(p.is_empty());
    }

    #[test]
    fn data_packet_reports_its_length() {
        let mut buf = ::netbuf::Buf::new();
        ::std::io::Write::write_all(&mut buf, b"hello").unwrap();
        let p = Packet::data(buf);
        assert_eq!(p.content_len(), 5);
        assert!(!p.is_empty());
    }
}
