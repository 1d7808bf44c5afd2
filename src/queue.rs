//! Flow-controlled FIFO of packets sitting between two pipeline stages.
//!
//! Grounded on `MaQueue` (`netConnector.c`, `chunkFilter.c`,
//! `rangeFilter.c`): a queue tracks how many content bytes it is
//! currently holding against a high (`max`) and low (`low`) watermark, so
//! an upstream stage can be told to stop producing (`will_accept`)
//! instead of the queue growing without bound, and can be woken again
//! once a connector has drained it back below `low`.

use std::collections::VecDeque;

use packet::Packet;

/// Queue state flags.
///
/// Written out as plain bools rather than a bitflags type: there are only
/// two of them and the crate does not otherwise depend on `bitflags`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFlags {
    /// The END packet has been queued: no more data will ever be put.
    pub eof: bool,
    /// `outgoing_service` is already scheduled to run for this queue; used
    /// by the pipeline runner to avoid scheduling it twice.
    pub serviced: bool,
}

/// A flow-controlled packet queue.
#[derive(Debug)]
pub struct Queue {
    packets: VecDeque<Packet>,
    /// Sum of `content_len()` over all queued packets. Prefix bytes are
    /// deliberately excluded, matching the original `q->count` semantics.
    count: u64,
    /// Upstream stops producing once `count` would exceed this.
    max: u64,
    /// Downstream may resume producing once `count` drops to this or
    /// below, after having hit `max`.
    low: u64,
    pub flags: QueueFlags,
}

impl Queue {
    /// Create a queue with the given high/low watermarks.
    pub fn new(max: u64, low: u64) -> Queue {
        assert!(low <= max);
        Queue {
            packets: VecDeque::new(),
            count: 0,
            max: max,
            low: low,
            flags: QueueFlags::default(),
        }
    }

    /// Bytes of content currently queued (prefix bytes excluded).
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The high watermark this queue was created with.
    pub fn max(&self) -> u64 {
        self.max
    }

    /// Number of packets currently queued.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Whether a producer may put `size` more content bytes without
    /// blowing the high watermark.
    ///
    /// Mirrors `maWillNextQueueAcceptPacket`: a queue that is currently
    /// empty always accepts, even if `size` alone exceeds `max`, so a
    /// single oversized packet is never permanently stuck.
    pub fn will_accept(&self, size: u64) -> bool {
        self.count == 0 || self.count + size <= self.max
    }

    /// True once the queue has drained back to the low watermark and a
    /// blocked producer may be unblocked.
    pub fn below_low(&self) -> bool {
        self.count <= self.low
    }

    /// Append a packet to the back of the queue.
    ///
    /// Marks `flags.eof` when an `End` packet is put, per
    /// `MA_QUEUE_EOF`.
    pub fn put(&mut self, packet: Packet) {
        if matches!(packet.kind, ::packet::Kind::End) {
            self.flags.eof = true;
        }
        self.count += packet.content_len();
        self.packets.push_back(packet);
    }

    /// Push a packet back onto the front of the queue.
    ///
    /// Used when a connector accepted only part of the front packet: the
    /// remainder is put back so the next service turn picks it up first.
    /// Never clones the packet -- ownership moves, so a file handle
    /// backing an `Extent` packet is moved back whole, not reopened.
    pub fn put_back(&mut self, packet: Packet) {
        self.count += packet.content_len();
        self.packets.push_front(packet);
    }

    /// Look at the front packet without removing it.
    pub fn front(&self) -> Option<&Packet> {
        self.packets.front()
    }

    /// Mutably look at the front packet without removing it.
    pub fn front_mut(&mut self) -> Option<&mut Packet> {
        self.packets.front_mut()
    }

    /// Iterate the queued packets front-to-back without removing them.
    ///
    /// Connectors use this to build an I/O vector spanning more than one
    /// packet before issuing a single write.
    pub fn iter(&self) -> ::std::collections::vec_deque::Iter<Packet> {
        self.packets.iter()
    }

    /// Remove and return the front packet once it is fully drained.
    ///
    /// Panics if the front packet still has bytes left -- callers must
    /// trim with [`Queue::advance`] first, same as `maGet()` is only ever
    /// called on a packet whose content buffer already reads empty.
    pub fn get(&mut self) -> Option<Packet> {
        if let Some(front) = self.packets.front() {
            assert!(front.is_empty(), "get() called on a non-empty packet");
        }
        self.packets.pop_front()
    }

    /// Remove and return the front packet regardless of how much content
    /// it still carries, decrementing `count` by what it held.
    ///
    /// This is the move a filter's `outgoingService` makes when it takes
    /// ownership of a whole packet to transform and forward it -- unlike
    /// [`Queue::get`], which only ever unlinks a packet a connector has
    /// already written out in full.
    pub fn pop_front(&mut self) -> Option<Packet> {
        let packet = self.packets.pop_front()?;
        self.count -= packet.content_len();
        Some(packet)
    }

    /// Trim `written` bytes off the front of the queue, prefix bytes
    /// first, then content, removing packets that become fully drained.
    ///
    /// This folds together `freeNetPackets`/`adjustNetVec` from the
    /// original connector: instead of sliding a persisted I/O vector
    /// down, the queue's own buffers are advanced, so the connector
    /// simply rebuilds its (small, `max_iovec`-bounded) vector on the
    /// next turn.
    pub fn advance(&mut self, mut written: u64) {
        while written > 0 {
            let (prefix_done, content_done, prefix_take, content_take) = {
                let packet = match self.packets.front_mut() {
                    Some(p) => p,
                    None => break,
                };
                let prefix_len = packet.prefix.as_ref().map_or(0, |b| b.len() as u64);
                let prefix_take = ::std::cmp::min(prefix_len, written);
                written -= prefix_take;
                if let Some(ref mut buf) = packet.prefix {
                    if prefix_take > 0 {
                        buf.consume(prefix_take as usize);
                    }
                    if buf.len() == 0 {
                        packet.prefix = None;
                    }
                }
                let content_len = packet.content_len();
                let content_take = ::std::cmp::min(content_len, written);
                written -= content_take;
                match packet.kind {
                    ::packet::Kind::Header(ref mut b) | ::packet::Kind::Data(ref mut b) => {
                        if content_take > 0 {
                            b.consume(content_take as usize);
                        }
                    }
                    ::packet::Kind::Extent(_, ref mut offset, ref mut length) => {
                        *offset += content_take;
                        *length -= content_take;
                    }
                    ::packet::Kind::End => {}
                }
                self.count -= content_take;
                (packet.prefix.is_none(), packet.content_len() == 0, prefix_take, content_take)
            };
            let _ = (prefix_take, content_take);
            if prefix_done && content_done {
                self.packets.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::Queue;
    use packet::Packet;
    use netbuf::Buf;
    use std::io::Write;

    fn data(bytes: &[u8]) -> Packet {
        let mut buf = Buf::new();
        buf.write_all(bytes).unwrap();
        Packet::data(buf)
    }

    #[test]
    fn accepts_into_empty_queue_even_if_oversized() {
        let q = Queue::new(10, 2);
        assert!(q.will_accept(1000));
    }

    #[test]
    fn stops_accepting_past_high_watermark() {
        let mut q = Queue::new(10, 2);
        q.put(data(b"0123456789"));
        assert!(!q.will_accept(1));
    }

    #[test]
    fn advance_drains_across_packet_boundary() {
        let mut q = Queue::new(100, 10);
        q.put(data(b"hello"));
        q.put(data(b"world"));
        assert_eq!(q.count(), 10);
        q.advance(7);
        assert_eq!(q.count(), 3);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn put_back_restores_count() {
        let mut q = Queue::new(100, 10);
        let p = data(b"abc");
        q.put(p);
        q.advance(3);
        let front = q.get();
        assert!(front.is_some(), "front packet fully drained, get() must remove it");
        assert_eq!(q.count(), 0);
        let p2 = data(b"xyz");
        q.put_back(p2);
        assert_eq!(q.count(), 3);
    }
}
