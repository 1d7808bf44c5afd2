//! Black-box scenarios exercising the outbound pipeline end to end:
//! packet/queue flow control, the chunk and range filters, and the
//! connectors that turn a queue into bytes on a mock socket.

extern crate httpflow;
extern crate netbuf;
extern crate tokio_io;
extern crate futures;

use std::io::{self, IoSlice, Write};

use netbuf::Buf;
use tokio_io::AsyncWrite;
use futures::{Async, Poll};

use httpflow::{Context, Queue, Packet, MessageState, Body, Version};
use httpflow::packet::Kind;
use httpflow::filters::{chunked, range};
use httpflow::connectors::net;
use httpflow::pipeline::{Pipeline, ConnState};

fn data(bytes: &[u8]) -> Packet {
    let mut buf = Buf::new();
    buf.write_all(bytes).unwrap();
    Packet::data(buf)
}

fn flatten(q: &mut Queue) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(p) = q.pop_front() {
        if let Some(ref prefix) = p.prefix {
            out.extend_from_slice(&prefix[..]);
        }
        match p.kind {
            Kind::Data(ref b) => out.extend_from_slice(&b[..]),
            _ => {}
        }
    }
    out
}

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

/// Scenario 1: a plain small response bypasses chunk framing once the
/// final body length is known up front, and the connector marks the
/// request complete once it drains.
#[test]
fn plain_small_response_writes_header_and_body_in_one_turn() {
    let mut pipeline = Pipeline::new(1 << 16, 0, 10);
    pipeline.filter_queue.put(data(b"hello"));
    pipeline.filter_queue.put(Packet::end());

    let result = chunked::outgoing_service(&mut pipeline.context, &mut pipeline.filter_queue,
        &mut pipeline.connector_queue, 8192).unwrap();
    assert_eq!(pipeline.context.length, Some(5));
    assert_eq!(result.bytes, 5);

    let mut header_state = MessageState::ResponseStart {
        version: Version::Http11, body: Body::Normal, close: false,
    };
    // Splice a HEADER packet in front, as a connector would receive it.
    let mut queue = Queue::new(1 << 16, 0);
    queue.put(Packet::header());
    while let Some(p) = pipeline.connector_queue.pop_front() {
        queue.put(p);
    }
    pipeline.connector_queue = queue;
    if let Some(packet) = pipeline.connector_queue.front_mut() {
        if let Kind::Header(ref mut buf) = packet.kind {
            header_state.response_status(buf, 200, "OK");
            header_state.add_length(buf, 5).unwrap();
        }
    }

    let mut sock = MemSock(Vec::new());
    net::service(&mut pipeline, &mut header_state, &mut sock, 24, false).unwrap();
    assert!(sock.0.starts_with(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n"));
    assert!(sock.0.ends_with(b"hello"));
    assert_eq!(pipeline.state, ConnState::KeepAlive);
}

/// Scenario 2: two packets under an undetermined length get framed as
/// chunks, terminator included.
#[test]
fn chunked_response_frames_two_packets() {
    let mut ctx = Context::new();
    ctx.chunk_size = Some(8192); // as if a handler is still producing
    let mut filter_queue = Queue::new(1 << 16, 0);
    filter_queue.put(data(b"abcd"));
    filter_queue.put(data(b"ef"));
    filter_queue.put(Packet::end());

    let mut connector_queue = Queue::new(1 << 16, 0);
    chunked::outgoing_service(&mut ctx, &mut filter_queue, &mut connector_queue, 8192).unwrap();
    assert_eq!(flatten(&mut connector_queue), b"\r\n4\r\nabcd\r\n2\r\nef\r\n0\r\n\r\n");
}

/// Scenario 3: a single `Range: bytes=10-19` request against a 100-byte
/// entity yields exactly that 10-byte window with no boundary framing.
#[test]
fn single_range_emits_requested_window_only() {
    let mut ctx = Context::new();
    ctx.entity_length = Some(100);
    ctx.raw_ranges = vec![(10, 19)];
    let entity: Vec<u8> = (0..100).map(|i| i as u8).collect();

    let mut filter_queue = Queue::new(1 << 20, 0);
    filter_queue.put(data(&entity));
    filter_queue.put(Packet::end());

    let mut connector_queue = Queue::new(1 << 20, 0);
    range::outgoing_service(&mut ctx, &mut filter_queue, &mut connector_queue, 4096).unwrap();
    assert!(ctx.range_boundary.is_none());
    assert_eq!(flatten(&mut connector_queue), &entity[10..20]);
}

/// Scenario 4: two ranges over a 100-byte entity produce a
/// `multipart/byteranges` body with one boundary per part.
#[test]
fn multi_range_wraps_parts_with_boundaries() {
    let mut ctx = Context::new();
    ctx.entity_length = Some(100);
    ctx.mime_type = "text/plain".to_string();
    ctx.raw_ranges = vec![(0, 9), (90, 99)];
    let entity: Vec<u8> = (0..100).map(|i| i as u8).collect();

    let mut filter_queue = Queue::new(1 << 20, 0);
    filter_queue.put(data(&entity));
    filter_queue.put(Packet::end());

    let mut connector_queue = Queue::new(1 << 20, 0);
    range::outgoing_service(&mut ctx, &mut filter_queue, &mut connector_queue, 4096).unwrap();
    let boundary = ctx.range_boundary.clone().unwrap();
    let body = flatten(&mut connector_queue);
    let body = String::from_utf8_lossy(&body);
    assert!(body.starts_with(&format!("\r\n--{}\r\nContent-Type: text/plain\r\nContent-Range: bytes 0-9/100\r\n\r\n",
        boundary)));
    assert!(body.ends_with(&format!("\r\n--{}--\r\n", boundary)));
    assert!(body.contains("Content-Range: bytes 90-99/100"));
}

/// Scenario 5: a partial `writev` leaves the surviving iovec entries
/// describing exactly the unsent tail, in order.
#[test]
fn partial_write_advances_queue_to_the_unsent_tail() {
    let mut queue = Queue::new(1 << 20, 0);
    queue.put(data(b"12345")); // 5
    queue.put(data(b"12345678")); // 8
    queue.put(data(b"1234567")); // 7
    assert_eq!(queue.count(), 20);

    queue.advance(7); // drains the 5-byte packet and 2 bytes of the next
    assert_eq!(queue.count(), 13);
    assert_eq!(queue.len(), 2);
    let mut remaining = Vec::new();
    while let Some(mut p) = queue.pop_front() {
        if let Kind::Data(ref mut b) = p.kind {
            remaining.extend_from_slice(&b[..]);
        }
    }
    assert_eq!(remaining, b"345678".iter().chain(b"1234567".iter()).cloned().collect::<Vec<_>>());
}
