//! Stage capability record.
//!
//! Grounded on `MaStage` (`chunkFilter.c`'s `filter->open/match/
//! outgoingService/incomingData` assignments, `netConnector.c`'s
//! `stage->outgoingService`): a stage is not a trait object hierarchy,
//! it is a record of which of a handful of optional callbacks it fills
//! in. Handlers, filters and connectors all share this one shape; their
//! `role` only gates which slots the registry expects to be present.

use context::Context;
use error::Error;
use queue::Queue;

/// Where in the chain a stage may be spliced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Produces the response (not modeled further here -- outbound
    /// pipeline only forwards from an existing source).
    Handler,
    /// Transforms packets in flight: chunk framing, byte ranges.
    Filter,
    /// Terminal stage that performs the actual write syscalls.
    Connector,
}

/// Outcome of a service turn: how many content bytes were accepted
/// downstream (for flow-control bookkeeping) and whether the queue
/// should be rescheduled immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Serviced {
    pub bytes: u64,
    pub again: bool,
}

/// A stage's capability record.
///
/// Every field is an optional function pointer, exactly as the original
/// `MaStage` leaves most callbacks null: a stage only needs to fill in
/// the handful it actually implements. `open`/`close`/`r#match` run once
/// per request; `outgoing_service` runs every time the queue behind this
/// stage has packets (or its downstream neighbor wants more); a filter
/// additionally fills `incoming_data` if it also transforms request
/// bytes (the chunk filter is the one stage in this crate that does).
pub struct Stage {
    pub name: &'static str,
    pub role: Role,
    /// One-time setup, e.g. the chunk filter picking its chunk size.
    pub open: Option<fn(&mut Context, &mut Queue)>,
    /// One-time teardown.
    pub close: Option<fn(&mut Context)>,
    /// Whether this stage should be spliced into the chain at all for
    /// the given context (the chunk filter only participates when no
    /// fixed `Content-Length` is already known).
    pub matches: Option<fn(&Context) -> bool>,
    /// Transform inbound request bytes (chunked request bodies).
    pub incoming_data: Option<fn(&mut Context, &mut Queue) -> Result<(), Error>>,
    /// Drain this stage's queue toward the next stage/the network.
    pub outgoing_service: Option<fn(&mut Context, &mut Queue) -> Result<Serviced, Error>>,
}

impl Stage {
    pub fn matches(&self, ctx: &Context) -> bool {
        self.matches.map_or(true, |f| f(ctx))
    }
}

/// An ordered, read-only set of stages a connection's stage chain is
/// assembled from.
///
/// Registries are built once at server startup and shared (typically
/// behind an `Arc`) across every connection; the pipeline runner walks
/// `stages` once per new request, keeping only those whose `matches`
/// returns true, in registration order, connector last.
pub struct StageRegistry {
    pub stages: Vec<Stage>,
}

impl StageRegistry {
    pub fn new() -> StageRegistry {
        StageRegistry { stages: Vec::new() }
    }

    pub fn register(&mut self, stage: Stage) -> &mut Self {
        self.stages.push(stage);
        self
    }

    /// Stages that apply to this response, in chain order.
    pub fn active<'a>(&'a self, ctx: &Context) -> Vec<&'a Stage> {
        self.stages.iter().filter(|s| s.matches(ctx)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registry_filters_by_match() {
        let mut reg = StageRegistry::new();
        reg.register(Stage {
            name: "always",
            role: Role::Filter,
            open: None, close: None, incoming_data: None, outgoing_service: None,
            matches: None,
        });
        reg.register(Stage {
            name: "never",
            role: Role::Filter,
            open: None, close: None, incoming_data: None, outgoing_service: None,
            matches: Some(|_ctx| false),
        });
        let ctx = Context::new();
        let active = reg.active(&ctx);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "always");
    }

    #[test]
    fn chunk_filter_incoming_data_slots_in_directly() {
        // Unlike `outgoing_service`, `chunked::incoming_data`'s signature
        // matches this record's `incoming_data` slot with no adapter.
        let stage = Stage {
            name: "chunked",
            role: Role::Filter,
            open: None,
            close: None,
            matches: None,
            incoming_data: Some(::filters::chunked::incoming_data),
            outgoing_service: None,
        };
        let mut ctx = Context::new();
        let mut queue = Queue::new(1 << 16, 0);
        queue.put(::packet::Packet::data({
            use std::io::Write;
            let mut buf = ::netbuf::Buf::new();
            buf.write_all(b"\r\n2\r\nhi\r\n0\r\n\r\n").unwrap();
            buf
        }));
        (stage.incoming_data.unwrap())(&mut ctx, &mut queue).unwrap();
        assert_eq!(queue.len(), 2); // coalesced data packet + END marker
    }
}
