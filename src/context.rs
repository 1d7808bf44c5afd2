//! Per-request response context threaded through the stage chain.
//!
//! Grounded on `MaResponse` (`netConnector.c`, `rangeFilter.c`,
//! `chunkFilter.c`): the connectors and filters all read and update one
//! shared record of how much has been written, what the entity length is
//! believed to be, and which byte ranges (if any) are being served.

use std::fs::File;

/// A single byte range requested by the client, already normalized by
/// [`::filters::range::fix_range_length`].
///
/// `len` is kept alongside `start`/`end` because it is cheaper to carry
/// than to recompute, and the original `MaRange` does the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: u64,
    pub end: u64,
    pub len: u64,
}

impl Range {
    pub fn new(start: u64, end: u64) -> Range {
        Range { start: start, end: end, len: end - start }
    }
}

/// Flags on [`Context`] that affect how the pipeline treats the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextFlags {
    /// Set for responses to `HEAD` requests and for statuses that forbid
    /// a body (1xx, 204, 304): connectors queue the HEADER packet but
    /// never schedule DATA/EXTENT packets behind it.
    pub no_body: bool,
}

/// Shared response state for one request, consulted and updated by every
/// stage in its outbound chain.
#[derive(Debug)]
pub struct Context {
    /// Total bytes handed to the connector so far (post-framing).
    pub bytes_written: u64,
    /// `Content-Length`, if fixed; `None` means chunked or not yet known.
    pub length: Option<u64>,
    /// Chunk size in use once the chunk filter has picked one; `None`
    /// until `open()` or the first `outgoing_service` turn decides it.
    pub chunk_size: Option<u64>,
    /// Size of the full entity, once known. Ranges with a negative end
    /// (`-N` meaning "last N bytes") cannot be resolved until this is
    /// set, matching `resp->entityLength`.
    pub entity_length: Option<u64>,
    pub flags: ContextFlags,
    /// Bytes of entity already walked past by the range filter.
    pub pos: u64,
    /// Raw `(start, end)` pairs straight out of the `Range:` header,
    /// exactly as [`::filters::range::parse_range_header`] returns them.
    /// The range filter cannot resolve a negative endpoint until
    /// `entity_length` is known, so these are kept around unfixed until
    /// its first service turn runs [`::filters::range::fix_range_length`].
    pub raw_ranges: Vec<(i64, i64)>,
    /// Ranges requested, already range-fixed; empty means "whole entity".
    pub ranges: Vec<Range>,
    /// Index into `ranges` of the range currently being emitted.
    pub current_range: usize,
    /// `multipart/byteranges` boundary, generated once a second range is
    /// requested.
    pub range_boundary: Option<String>,
    pub mime_type: String,
    /// The open file backing a sendfile response, if any. Held here (not
    /// just inside queued `Extent` packets) so its lifetime spans the
    /// whole response even across partial writes; the `Drop` impl below
    /// is what actually closes it.
    pub file: Option<FileGuard>,
    /// Inbound chunk-spec decoder state, lazily created by
    /// [`::filters::chunked::incoming_data`] on its first call for this
    /// request and driven across however many reads it takes to see the
    /// terminating chunk.
    pub chunk_decoder: Option<::filters::chunked::Decoder>,
    /// Bytes an in-progress inbound chunk spec line was still missing the
    /// last time `incoming_data` ran, carried forward to be glued onto
    /// the front of whatever arrives next.
    pub chunk_leftover: Vec<u8>,
    /// Largest chunk size `incoming_data` accepts before failing the
    /// request with [`::error::Error::LimitExceeded`]; `0` means
    /// unlimited.
    pub inbound_chunk_limit: u64,
}

impl Context {
    pub fn new() -> Context {
        Context {
            bytes_written: 0,
            length: None,
            chunk_size: None,
            entity_length: None,
            flags: ContextFlags::default(),
            pos: 0,
            raw_ranges: Vec::new(),
            ranges: Vec::new(),
            current_range: 0,
            range_boundary: None,
            mime_type: String::from("application/octet-stream"),
            file: None,
            chunk_decoder: None,
            chunk_leftover: Vec::new(),
            inbound_chunk_limit: 0,
        }
    }

    pub fn current_range(&self) -> Option<&Range> {
        self.ranges.get(self.current_range)
    }

    pub fn advance_range(&mut self) {
        self.current_range += 1;
    }
}

/// RAII guard for the file backing a sendfile response.
///
/// The original connector relies on reference-counted cleanup on the
/// request pool; here the equivalent is a `Drop` impl, not a manually
/// called cleanup function, so the descriptor is released exactly once
/// the response (or an error path that drops its `Context`) is done,
/// regardless of which return path was taken.
#[derive(Debug)]
pub struct FileGuard(pub File);

impl Drop for FileGuard {
    fn drop(&mut self) {
        // Closing is implicit via `File`'s own `Drop`; this wrapper exists
        // so `Context` owns the handle with a name that documents intent.
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn range_len_is_exclusive() {
        let r = Range::new(10, 20);
        assert_eq!(r.len, 10);
    }

    #[test]
    fn fresh_context_has_no_ranges() {
        let ctx = Context::new();
        assert!(ctx.current_range().is_none());
    }
}
