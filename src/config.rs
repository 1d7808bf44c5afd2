//! Tunable limits for the outbound pipeline.
//!
//! Grounded on the `MPR_TUNE_BALANCED` column of the original embedded
//! server's `httpTune.h`, and on this crate family's usual
//! `Config::new().done() -> Arc<Config>` builder convention.

use std::sync::Arc;
use std::time::Duration;

/// Tunables that bound memory use and connection lifetime.
///
/// Construct with [`Config::new`], adjust fields with the builder methods,
/// then call [`Config::done`] to freeze it into an `Arc` suitable for
/// sharing across every connection handled by a listener.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of `iovec` slots a connector may pass to a single vectored
    /// write or sendfile call.
    pub max_iovec: usize,
    /// Default size of an I/O buffer allocated for a stage.
    pub bufsize: usize,
    /// Largest buffer a single stage may grow to while accumulating data.
    pub max_stage_buffer: usize,
    /// Largest chunk the chunked filter will emit in one frame.
    pub max_chunk_size: usize,
    /// Largest total size of the request header block.
    pub max_headers: usize,
    /// Largest number of header lines accepted in a request.
    pub max_num_headers: usize,
    /// Largest request body accepted.
    pub max_body: u64,
    /// Largest response body a handler may generate before the
    /// connection is forced closed instead of kept alive.
    pub max_response_body: u64,
    /// How long an idle keep-alive connection is kept open.
    pub keep_alive_timeout: Duration,
    /// Maximum number of requests served on one keep-alive connection.
    pub max_keep_alive_requests: usize,
    /// Size of the boundary string generated for `multipart/byteranges`.
    pub range_bufsize: usize,
}

impl Config {
    /// Create a config with the balanced tuning defaults.
    pub fn new() -> Config {
        Config {
            max_iovec: 24,
            bufsize: 4096,
            max_stage_buffer: 32 * 1024,
            max_chunk_size: 8 * 1024,
            max_headers: 8 * 1024,
            max_num_headers: 40,
            max_body: 1024 * 1024,
            max_response_body: 256 * 1024 * 1024,
            keep_alive_timeout: Duration::from_secs(60),
            max_keep_alive_requests: 100,
            range_bufsize: 512,
        }
    }

    /// Number of `iovec` slots a connector may pass to a single syscall.
    pub fn max_iovec(&mut self, value: usize) -> &mut Self {
        self.max_iovec = value;
        self
    }

    /// Default size of an I/O buffer allocated for a stage.
    pub fn bufsize(&mut self, value: usize) -> &mut Self {
        self.bufsize = value;
        self
    }

    /// Largest buffer a single stage may grow to while accumulating data.
    pub fn max_stage_buffer(&mut self, value: usize) -> &mut Self {
        self.max_stage_buffer = value;
        self
    }

    /// Largest chunk the chunked filter will emit in one frame.
    pub fn max_chunk_size(&mut self, value: usize) -> &mut Self {
        self.max_chunk_size = value;
        self
    }

    /// Largest total size of the request header block.
    pub fn max_headers(&mut self, value: usize) -> &mut Self {
        self.max_headers = value;
        self
    }

    /// Largest number of header lines accepted in a request.
    pub fn max_num_headers(&mut self, value: usize) -> &mut Self {
        self.max_num_headers = value;
        self
    }

    /// Largest request body accepted.
    pub fn max_body(&mut self, value: u64) -> &mut Self {
        self.max_body = value;
        self
    }

    /// Largest response body a handler may generate before the
    /// connection is forced closed instead of kept alive.
    pub fn max_response_body(&mut self, value: u64) -> &mut Self {
        self.max_response_body = value;
        self
    }

    /// How long an idle keep-alive connection is kept open.
    pub fn keep_alive_timeout(&mut self, value: Duration) -> &mut Self {
        self.keep_alive_timeout = value;
        self
    }

    /// Maximum number of requests served on one keep-alive connection.
    pub fn max_keep_alive_requests(&mut self, value: usize) -> &mut Self {
        self.max_keep_alive_requests = value;
        self
    }

    /// Size of the boundary string generated for `multipart/byteranges`.
    pub fn range_bufsize(&mut self, value: usize) -> &mut Self {
        self.range_bufsize = value;
        self
    }

    /// Create an `Arc`'d config clone to pass to a listener.
    ///
    /// This is just a convenience method.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}
