//! Minimal shape of the request head the outbound pipeline needs.
//!
//! Request parsing itself is out of scope (see the crate-level docs):
//! this type is the seam an external request parser hands off through.
//! It carries exactly the fields the pipeline's stages consult -- the
//! method (for `HEAD` bodyless-response handling), the version (for the
//! status-line), whether the client demanded `Connection: close`, and a
//! raw `Range:` header value for the range filter.

use enums::{Method, Version};

#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub version: Version,
    pub uri: String,
    /// Already decided from the `Connection` header and the HTTP
    /// version (HTTP/1.0 defaults to close, HTTP/1.1 to keep-alive).
    pub close: bool,
    /// Raw `Range:` header value, if present.
    pub range: Option<String>,
}

impl RequestHead {
    pub fn is_head(&self) -> bool {
        matches!(self.method, Method::Head)
    }
}
