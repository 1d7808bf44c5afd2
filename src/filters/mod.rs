//! Transforming stages spliced between a handler and a connector.

pub mod chunked;
pub mod range;
