use std::io;

use httparse;

quick_error! {
    /// Errors that can terminate a request while it is flowing through the
    /// outbound pipeline.
    ///
    /// Every variant corresponds to one row of the error taxonomy: protocol
    /// errors (`BadChunk`, `ChunkSize`, `BadRange`) fail the connection with
    /// 400, `FileNotFound` fails the request with 404, `LimitExceeded` fails
    /// it with the matching 4xx. Flow-control conditions (`WouldBlock`,
    /// short writes) are not errors at all -- connectors handle them locally
    /// and never construct this type for them.
    #[derive(Debug)]
    pub enum Error {
        /// The socket returned an error other than `WouldBlock` while being
        /// written to. The connection is disconnected and all packets still
        /// queued for it are dropped.
        Socket(err: io::Error) {
            description("socket error")
            display("socket error: {}", err)
            from()
        }
        /// A chunk-transfer spec line did not match `CRLF HEX CRLF`, or no
        /// terminating `\n` was found within the lookahead window.
        BadChunk {
            description("bad chunk specification")
        }
        /// `httparse::parse_chunk_size` rejected the hex-size token.
        ChunkSize(err: httparse::InvalidChunkSize) {
            description("invalid chunk size")
            from()
        }
        /// A `Range` header could not be parsed into a list of byte ranges.
        BadRange {
            description("invalid range specification")
        }
        /// A configured limit (body, headers, upload) was exceeded.
        LimitExceeded(what: &'static str) {
            description("configured limit exceeded")
            display("configured limit exceeded: {}", what)
        }
        /// The send connector could not open the file backing the response.
        FileNotFound(err: io::Error) {
            description("could not open response file")
            display("could not open response file: {}", err)
        }
    }
}

impl Error {
    /// Status a terminated request should be failed with.
    ///
    /// `Socket` has no code: the connection is already gone by the time
    /// this is consulted, so there is nowhere to send a response.
    pub fn status_code(&self) -> Option<u16> {
        match *self {
            Error::Socket(..) => None,
            Error::BadChunk | Error::ChunkSize(..) => Some(400),
            Error::BadRange => Some(400),
            Error::LimitExceeded(..) => Some(413),
            Error::FileNotFound(..) => Some(404),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Error;

    #[test]
    fn status_codes() {
        assert_eq!(Error::BadChunk.status_code(), Some(400));
        assert_eq!(Error::BadRange.status_code(), Some(400));
        assert_eq!(Error::LimitExceeded("body").status_code(), Some(413));
    }
}
