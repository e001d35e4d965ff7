//! Error types for fcgi-client.

use crate::response::Response;

use thiserror::Error;

use std::io;

/// Failures while translating between records and wire bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Fewer than 8 bytes where a header was expected.
    #[error("truncated header: {available} of 8 bytes available")]
    TruncatedHeader { available: usize },

    /// A header promised more content (and padding) than the stream held.
    #[error("truncated record: expected {expected} bytes, only {available} available")]
    TruncatedRecord { expected: usize, available: usize },

    /// Content does not fit the 16-bit content length field.
    #[error("record content too long: {0} bytes")]
    ContentTooLong(usize),

    /// Name or value does not fit the 31-bit name-value length form.
    #[error("un-encodable name-value pair length: {0:#x}")]
    NameValueTooLong(usize),

    /// A name-value pair runs past the end of its record.
    #[error("malformed name-value pair")]
    MalformedNameValue,

    /// A fixed-size record body had the wrong length.
    #[error("malformed {record_type} body of {len} bytes")]
    MalformedBody { record_type: &'static str, len: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failures of a whole request/response exchange.
#[derive(Debug, Error)]
pub enum Error {
    /// The responder could not be reached.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Transport failure while sending the request.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The request could not be encoded.
    #[error("encode error: {0}")]
    Codec(#[from] CodecError),

    /// The response stream broke off mid-record. `partial` holds everything
    /// decoded before the failure.
    #[error("incomplete response: {source}")]
    Incomplete {
        partial: Box<Response>,
        #[source]
        source: CodecError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
