//! A blocking FastCGI client: builds a Responder request as FastCGI records, sends it over
//! TCP and decodes the records that come back.

extern crate byteorder;
extern crate bytes;
#[macro_use] extern crate enum_primitive;
#[macro_use] extern crate log;
extern crate rand;
extern crate thiserror;
extern crate tokio_util;

pub mod codec;
mod error;
mod response;
mod s11n;
mod session;

pub use codec::{FastcgiRecord, RecordCodec};
pub use error::{CodecError, Error, Result};
pub use response::{RequestState, Response};
pub use s11n::{FASTCGI_VERSION, HEADER_LEN, MAX_CONTENT_LEN, Header, RecordType, Role, ProtocolStatus,
               BeginRequestBody, EndRequestBody};
pub use session::{Config, Session, build_request, read_response};
