use crate::codec::FastcgiRecord;
use crate::error::CodecError;
use crate::s11n::{EndRequestBody, ProtocolStatus, RecordType, FASTCGI_VERSION};

use enum_primitive::FromPrimitive;

use std::borrow::Cow;

/// Where a request stands: `Sent -> {Success, Error}`. `Error` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Sent,
    Error,
    Success,
}

/// Everything the responder sent back for one request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub request_id: u16,
    pub state: RequestState,
    /// Stdout and stderr content in the order it arrived.
    pub body: Vec<u8>,
    /// Only the stderr content.
    pub stderr: Vec<u8>,
    pub app_status: Option<u32>,
    /// Raw status byte from EndRequest; see `protocol_status()`.
    pub protocol_status_raw: Option<u8>,
    ended: bool,
}

impl Response {
    pub fn new(request_id: u16) -> Response {
        Response {
            request_id,
            state: RequestState::Sent,
            body: Vec::new(),
            stderr: Vec::new(),
            app_status: None,
            protocol_status_raw: None,
            ended: false,
        }
    }

    /// True once the EndRequest record for this request has been seen.
    pub fn is_complete(&self) -> bool {
        self.ended
    }

    pub fn is_error(&self) -> bool {
        self.state == RequestState::Error
    }

    pub fn protocol_status(&self) -> Option<ProtocolStatus> {
        self.protocol_status_raw.and_then(ProtocolStatus::from_u8)
    }

    /// The body as text. This is the only place bytes become text.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Fold one decoded record into the response.
    pub(crate) fn absorb(&mut self, record: &FastcgiRecord) -> Result<(), CodecError> {
        if record.header.version != FASTCGI_VERSION {
            warn!("unexpected FCGI version {}", record.header.version);
        }
        if record.request_id() != self.request_id {
            warn!("ignoring {:?} record for request id {} (expecting {})",
                  record.kind(), record.request_id(), self.request_id);
            return Ok(());
        }

        match record.kind() {
            Some(RecordType::Stdout) => {
                self.body.extend_from_slice(&record.content);
            }
            Some(RecordType::Stderr) => {
                if !record.content.is_empty() {
                    warn!("request {}: {} bytes on stderr", self.request_id, record.content.len());
                    self.state = RequestState::Error;
                }
                self.body.extend_from_slice(&record.content);
                self.stderr.extend_from_slice(&record.content);
            }
            Some(RecordType::EndRequest) => {
                let end = EndRequestBody::parse(&record.content).ok_or_else(|| {
                    CodecError::MalformedBody {
                        record_type: "EndRequest",
                        len: record.content.len(),
                    }
                })?;
                debug!("request {} ended: app status {}, protocol status {:?}",
                       self.request_id, end.app_status, end.status());
                self.ended = true;
                self.app_status = Some(end.app_status);
                self.protocol_status_raw = Some(end.protocol_status);
                if self.state == RequestState::Sent {
                    self.state = match end.status() {
                        Some(ProtocolStatus::RequestComplete) => RequestState::Success,
                        _ => RequestState::Error,
                    };
                }
            }
            Some(other) => {
                warn!("unexpected {:?} record from responder", other);
            }
            None => {
                warn!("unknown record type {} from responder", record.header.record_type);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end_request(id: u16, status: ProtocolStatus) -> FastcgiRecord {
        let body = EndRequestBody { app_status: 0, protocol_status: status as u8 };
        FastcgiRecord::new(RecordType::EndRequest, id, body.to_bytes().to_vec()).unwrap()
    }

    #[test]
    fn stdout_then_end_is_success() {
        let mut response = Response::new(7);
        response.absorb(&FastcgiRecord::new(RecordType::Stdout, 7, &b"OK"[..]).unwrap()).unwrap();
        assert_eq!(response.state, RequestState::Sent);
        assert!(!response.is_complete());

        response.absorb(&end_request(7, ProtocolStatus::RequestComplete)).unwrap();
        assert_eq!(response.state, RequestState::Success);
        assert!(response.is_complete());
        assert_eq!(response.app_status, Some(0));
        assert_eq!(response.protocol_status(), Some(ProtocolStatus::RequestComplete));
        assert_eq!(response.body_text(), "OK");
    }

    #[test]
    fn stderr_is_terminal_error() {
        let mut response = Response::new(7);
        response.absorb(&FastcgiRecord::new(RecordType::Stdout, 7, &b"a"[..]).unwrap()).unwrap();
        response.absorb(&FastcgiRecord::new(RecordType::Stderr, 7, &b"oops"[..]).unwrap()).unwrap();
        response.absorb(&FastcgiRecord::new(RecordType::Stdout, 7, &b"b"[..]).unwrap()).unwrap();
        response.absorb(&end_request(7, ProtocolStatus::RequestComplete)).unwrap();

        assert!(response.is_error());
        assert_eq!(response.body, b"aoopsb");
        assert_eq!(response.stderr, b"oops");
    }

    #[test]
    fn empty_stderr_is_not_an_error() {
        let mut response = Response::new(1);
        response.absorb(&FastcgiRecord::new(RecordType::Stderr, 1, Vec::<u8>::new()).unwrap()).unwrap();
        assert_eq!(response.state, RequestState::Sent);
    }

    #[test]
    fn refused_request_is_error() {
        let mut response = Response::new(1);
        response.absorb(&end_request(1, ProtocolStatus::Overloaded)).unwrap();
        assert!(response.is_error());
        assert!(response.is_complete());
        assert_eq!(response.protocol_status(), Some(ProtocolStatus::Overloaded));
    }

    #[test]
    fn foreign_request_id_is_ignored() {
        let mut response = Response::new(1);
        response.absorb(&FastcgiRecord::new(RecordType::Stderr, 2, &b"x"[..]).unwrap()).unwrap();
        response.absorb(&end_request(2, ProtocolStatus::RequestComplete)).unwrap();
        assert_eq!(response.state, RequestState::Sent);
        assert!(response.body.is_empty());
        assert!(!response.is_complete());
    }

    #[test]
    fn malformed_end_request() {
        let mut response = Response::new(1);
        let record = FastcgiRecord::new(RecordType::EndRequest, 1, &b"\x00\x00"[..]).unwrap();
        match response.absorb(&record) {
            Err(CodecError::MalformedBody { len: 2, .. }) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(response.state, RequestState::Sent);
    }
}
