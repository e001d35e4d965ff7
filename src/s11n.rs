//! s11n == serialization. Structs that match the bytes that make up FastCGI messages.

use byteorder::{ByteOrder, NetworkEndian};

pub const FASTCGI_VERSION: u8 = 1;

/// Size of every record header on the wire.
pub const HEADER_LEN: usize = 8;

/// Largest content a single record can carry.
pub const MAX_CONTENT_LEN: usize = 0xFFFF;

/// Largest length the 4-byte name-value length form can express.
pub const MAX_NAME_VALUE_LEN: usize = 0x7FFF_FFFF;

pub const BEGIN_REQUEST_BODY_LEN: usize = 8;
pub const END_REQUEST_BODY_LEN: usize = 8;

/// Bit 0 of the BeginRequest flags byte.
pub const FCGI_KEEP_CONN: u8 = 1;

enum_from_primitive! {
    #[repr(u8)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum RecordType {
        BeginRequest = 1,
        AbortRequest = 2,
        EndRequest = 3,
        Params = 4,
        Stdin = 5,
        Stdout = 6,
        Stderr = 7,
        Data = 8,
        GetValues = 9,
        GetValuesResult = 10,
        UnknownType = 11,
    }
}

enum_from_primitive! {
    #[repr(u16)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Role {
        Responder = 1,
        Authorizer = 2,
        Filter = 3,
    }
}

enum_from_primitive! {
    #[repr(u8)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ProtocolStatus {
        RequestComplete = 0,
        CantMultiplexConnections = 1,
        Overloaded = 2,
        UnknownRole = 3,
    }
}

/// The fixed 8-byte prefix of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    /// Raw type byte; see `RecordType`. Kept raw so unknown types survive decoding.
    pub record_type: u8,
    pub request_id: u16,
    pub content_length: u16,
    pub padding_length: u8,
    pub reserved: u8,
}

impl Header {
    pub fn new(record_type: RecordType, request_id: u16, content_length: u16) -> Header {
        Header {
            version: FASTCGI_VERSION,
            record_type: record_type as u8,
            request_id,
            content_length,
            padding_length: 0,
            reserved: 0,
        }
    }

    /// Caller guarantees `bytes.len() >= HEADER_LEN`.
    pub(crate) fn read(bytes: &[u8]) -> Header {
        Header {
            version: bytes[0],
            record_type: bytes[1],
            request_id: NetworkEndian::read_u16(&bytes[2..4]),
            content_length: NetworkEndian::read_u16(&bytes[4..6]),
            padding_length: bytes[6],
            reserved: bytes[7],
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.version;
        out[1] = self.record_type;
        NetworkEndian::write_u16(&mut out[2..4], self.request_id);
        NetworkEndian::write_u16(&mut out[4..6], self.content_length);
        out[6] = self.padding_length;
        out[7] = self.reserved;
        out
    }

    pub fn kind(&self) -> Option<RecordType> {
        use enum_primitive::FromPrimitive;
        RecordType::from_u8(self.record_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginRequestBody {
    pub role: Role,
    pub flags: u8,
}

impl BeginRequestBody {
    pub fn new(role: Role, keep_connection: bool) -> BeginRequestBody {
        BeginRequestBody {
            role,
            flags: if keep_connection { FCGI_KEEP_CONN } else { 0 },
        }
    }

    pub fn to_bytes(&self) -> [u8; BEGIN_REQUEST_BODY_LEN] {
        // role, flags, then 5 reserved bytes
        let mut out = [0u8; BEGIN_REQUEST_BODY_LEN];
        NetworkEndian::write_u16(&mut out[0..2], self.role as u16);
        out[2] = self.flags;
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndRequestBody {
    pub app_status: u32,
    /// Raw status byte; see `ProtocolStatus`.
    pub protocol_status: u8,
}

impl EndRequestBody {
    /// Returns `None` unless `bytes` is exactly one EndRequest body.
    pub fn parse(bytes: &[u8]) -> Option<EndRequestBody> {
        if bytes.len() != END_REQUEST_BODY_LEN {
            return None;
        }
        Some(EndRequestBody {
            app_status: NetworkEndian::read_u32(&bytes[0..4]),
            protocol_status: bytes[4],
        })
    }

    pub fn to_bytes(&self) -> [u8; END_REQUEST_BODY_LEN] {
        let mut out = [0u8; END_REQUEST_BODY_LEN];
        NetworkEndian::write_u32(&mut out[0..4], self.app_status);
        out[4] = self.protocol_status;
        out
    }

    pub fn status(&self) -> Option<ProtocolStatus> {
        use enum_primitive::FromPrimitive;
        ProtocolStatus::from_u8(self.protocol_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let header = Header::new(RecordType::Stdout, 0x1234, 0xABCD);
        assert_eq!(header.to_bytes(), [1, 6, 0x12, 0x34, 0xAB, 0xCD, 0, 0]);
        assert_eq!(Header::read(&header.to_bytes()), header);
        assert_eq!(header.kind(), Some(RecordType::Stdout));
    }

    #[test]
    fn unknown_type_is_kept_raw() {
        let header = Header::read(&[1, 42, 0, 1, 0, 0, 0, 0]);
        assert_eq!(header.record_type, 42);
        assert_eq!(header.kind(), None);
    }

    #[test]
    fn begin_request_responder() {
        let body = BeginRequestBody::new(Role::Responder, false);
        assert_eq!(body.to_bytes(), *b"\x00\x01\x00\x00\x00\x00\x00\x00");
        let body = BeginRequestBody::new(Role::Responder, true);
        assert_eq!(body.to_bytes(), *b"\x00\x01\x01\x00\x00\x00\x00\x00");
    }

    #[test]
    fn end_request_body() {
        let body = EndRequestBody::parse(&[0, 0, 1, 2, 2, 0, 0, 0]).unwrap();
        assert_eq!(body.app_status, 0x0102);
        assert_eq!(body.status(), Some(ProtocolStatus::Overloaded));
        assert_eq!(body.to_bytes(), [0, 0, 1, 2, 2, 0, 0, 0]);

        let body = EndRequestBody::parse(&[0, 0, 0, 0, 3, 0, 0, 0]).unwrap();
        assert_eq!(body.status(), Some(ProtocolStatus::UnknownRole));
        assert!(EndRequestBody::parse(&[0; 7]).is_none());
    }
}
