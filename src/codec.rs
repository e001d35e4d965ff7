//! Record framing and name-value encoding. No I/O happens here; everything operates on
//! in-memory buffers.

use crate::error::CodecError;
use crate::s11n::*;

use byteorder::{ByteOrder, NetworkEndian};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastcgiRecord {
    pub header: Header,
    pub content: Bytes,
}

impl FastcgiRecord {
    /// Build an outgoing record. Content that doesn't fit one record is rejected.
    pub fn new<B: Into<Bytes>>(record_type: RecordType, request_id: u16, content: B)
        -> Result<FastcgiRecord, CodecError>
    {
        let content = content.into();
        let header = raw_header(record_type as u8, request_id, content.len())?;
        Ok(FastcgiRecord { header, content })
    }

    pub fn kind(&self) -> Option<RecordType> {
        self.header.kind()
    }

    pub fn request_id(&self) -> u16 {
        self.header.request_id
    }
}

/// Encode a header for `content_length` bytes of content and no padding.
///
/// Lengths that don't fit the 16-bit field are rejected rather than masked.
pub fn encode_header(record_type: RecordType, request_id: u16, content_length: usize)
    -> Result<[u8; HEADER_LEN], CodecError>
{
    raw_header(record_type as u8, request_id, content_length).map(|h| h.to_bytes())
}

fn raw_header(record_type: u8, request_id: u16, content_length: usize) -> Result<Header, CodecError> {
    if content_length > MAX_CONTENT_LEN {
        error!("record type {} is too long: {}", record_type, content_length);
        return Err(CodecError::ContentTooLong(content_length));
    }
    Ok(Header {
        version: FASTCGI_VERSION,
        record_type,
        request_id,
        content_length: content_length as u16,
        padding_length: 0,
        reserved: 0,
    })
}

/// Append `header || content` to `buf`.
pub fn encode_record(record_type: RecordType, content: &[u8], request_id: u16, buf: &mut BytesMut)
    -> Result<(), CodecError>
{
    let header = encode_header(record_type, request_id, content.len())?;
    buf.reserve(HEADER_LEN + content.len());
    buf.put_slice(&header);
    buf.put_slice(content);
    Ok(())
}

/// Append a whole FastCGI stream: `content` split into records of at most 65535 bytes,
/// followed by the empty record that terminates the stream.
pub fn encode_stream(record_type: RecordType, content: &[u8], request_id: u16, buf: &mut BytesMut)
    -> Result<(), CodecError>
{
    for chunk in content.chunks(MAX_CONTENT_LEN) {
        encode_record(record_type, chunk, request_id, buf)?;
    }
    encode_record(record_type, &[], request_id, buf)
}

fn write_len(buf: &mut BytesMut, len: usize) -> Result<(), CodecError> {
    if len < 0x80 {
        buf.put_u8(len as u8);
    } else if len <= MAX_NAME_VALUE_LEN {
        buf.put_u32(len as u32 | 0x8000_0000);
    } else {
        return Err(CodecError::NameValueTooLong(len));
    }
    Ok(())
}

fn read_len(buf: &mut Bytes) -> Result<usize, CodecError> {
    let first_byte = match buf.first() {
        Some(&b) => b,
        None => return Err(CodecError::MalformedNameValue),
    };
    if first_byte < 0x80 {
        buf.advance(1);
        Ok(first_byte as usize)
    } else if buf.len() < 4 {
        Err(CodecError::MalformedNameValue)
    } else {
        let len = NetworkEndian::read_u32(&buf[..4]) & 0x7FFF_FFFF;
        buf.advance(4);
        Ok(len as usize)
    }
}

/// Append `len(name) || len(value) || name || value`. Each length takes one byte when
/// below 128 and four bytes (high bit set) otherwise, chosen independently.
pub fn encode_name_value_pair(name: &[u8], value: &[u8], buf: &mut BytesMut) -> Result<(), CodecError> {
    write_len(buf, name.len())?;
    write_len(buf, value.len())?;
    buf.reserve(name.len() + value.len());
    buf.put_slice(name);
    buf.put_slice(value);
    Ok(())
}

/// Consume one name-value pair from the front of `buf`.
pub fn decode_name_value_pair(buf: &mut Bytes) -> Result<(Bytes, Bytes), CodecError> {
    let name_len = read_len(buf)?;
    let value_len = read_len(buf)?;
    if buf.len() < name_len || buf.len() - name_len < value_len {
        debug!("name-value pair needs {} + {} bytes, have {}", name_len, value_len, buf.len());
        return Err(CodecError::MalformedNameValue);
    }
    let name = buf.split_to(name_len);
    let value = buf.split_to(value_len);
    Ok((name, value))
}

/// Decode every name-value pair in the content of a Params, GetValues or GetValuesResult
/// record.
pub fn decode_params(mut content: Bytes) -> Result<Vec<(Bytes, Bytes)>, CodecError> {
    let mut params = vec![];
    while !content.is_empty() {
        let (name, value) = decode_name_value_pair(&mut content)?;
        debug!("param ({}, {})", String::from_utf8_lossy(&name), String::from_utf8_lossy(&value));
        params.push((name, value));
    }
    Ok(params)
}

/// Extract header fields from the first 8 bytes. No validation beyond the length check.
pub fn decode_header(bytes: &[u8]) -> Result<Header, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::TruncatedHeader { available: bytes.len() });
    }
    Ok(Header::read(bytes))
}

/// Decode the next record from a finished stream.
///
/// `Ok(None)` means the buffer is empty: the normal end of a response. A buffer holding
/// part of a record is a `TruncatedHeader`/`TruncatedRecord` error.
pub fn decode_record(buf: &mut BytesMut) -> Result<Option<FastcgiRecord>, CodecError> {
    RecordCodec.decode_eof(buf)
}

/// Streaming codec: `decode` waits for more bytes, `decode_eof` reports leftovers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordCodec;

impl Decoder for RecordCodec {
    type Item = FastcgiRecord;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<FastcgiRecord>, CodecError> {
        if buf.len() < HEADER_LEN {
            debug!("insufficient buffer for header: {} bytes", buf.len());
            return Ok(None);
        }

        let header = Header::read(&buf[..HEADER_LEN]);
        let content_len = header.content_length as usize;
        let padding_len = header.padding_length as usize;
        let record_len = HEADER_LEN + content_len + padding_len;
        if buf.len() < record_len {
            debug!("insufficient buffer for record: have {}, need {}", buf.len(), record_len);
            buf.reserve(record_len - buf.len());
            return Ok(None);
        }

        buf.advance(HEADER_LEN);
        let content = buf.split_to(content_len).freeze();
        buf.advance(padding_len);

        debug!("request id: {}; record type: {:?} ({}), {} bytes of content, buffer now has {} bytes",
               header.request_id, header.kind(), header.record_type, content_len, buf.len());

        Ok(Some(FastcgiRecord { header, content }))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<FastcgiRecord>, CodecError> {
        if let Some(record) = self.decode(buf)? {
            return Ok(Some(record));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let err = match decode_header(buf) {
            Err(e) => e,
            Ok(header) => CodecError::TruncatedRecord {
                expected: header.content_length as usize + header.padding_length as usize,
                available: buf.len() - HEADER_LEN,
            },
        };
        error!("{}", err);
        Err(err)
    }
}

impl Encoder<FastcgiRecord> for RecordCodec {
    type Error = CodecError;

    /// Content length is taken from the content itself; padding is never added.
    fn encode(&mut self, record: FastcgiRecord, buf: &mut BytesMut) -> Result<(), CodecError> {
        let header = raw_header(record.header.record_type, record.header.request_id, record.content.len())?;
        buf.reserve(HEADER_LEN + record.content.len());
        buf.put_slice(&header.to_bytes());
        buf.put_slice(&record.content);
        Ok(())
    }
}
