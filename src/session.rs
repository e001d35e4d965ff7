use crate::codec::{self, RecordCodec};
use crate::error::{CodecError, Error, Result};
use crate::response::Response;
use crate::s11n::{BeginRequestBody, RecordType, Role};

use bytes::BytesMut;
use rand::Rng;
use tokio_util::codec::Decoder;

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const READ_CHUNK_SIZE: usize = 4096;

/// Where to find the responder and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Applies to connect, read and write. Zero means no timeout.
    pub timeout: Duration,
    /// Sets FCGI_KEEP_CONN in the BeginRequest record.
    pub keepalive: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            host: "127.0.0.1".to_owned(),
            port: 9000,
            timeout: Duration::from_secs(3),
            keepalive: false,
        }
    }
}

impl Config {
    pub fn new<H: Into<String>>(host: H, port: u16) -> Config {
        Config {
            host: host.into(),
            port,
            ..Config::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Config {
        self.timeout = timeout;
        self
    }

    pub fn with_keepalive(mut self, keepalive: bool) -> Config {
        self.keepalive = keepalive;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn io_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::from_secs(0) {
            None
        } else {
            Some(self.timeout)
        }
    }
}

/// A FastCGI client that runs one Responder request at a time, each on its own connection.
#[derive(Debug)]
pub struct Session {
    config: Config,
    stream: Option<TcpStream>,
}

impl Session {
    pub fn new(config: Config) -> Session {
        Session {
            config,
            stream: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the connection the next `request` will use. Failures are logged, not returned.
    pub fn connect(&mut self) -> bool {
        match self.open() {
            Ok(stream) => {
                self.stream = Some(stream);
                true
            }
            Err(e) => {
                error!("{}", e);
                self.stream = None;
                false
            }
        }
    }

    fn open(&self) -> Result<TcpStream> {
        let addr = self.config.addr();
        let connect_error = |source| Error::Connect { addr: addr.clone(), source };

        let candidates = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()
            .map_err(connect_error)?;

        let timeout = self.config.io_timeout();
        let mut last_error = None;
        for candidate in candidates {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(&candidate, t),
                None => TcpStream::connect(candidate),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_read_timeout(timeout).map_err(connect_error)?;
                    stream.set_write_timeout(timeout).map_err(connect_error)?;
                    debug!("connected to {}", candidate);
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("connect to {} failed: {}", candidate, e);
                    last_error = Some(e);
                }
            }
        }

        Err(connect_error(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        })))
    }

    /// Run one request and wait for the whole response.
    ///
    /// Uses the connection from a preceding `connect`, or opens a fresh one. Either way the
    /// connection is closed before this returns.
    pub fn request<I, K, V>(&mut self, params: I, body: &[u8]) -> Result<Response>
        where I: IntoIterator<Item = (K, V)>,
              K: AsRef<[u8]>,
              V: AsRef<[u8]>,
    {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.open().map_err(|e| {
                error!("connect failure, please check your FastCGI server: {}", e);
                e
            })?,
        };

        let request_id = rand::thread_rng().gen_range(1..=u16::MAX);
        let wire = build_request(request_id, self.config.keepalive, params, body)?;

        info!("request {} -> {}: {} bytes ({} bytes of stdin)",
              request_id, self.config.addr(), wire.len(), body.len());
        stream.write_all(&wire)?;
        stream.flush()?;

        read_response(&mut stream, request_id)
    }
}

/// Assemble the wire bytes of one Responder request: BeginRequest, the Params stream and
/// the Stdin stream, each stream closed by its empty record.
pub fn build_request<I, K, V>(request_id: u16, keepalive: bool, params: I, body: &[u8])
    -> std::result::Result<BytesMut, CodecError>
    where I: IntoIterator<Item = (K, V)>,
          K: AsRef<[u8]>,
          V: AsRef<[u8]>,
{
    let mut buf = BytesMut::new();

    let begin = BeginRequestBody::new(Role::Responder, keepalive);
    codec::encode_record(RecordType::BeginRequest, &begin.to_bytes(), request_id, &mut buf)?;

    let mut params_buf = BytesMut::new();
    for (name, value) in params {
        codec::encode_name_value_pair(name.as_ref(), value.as_ref(), &mut params_buf)?;
    }
    codec::encode_stream(RecordType::Params, &params_buf, request_id, &mut buf)?;

    codec::encode_stream(RecordType::Stdin, body, request_id, &mut buf)?;

    Ok(buf)
}

/// Read records until the peer closes, a read fails, or the EndRequest for `request_id`
/// arrives, folding them into a `Response`.
///
/// A stream that ends mid-record, or a read that fails before EndRequest, yields
/// `Error::Incomplete` carrying what was decoded.
pub fn read_response<R: Read>(reader: &mut R, request_id: u16) -> Result<Response> {
    let mut response = Response::new(request_id);
    match drain(reader, &mut response) {
        Ok(()) => {
            debug!("request {} finished in state {:?}, {} bytes of body",
                   request_id, response.state, response.body.len());
            Ok(response)
        }
        Err(source) => {
            error!("request {}: decoding stopped: {}", request_id, source);
            Err(Error::Incomplete {
                partial: Box::new(response),
                source,
            })
        }
    }
}

fn drain<R: Read>(reader: &mut R, response: &mut Response) -> std::result::Result<(), CodecError> {
    let mut decoder = RecordCodec;
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => {
                debug!("peer closed the connection");
                break;
            }
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // EndRequest returns below, so reaching here means the response was cut short.
                return Err(CodecError::Io(e));
            }
        }

        while let Some(record) = decoder.decode(&mut buf)? {
            response.absorb(&record)?;
        }
        if response.is_complete() {
            if !buf.is_empty() {
                warn!("{} trailing bytes after EndRequest", buf.len());
            }
            return Ok(());
        }
    }

    while let Some(record) = decoder.decode_eof(&mut buf)? {
        response.absorb(&record)?;
    }
    Ok(())
}
