//! HTTP exchange probes
//!
//! The exchange is one plain HTTP/1.1 request and response over TCP. The
//! initiator counts a `200` status as success. Transport errors, timeouts
//! and other statuses are retryable; a response that is not HTTP at all is
//! fatal. The responder answers exactly one request per attempt.
//!
//! A peer that closes before sending a line is a transport failure. Lines
//! that are not UTF-8 or exceed [`MAX_LINE_BYTES`] are malformed.

use std::io;
use std::net::{IpAddr, SocketAddr, SocketAddrV6};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use tb_core::traits::ExchangeProbe;
use tb_core::ExchangeOutcome;

const RESPONSE_BODY: &str = "OK";

/// Longest status, request or header line accepted
pub const MAX_LINE_BYTES: u64 = 8192;

/// Read one line, bounded by [`MAX_LINE_BYTES`].
///
/// The outer error is a transport failure, including the peer closing
/// before any byte arrived. The inner error describes a malformed line.
async fn read_line_bounded<R>(reader: &mut R) -> io::Result<Result<String, String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = (&mut *reader).take(MAX_LINE_BYTES).read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before a line was sent",
        ));
    }
    if !line.ends_with(b"\n") && n as u64 == MAX_LINE_BYTES {
        return Ok(Err(format!("line longer than {} bytes", MAX_LINE_BYTES)));
    }
    Ok(String::from_utf8(line).map_err(|_| "line is not valid UTF-8".to_string()))
}

/// Parse an HTTP status line such as `HTTP/1.1 200 OK` into its code
pub fn parse_status_line(line: &str) -> Result<u16, String> {
    let mut parts = line.trim_end().splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(format!("not an HTTP status line: {:?}", line.trim_end()));
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (100..=599).contains(code))
        .ok_or_else(|| format!("malformed status code in {:?}", line.trim_end()))
}

/// Parse an HTTP request line such as `GET / HTTP/1.1` into method and path
pub fn parse_request_line(line: &str) -> Result<(&str, &str), String> {
    let mut parts = line.trim_end().split(' ');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(version), None)
            if !method.is_empty() && path.starts_with('/') && version.starts_with("HTTP/") =>
        {
            Ok((method, path))
        }
        _ => Err(format!("not an HTTP request line: {:?}", line.trim_end())),
    }
}

/// Interface index for scoping a link-local IPv6 address
#[cfg(unix)]
pub fn interface_index(name: &str) -> Option<u32> {
    let name = std::ffi::CString::new(name).ok()?;
    // SAFETY: `name` is a valid NUL-terminated string for the duration of the call
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    (index != 0).then_some(index)
}

#[cfg(not(unix))]
pub fn interface_index(_name: &str) -> Option<u32> {
    None
}

/// Initiator side: sends `GET /` and expects `200`
#[derive(Debug, Clone)]
pub struct HttpInitiatorProbe {
    host: String,
    scope: Option<String>,
    port: u16,
    timeout: Duration,
}

impl HttpInitiatorProbe {
    /// Probe `host:port`; `scope` names the interface for link-local targets
    pub fn new(host: impl Into<String>, scope: Option<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            scope,
            port,
            timeout,
        }
    }

    async fn resolve(&self) -> io::Result<SocketAddr> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => {
                let scope_id = match &self.scope {
                    Some(interface) => interface_index(interface).ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::NotFound,
                            format!("interface {} does not exist", interface),
                        )
                    })?,
                    None => 0,
                };
                Ok(SocketAddr::V6(SocketAddrV6::new(ip, self.port, 0, scope_id)))
            }
            Ok(ip) => Ok(SocketAddr::new(ip, self.port)),
            Err(_) => tokio::net::lookup_host((host, self.port))
                .await?
                .next()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", host))),
        }
    }

    async fn request(&self) -> io::Result<Result<String, String>> {
        let addr = self.resolve().await?;
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!(
            "GET / HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.host
        );
        stream.write_all(request.as_bytes()).await?;

        let mut reader = BufReader::new(stream);
        read_line_bounded(&mut reader).await
    }
}

#[async_trait]
impl ExchangeProbe for HttpInitiatorProbe {
    async fn attempt(&mut self) -> ExchangeOutcome {
        let status_line = match tokio::time::timeout(self.timeout, self.request()).await {
            Err(_) => return ExchangeOutcome::RetryableFailure(format!("no response within {:?}", self.timeout)),
            Ok(Err(e)) => return ExchangeOutcome::RetryableFailure(e.to_string()),
            Ok(Ok(Err(reason))) => {
                tracing::error!("Malformed response from {}: {}", self.host, reason);
                return ExchangeOutcome::FatalFailure(reason);
            }
            Ok(Ok(Ok(line))) => line,
        };

        match parse_status_line(&status_line) {
            Ok(200) => ExchangeOutcome::Success,
            Ok(code) => ExchangeOutcome::RetryableFailure(format!("unexpected status {}", code)),
            Err(reason) => {
                tracing::error!("Malformed response from {}: {}", self.host, reason);
                ExchangeOutcome::FatalFailure(reason)
            }
        }
    }
}

/// Responder side: serves one request per attempt
#[derive(Debug)]
pub struct HttpResponderProbe {
    listener: TcpListener,
    accept_timeout: Duration,
}

impl HttpResponderProbe {
    /// Listen on `addr` for the lifetime of the probe
    pub async fn bind(addr: SocketAddr, accept_timeout: Duration) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Exchange responder listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            accept_timeout,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    async fn serve_one(&self) -> io::Result<Result<SocketAddr, String>> {
        let (stream, peer) = self.listener.accept().await?;
        let mut reader = BufReader::new(stream);

        let request_line = match read_line_bounded(&mut reader).await? {
            Ok(line) => line,
            Err(reason) => return Ok(Err(reason)),
        };
        if let Err(reason) = parse_request_line(&request_line) {
            return Ok(Err(reason));
        }

        // Drain headers up to the blank line
        loop {
            match read_line_bounded(&mut reader).await {
                Ok(Ok(header)) if !header.trim_end().is_empty() => {}
                Ok(Ok(_)) => break,
                Ok(Err(reason)) => return Ok(Err(reason)),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
        }

        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            RESPONSE_BODY.len(),
            RESPONSE_BODY
        );
        let mut stream = reader.into_inner();
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await?;
        Ok(Ok(peer))
    }
}

#[async_trait]
impl ExchangeProbe for HttpResponderProbe {
    async fn attempt(&mut self) -> ExchangeOutcome {
        match tokio::time::timeout(self.accept_timeout, self.serve_one()).await {
            Err(_) => ExchangeOutcome::RetryableFailure(format!("no request within {:?}", self.accept_timeout)),
            Ok(Err(e)) => ExchangeOutcome::RetryableFailure(e.to_string()),
            Ok(Ok(Err(reason))) => {
                tracing::error!("Malformed request: {}", reason);
                ExchangeOutcome::FatalFailure(reason)
            }
            Ok(Ok(Ok(peer))) => {
                tracing::debug!("Served exchange for {}", peer);
                ExchangeOutcome::Success
            }
        }
    }
}
