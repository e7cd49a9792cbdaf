//! Concurrent TLS certificate expiry checks.
//!
//! [`CertificateProbe`] dials one server, lets OpenSSL verify the presented
//! chain against the server name and reports the leaf certificate's expiry.
//! [`scheduler::probe_all`] fans the probe out over a list of names and
//! hands every [`ProbeResult`] to a single consumer.

pub mod config;
pub mod error;
pub mod names;
pub mod report;
pub mod scheduler;

use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::ssl::{HandshakeError, SslConnector, SslMethod, SslVerifyMode};
use openssl::x509::X509VerifyResult;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub use error::ProbeError;

/// Default dial timeout, covering TCP connect and TLS handshake.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default HTTPS port.
pub const DEFAULT_PORT: u16 = 443;

/// Result of checking one server name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub server: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// The three ways a probe can end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Chain verified for the server name; expiry of the leaf certificate.
    Valid { not_after: DateTime<Utc> },
    /// Handshake completed but the chain is not valid for the server name.
    VerificationFailed { reason: String },
    /// Resolution, connect or handshake failed.
    ConnectionFailed { reason: String },
}

impl Outcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Outcome::Valid { .. })
    }
}

/// Per-probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Upper bound for connect plus handshake
    pub timeout: Duration,
    /// Port dialed on every server
    pub port: u16,
    /// Extra PEM roots trusted on top of the system store
    pub ca_file: Option<PathBuf>,
    /// Worker limit for the scheduler, `None` for one thread per name
    pub concurrency: Option<usize>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            timeout: DEFAULT_TIMEOUT,
            port: DEFAULT_PORT,
            ca_file: None,
            concurrency: None,
        }
    }
}

/// Dials servers and classifies what they present.
///
/// The underlying connector is reference counted, so cloning a probe to hand
/// it to another thread is cheap.
#[derive(Clone)]
pub struct CertificateProbe {
    connector: SslConnector,
    timeout: Duration,
    port: u16,
}

impl CertificateProbe {
    /// Builds a probe trusting the system store and, if configured, the
    /// certificates in `config.ca_file`.
    pub fn new(config: &ProbeConfig) -> Result<Self, ProbeError> {
        let mut builder = SslConnector::builder(SslMethod::tls())?;
        if let Some(ca_file) = &config.ca_file {
            builder.set_ca_file(ca_file)?;
        }
        Ok(CertificateProbe {
            connector: builder.build(),
            timeout: config.timeout,
            port: config.port,
        })
    }

    /// Performs a single connection attempt to `server` and classifies it.
    ///
    /// Never fails: every error becomes part of the returned outcome.
    pub fn probe(&self, server: &str) -> ProbeResult {
        let started = Instant::now();
        let outcome = match self.check(server) {
            Ok(not_after) => Outcome::Valid { not_after },
            Err(err) => err.into_outcome(),
        };
        debug!(server, elapsed = ?started.elapsed(), ?outcome, "probe finished");
        ProbeResult {
            server: server.to_string(),
            outcome,
        }
    }

    fn check(&self, server: &str) -> Result<DateTime<Utc>, ProbeError> {
        let deadline = Instant::now() + self.timeout;
        let address = dial_address(server, self.port);
        let tcp = self.dial(&address, deadline)?;
        let tcp = DeadlineStream::new(tcp, deadline);

        // Verification still runs with VERIFY_NONE; its result is read back
        // below so that a mismatch is reported apart from handshake errors.
        let mut configuration = self.connector.configure()?;
        configuration.set_verify(SslVerifyMode::NONE);
        let stream = match configuration.connect(server, tcp) {
            Ok(stream) => stream,
            Err(HandshakeError::WouldBlock(_)) => return Err(self.timed_out(&address)),
            Err(HandshakeError::Failure(mid)) if is_timeout(mid.error().io_error()) => {
                return Err(self.timed_out(&address));
            }
            Err(err) => return Err(err.into()),
        };
        debug!(server, version = stream.ssl().version_str(), "handshake done");

        let verify = stream.ssl().verify_result();
        if verify != X509VerifyResult::OK {
            return Err(ProbeError::Verification {
                reason: verify.error_string().to_string(),
            });
        }

        let leaf = stream
            .ssl()
            .peer_certificate()
            .ok_or(ProbeError::NoPeerCertificate)?;
        asn1_to_utc(leaf.not_after())
    }

    fn dial(&self, address: &str, deadline: Instant) -> Result<TcpStream, ProbeError> {
        let target = address.to_string();
        let lookup = move || -> io::Result<Vec<SocketAddr>> {
            Ok(target.to_socket_addrs()?.collect())
        };
        let addrs = match lookup_within(lookup, deadline) {
            Some(Ok(addrs)) => addrs,
            Some(Err(source)) => {
                return Err(ProbeError::DnsResolution {
                    address: address.to_string(),
                    source,
                })
            }
            None => return Err(self.timed_out(address)),
        };
        if addrs.is_empty() {
            return Err(ProbeError::DnsResolution {
                address: address.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such host"),
            });
        }

        let mut last_error = None;
        for addr in addrs {
            let remaining = match remaining(deadline) {
                Some(remaining) => remaining,
                None => break,
            };
            debug!(%addr, ?remaining, "connecting");
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => return Ok(stream),
                Err(source) if is_timeout(Some(&source)) => {
                    last_error = Some(self.timed_out(address));
                }
                Err(source) => {
                    last_error = Some(ProbeError::ConnectionFailed {
                        address: addr.to_string(),
                        source,
                    });
                }
            }
        }
        Err(last_error.unwrap_or_else(|| self.timed_out(address)))
    }

    fn timed_out(&self, address: &str) -> ProbeError {
        ProbeError::Timeout {
            address: address.to_string(),
            after: self.timeout,
        }
    }
}

/// Probes a single server with a one-off [`CertificateProbe`].
///
/// Setup failures are reported as [`Outcome::ConnectionFailed`].
pub fn probe(server: &str, config: &ProbeConfig) -> ProbeResult {
    match CertificateProbe::new(config) {
        Ok(prober) => prober.probe(server),
        Err(err) => ProbeResult {
            server: server.to_string(),
            outcome: err.into_outcome(),
        },
    }
}

/// Converts an ASN.1 time into a UTC timestamp.
pub fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>, ProbeError> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(secs, 0).ok_or_else(|| ProbeError::CertificateError {
        reason: format!("expiry out of range: {}", time),
    })
}

/// Runs a blocking name lookup on a helper thread and waits for it until
/// `deadline`. `None` means the deadline passed first; the helper is left to
/// finish on its own.
fn lookup_within<F>(lookup: F, deadline: Instant) -> Option<io::Result<Vec<SocketAddr>>>
where
    F: FnOnce() -> io::Result<Vec<SocketAddr>> + Send + 'static,
{
    let left = remaining(deadline)?;
    let (sender, receiver) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("resolve".to_string())
        .spawn(move || {
            let _ = sender.send(lookup());
        });
    if let Err(err) = spawned {
        warn!(error = %err, "could not spawn resolver thread");
        return Some(Err(err));
    }

    match receiver.recv_timeout(left) {
        Ok(addrs) => Some(addrs),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Err(io::Error::new(
            io::ErrorKind::Other,
            "resolver exited without an answer",
        ))),
    }
}

/// TCP stream whose reads and writes all share one absolute deadline.
///
/// The socket timeouts are re-armed with the time left before every call, so
/// a peer trickling bytes cannot stretch the handshake past the deadline.
#[derive(Debug)]
struct DeadlineStream {
    inner: TcpStream,
    deadline: Instant,
}

impl DeadlineStream {
    fn new(inner: TcpStream, deadline: Instant) -> Self {
        DeadlineStream { inner, deadline }
    }

    fn time_left(&self) -> io::Result<Duration> {
        remaining(self.deadline)
            .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "dial deadline exceeded"))
    }
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.time_left()?;
        self.inner.set_read_timeout(Some(left))?;
        self.inner.read(buf)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let left = self.time_left()?;
        self.inner.set_write_timeout(Some(left))?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn dial_address(server: &str, port: u16) -> String {
    match server.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, port),
        _ => format!("{}:{}", server, port),
    }
}

fn remaining(deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        None
    } else {
        Some(left)
    }
}

fn is_timeout(err: Option<&io::Error>) -> bool {
    matches!(
        err.map(io::Error::kind),
        Some(io::ErrorKind::TimedOut) | Some(io::ErrorKind::WouldBlock)
    )
}
