//! Error types for a single certificate probe.
//!
//! A [`ProbeError`] never escapes the probe: it is classified into an
//! [`Outcome`](crate::Outcome) so that one failing server cannot affect any
//! other.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::Outcome;

/// Everything that can go wrong while dialing and verifying one server.
#[derive(Debug)]
pub enum ProbeError {
    /// DNS resolution failed or returned no address
    DnsResolution {
        /// The `host:port` that failed to resolve
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TCP connection failed to the target address
    ConnectionFailed {
        /// The socket address that connection failed to
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// Connect or handshake did not finish within the configured window
    Timeout {
        /// The `host:port` being dialed
        address: String,
        /// The configured timeout
        after: Duration,
    },

    /// TLS handshake failed
    HandshakeFailed {
        /// Details about why the handshake failed
        details: String,
    },

    /// Handshake succeeded but the chain is not valid for the server name
    Verification {
        /// The verifier's error description
        reason: String,
    },

    /// Handshake and verification succeeded without any peer certificate
    NoPeerCertificate,

    /// The peer certificate could not be interpreted
    CertificateError {
        /// Description of what went wrong
        reason: String,
    },

    /// OpenSSL error while setting up the connection
    OpenSSLError {
        /// The underlying OpenSSL error
        details: String,
    },

    /// Generic I/O error
    IoError {
        /// The underlying I/O error
        source: io::Error,
    },
}

impl ProbeError {
    /// Maps the error onto the report outcome.
    pub fn into_outcome(self) -> Outcome {
        match self {
            Self::Verification { reason } => Outcome::VerificationFailed { reason },
            other => Outcome::ConnectionFailed {
                reason: other.to_string(),
            },
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DnsResolution { address, source } => {
                write!(f, "lookup {}: {}", address, source)
            }
            Self::ConnectionFailed { address, source } => {
                write!(f, "dial tcp {}: {}", address, source)
            }
            Self::Timeout { address, after } => {
                write!(f, "dial tcp {}: i/o timeout after {:?}", address, after)
            }
            Self::HandshakeFailed { details } => {
                write!(f, "tls handshake failed: {}", details)
            }
            Self::Verification { reason } => write!(f, "{}", reason),
            Self::NoPeerCertificate => write!(f, "no peer certificates"),
            Self::CertificateError { reason } => {
                write!(f, "certificate error: {}", reason)
            }
            Self::OpenSSLError { details } => {
                write!(f, "openssl error: {}", details)
            }
            Self::IoError { source } => write!(f, "i/o error: {}", source),
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DnsResolution { source, .. } => Some(source),
            Self::ConnectionFailed { source, .. } => Some(source),
            Self::IoError { source } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for ProbeError {
    fn from(e: io::Error) -> Self {
        Self::IoError { source: e }
    }
}

impl From<openssl::error::ErrorStack> for ProbeError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::OpenSSLError {
            details: e.to_string(),
        }
    }
}

impl<S: fmt::Debug> From<openssl::ssl::HandshakeError<S>> for ProbeError {
    fn from(e: openssl::ssl::HandshakeError<S>) -> Self {
        Self::HandshakeFailed {
            details: format!("{}", e),
        }
    }
}
