//! Integration tests for the public API

use certprobe::config::{Config, ConfigError};
use certprobe::names::{self, InputError};
use certprobe::report::{OutputFormat, Reporter};
use certprobe::{Outcome, ProbeConfig, ProbeError, ProbeResult};
use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_probe_all_on_closed_port() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ProbeConfig {
        timeout: Duration::from_secs(2),
        port,
        ..ProbeConfig::default()
    };

    let mut results = Vec::new();
    let delivered =
        certprobe::scheduler::probe_all(vec!["127.0.0.1".to_string()], &config, |result| {
            results.push(result)
        })
        .unwrap();

    assert_eq!(delivered, 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].server, "127.0.0.1");
    match &results[0].outcome {
        Outcome::ConnectionFailed { reason } => {
            assert!(reason.to_lowercase().contains("connection refused"), "{}", reason)
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_error_types_are_public() {
    fn describe(err: ProbeError) -> String {
        match err {
            ProbeError::DnsResolution { address, .. } => format!("DNS failed for {}", address),
            ProbeError::ConnectionFailed { address, .. } => format!("Connection failed to {}", address),
            ProbeError::Timeout { address, .. } => format!("Timeout: {}", address),
            ProbeError::HandshakeFailed { details } => format!("Handshake failed: {}", details),
            ProbeError::Verification { reason } => format!("Verification: {}", reason),
            ProbeError::NoPeerCertificate => "No certificate".to_string(),
            ProbeError::CertificateError { reason } => format!("Certificate error: {}", reason),
            ProbeError::OpenSSLError { details } => format!("OpenSSL error: {}", details),
            ProbeError::IoError { source } => format!("I/O error: {}", source),
        }
    }

    let msg = describe(ProbeError::HandshakeFailed {
        details: "test reason".to_string(),
    });
    assert!(msg.contains("test reason"));
}

#[test]
fn test_domain_file_to_report() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "# servers\nlong-name.example.com\n\nshort.io extra").unwrap();

    let names = names::gather(Some(file.path()), &["cli.example".to_string()]).unwrap();
    assert_eq!(names, vec!["long-name.example.com", "short.io", "cli.example"]);
    let width = names::column_width(&names);
    assert_eq!(width, 21);

    let mut reporter = Reporter::new(Vec::new(), OutputFormat::Script, width);
    reporter.begin().unwrap();
    for name in &names {
        reporter
            .record(ProbeResult {
                server: name.clone(),
                outcome: Outcome::ConnectionFailed {
                    reason: "no route".to_string(),
                },
            })
            .unwrap();
    }
    let (out, summary) = reporter.finish().unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(summary.connection_failed, 3);
    assert!(text.contains("             short.io error 1970-01-01 (no route)"));
    assert_eq!(text.lines().count(), 3);
}

#[test]
fn test_missing_domain_file_is_input_error() {
    let result = names::from_file("/nonexistent/certprobe/domains.txt");
    assert!(matches!(result, Err(InputError::Open { .. })));
}

#[test]
fn test_config_error_display() {
    let err = ConfigError::Validation("port cannot be 0".to_string());
    assert_eq!(err.to_string(), "Validation Error: port cannot be 0");

    let err = Config {
        port: Some(0),
        ..Config::default()
    }
    .resolve()
    .unwrap_err();
    assert!(err.to_string().contains("port"));
}
