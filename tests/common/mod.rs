//! Local TLS servers with throwaway certificates.

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslAcceptor, SslMethod};
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509NameBuilder, X509};
use std::io::Write;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use tempfile::NamedTempFile;

/// 2030-01-01T00:00:00Z
pub const NOT_AFTER_2030: i64 = 1_893_456_000;

/// Self-signed certificate for `dns_name`, valid between the two unix times.
pub fn self_signed(dns_name: &str, not_before: i64, not_after: i64) -> (X509, PKey<Private>) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, dns_name).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(not_before).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(not_after).unwrap())
        .unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    let san = SubjectAlternativeName::new()
        .dns(dns_name)
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(san).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

/// Certificate for `dns_name` issued yesterday and expiring 2030-01-01.
pub fn current_cert(dns_name: &str) -> (X509, PKey<Private>) {
    let yesterday = chrono::Utc::now().timestamp() - 86_400;
    self_signed(dns_name, yesterday, NOT_AFTER_2030)
}

/// PEM file holding `cert`, for use as an extra trust root.
pub fn ca_file(cert: &X509) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&cert.to_pem().unwrap()).unwrap();
    file.flush().unwrap();
    file
}

/// Starts a TLS server on 127.0.0.1 presenting `cert` and returns its port.
/// Every connection is handled on its own thread until the test exits.
pub fn spawn_tls_server(cert: &X509, key: &PKey<Private>) -> u16 {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    acceptor.set_private_key(key).unwrap();
    acceptor.set_certificate(cert).unwrap();
    acceptor.check_private_key().unwrap();
    let acceptor = Arc::new(acceptor.build());

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let acceptor = Arc::clone(&acceptor);
            thread::spawn(move || {
                if let Ok(mut tls) = acceptor.accept(stream) {
                    let _ = tls.shutdown();
                }
            });
        }
    });
    port
}

/// A port on 127.0.0.1 with nothing listening.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
