use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{labels, register_gauge, Gauge};
use tracing::{debug, warn};

use certprobe::{Outcome, ProbeResult};

lazy_static! {
    static ref CERTPROBE_DAYS_BEFORE_EXPIRY: Gauge = register_gauge!(
        "certprobe_days_before_expiry",
        "days before the leaf certificate expires"
    )
    .unwrap();
    static ref CERTPROBE_PROBE_SUCCESS: Gauge = register_gauge!(
        "certprobe_probe_success",
        "1 when the certificate verified for the server name"
    )
    .unwrap();
}

/// Pushes one group of gauges per probed server.
/// # Arguments
/// * `results` - Results of the run
/// * `prometheus_address` - Push gateway base address
/// * `now` - Reference instant for the days-before-expiry gauge
pub fn prometheus_metrics(results: &[ProbeResult], prometheus_address: &str, now: DateTime<Utc>) {
    for result in results {
        let (days, success, status) = match &result.outcome {
            Outcome::Valid { not_after } => ((*not_after - now).num_days() as f64, 1.0, "valid"),
            Outcome::VerificationFailed { .. } => (0.0, 0.0, "verification_failed"),
            Outcome::ConnectionFailed { .. } => (0.0, 0.0, "connection_failed"),
        };
        CERTPROBE_DAYS_BEFORE_EXPIRY.set(days);
        CERTPROBE_PROBE_SUCCESS.set(success);

        let metric_families = prometheus::gather();
        let pushed = prometheus::push_metrics(
            "certprobe",
            labels! {
                "instance".to_owned() => "certprobe".to_owned(),
                "server".to_owned() => result.server.to_owned(),
                "status".to_owned() => status.to_owned(),
            },
            prometheus_address,
            metric_families,
            None,
        );

        match pushed {
            Ok(_) => debug!(server = %result.server, "metrics pushed"),
            Err(e) => warn!(server = %result.server, error = %e, "failed to push metrics to prometheus"),
        }
    }
}
