mod metrics;

use chrono::Utc;
use clap::{CommandFactory, Parser};
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process::exit;
use tracing::info;
use tracing_subscriber::EnvFilter;

use certprobe::config::{Config, PrometheusConfig};
use certprobe::names;
use certprobe::report::Reporter;
use certprobe::scheduler::ProbeScheduler;
use certprobe::ProbeResult;

/// Check the TLS certificates of https sites
#[derive(Parser, Debug)]
#[command(name = "certprobe", author, about, disable_version_flag = true)]
struct Cli {
    /// Server names to check
    #[arg(value_name = "NAME")]
    names: Vec<String>,

    /// Read server names from FILE, one per line
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Produce less verbose, script friendly output
    #[arg(short = 's', long, conflicts_with = "output")]
    script: bool,

    /// Output format: verbose, script, json or table
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Dial timeout in seconds
    #[arg(short = 't', long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Port to connect to
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Additional PEM file with trusted root certificates
    #[arg(long, value_name = "FILE")]
    ca_file: Option<PathBuf>,

    /// Maximum number of concurrent probes (0 = one per server)
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Load settings from a TOML file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long)]
    generate_config: bool,

    /// Exit code to use when any server is not valid
    #[arg(long)]
    exit_code: Option<i32>,

    /// Push metrics to a Prometheus Push Gateway
    #[arg(long)]
    prometheus: bool,

    /// Prometheus Push Gateway address
    #[arg(long, value_name = "URL")]
    prometheus_address: Option<String>,

    /// Log probe progress to stderr
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Show tool version
    #[arg(short = 'V', long)]
    version: bool,
}

impl Cli {
    fn to_config(&self) -> Config {
        Config {
            names: if self.names.is_empty() {
                None
            } else {
                Some(self.names.clone())
            },
            domain_file: self.file.clone(),
            output: if self.script {
                Some("script".to_string())
            } else {
                self.output.clone()
            },
            timeout: self.timeout,
            port: self.port,
            ca_file: self.ca_file.clone(),
            concurrency: self.concurrency,
            exit_code: self.exit_code,
            prometheus: Some(PrometheusConfig {
                enabled: self.prometheus.then_some(true),
                address: self.prometheus_address.clone(),
            }),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.version {
        println!("certprobe v{}", env!("CARGO_PKG_VERSION"));
        exit(0);
    }
    if cli.generate_config {
        print!("{}", Config::example_toml());
        exit(0);
    }

    let code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", err);
            1
        }
    };
    exit(code);
}

fn run(cli: &Cli) -> Result<i32, Box<dyn Error>> {
    let mut config = Config::defaults();
    if let Some(path) = &cli.config {
        config = config.merge_with(Config::from_file(path)?);
    }
    let settings = config.merge_with(cli.to_config()).resolve()?;

    if settings.domain_file.is_none() && settings.names.is_empty() {
        eprintln!("{}", Cli::command().render_help());
        return Ok(1);
    }

    let names = names::gather(settings.domain_file.as_deref(), &settings.names)?;
    let width = names::column_width(&names);
    let scheduler = ProbeScheduler::from_config(&settings.probe)?;
    info!(servers = names.len(), timeout = ?settings.probe.timeout, "probing");

    let stdout = io::stdout();
    let mut reporter = Reporter::new(stdout.lock(), settings.output, width);
    reporter.begin()?;

    let keep_results = settings.prometheus.is_some();
    let mut results: Vec<ProbeResult> = Vec::new();
    let mut write_error: Option<io::Error> = None;
    scheduler.run(names, |result| {
        if keep_results {
            results.push(result.clone());
        }
        if write_error.is_none() {
            if let Err(err) = reporter.record(result) {
                write_error = Some(err);
            }
        }
    });
    if let Some(err) = write_error {
        return Err(err.into());
    }
    let (_, summary) = reporter.finish()?;
    info!(
        valid = summary.valid,
        verification_failed = summary.verification_failed,
        connection_failed = summary.connection_failed,
        "done"
    );

    if let Some(address) = &settings.prometheus {
        metrics::prom::prometheus_metrics(&results, address, Utc::now());
    }

    Ok(if summary.all_valid() {
        0
    } else {
        settings.exit_code
    })
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_script_flag_selects_script_output() {
        let cli = Cli::parse_from(["certprobe", "-s", "-f", "domains.txt", "example.com"]);
        let config = cli.to_config();

        assert_eq!(config.output, Some("script".to_string()));
        assert_eq!(config.domain_file, Some(PathBuf::from("domains.txt")));
        assert_eq!(config.names, Some(vec!["example.com".to_string()]));
    }

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = Cli::parse_from(["certprobe", "-t", "2", "-c", "4", "--exit-code", "3", "a.com"]);
        let settings = Config::defaults().merge_with(cli.to_config()).resolve().unwrap();

        assert_eq!(settings.probe.timeout.as_secs(), 2);
        assert_eq!(settings.probe.concurrency, Some(4));
        assert_eq!(settings.exit_code, 3);
        assert_eq!(settings.prometheus, None);
    }

    #[test]
    fn test_script_conflicts_with_output() {
        assert!(Cli::try_parse_from(["certprobe", "-s", "-o", "json", "a.com"]).is_err());
    }

    #[test]
    fn test_missing_domain_file_fails_before_probing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("domains.txt");
        let cli = Cli::parse_from(["certprobe", "-f", missing.to_str().unwrap()]);

        let err = run(&cli).unwrap_err();
        assert!(err.to_string().contains("domains.txt"));
    }
}
