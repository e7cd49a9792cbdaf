//! Fan-out of certificate probes.
//!
//! Every name gets its own unit of work; results come back over an `mpsc`
//! channel to the calling thread, which is the only consumer. There is no
//! ordering between results, only a completion barrier: [`ProbeScheduler::run`]
//! returns once a result has been delivered for every name.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, warn};

use crate::{CertificateProbe, ProbeConfig, ProbeError, ProbeResult};

pub struct ProbeScheduler {
    prober: CertificateProbe,
    concurrency: Option<usize>,
}

impl ProbeScheduler {
    /// `concurrency` of `None` or `Some(0)` spawns one thread per name.
    pub fn new(prober: CertificateProbe, concurrency: Option<usize>) -> Self {
        ProbeScheduler {
            prober,
            concurrency: concurrency.filter(|limit| *limit > 0),
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Result<Self, ProbeError> {
        Ok(Self::new(CertificateProbe::new(config)?, config.concurrency))
    }

    /// Probes every name and hands each result to `sink` as soon as it
    /// arrives. Returns the number of results delivered.
    pub fn run<F>(&self, names: Vec<String>, mut sink: F) -> usize
    where
        F: FnMut(ProbeResult),
    {
        let expected = names.len();
        if expected == 0 {
            return 0;
        }

        let (sender, receiver): (Sender<ProbeResult>, Receiver<ProbeResult>) = mpsc::channel();
        let mut delivered = match self.concurrency {
            Some(limit) => self.spawn_pool(names, limit, &sender, &mut sink),
            None => self.spawn_per_name(names, &sender, &mut sink),
        };
        // Only the workers' senders remain, so the receive loop also ends if
        // a worker dies without reporting.
        drop(sender);

        for result in receiver.iter().take(expected - delivered) {
            sink(result);
            delivered += 1;
        }

        if delivered != expected {
            warn!(expected, delivered, "some probes did not report a result");
        }
        debug!(delivered, "all probes completed");
        delivered
    }

    /// Convenience wrapper collecting results in completion order.
    pub fn collect(&self, names: Vec<String>) -> Vec<ProbeResult> {
        let mut results = Vec::with_capacity(names.len());
        self.run(names, |result| results.push(result));
        results
    }

    fn spawn_per_name<F>(
        &self,
        names: Vec<String>,
        sender: &Sender<ProbeResult>,
        sink: &mut F,
    ) -> usize
    where
        F: FnMut(ProbeResult),
    {
        let mut inline = 0;
        for (index, name) in names.into_iter().enumerate() {
            let thread_tx = sender.clone();
            let prober = self.prober.clone();
            let server = name.clone();
            let spawned = thread::Builder::new()
                .name(format!("probe-{}", index))
                .spawn(move || {
                    let _ = thread_tx.send(prober.probe(&name));
                });
            if let Err(err) = spawned {
                warn!(server = %server, error = %err, "could not spawn probe thread, probing inline");
                sink(self.prober.probe(&server));
                inline += 1;
            }
        }
        inline
    }

    fn spawn_pool<F>(
        &self,
        names: Vec<String>,
        limit: usize,
        sender: &Sender<ProbeResult>,
        sink: &mut F,
    ) -> usize
    where
        F: FnMut(ProbeResult),
    {
        let workers = limit.min(names.len());
        let queue = Arc::new(Mutex::new(names.into_iter()));
        let mut spawned = 0;

        for id in 0..workers {
            let thread_tx = sender.clone();
            let prober = self.prober.clone();
            let queue = Arc::clone(&queue);
            let result = thread::Builder::new()
                .name(format!("probe-worker-{}", id))
                .spawn(move || loop {
                    let next = queue.lock().ok().and_then(|mut names| names.next());
                    let Some(name) = next else { break };
                    if thread_tx.send(prober.probe(&name)).is_err() {
                        break;
                    }
                });
            match result {
                Ok(_) => spawned += 1,
                Err(err) => warn!(worker = id, error = %err, "could not spawn probe worker"),
            }
        }
        debug!(workers = spawned, "probe pool started");

        let mut inline = 0;
        if spawned == 0 {
            let remaining: Vec<String> = match queue.lock() {
                Ok(mut names) => names.by_ref().collect(),
                Err(_) => Vec::new(),
            };
            for name in remaining {
                sink(self.prober.probe(&name));
                inline += 1;
            }
        }
        inline
    }
}

/// Probes `names` with a scheduler built from `config`, delivering results to
/// `sink`. Returns the number of results delivered.
pub fn probe_all<F>(names: Vec<String>, config: &ProbeConfig, sink: F) -> Result<usize, ProbeError>
where
    F: FnMut(ProbeResult),
{
    Ok(ProbeScheduler::from_config(config)?.run(names, sink))
}
