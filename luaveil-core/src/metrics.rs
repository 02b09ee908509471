use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Job lifecycle counters, exported by the health server.
pub struct Metrics {
    registry: Registry,
    pub jobs_started: IntCounter,
    pub jobs_delivered: IntCounter,
    pub jobs_rejected: IntCounter,
    pub jobs_failed: IntCounter,
    pub validations_run: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let jobs_started = IntCounter::new("jobs_started", "Jobs accepted for processing").unwrap();
        let jobs_delivered =
            IntCounter::new("jobs_delivered", "Jobs that delivered an artifact").unwrap();
        let jobs_rejected =
            IntCounter::new("jobs_rejected", "Jobs rejected before obfuscation").unwrap();
        let jobs_failed = IntCounter::new("jobs_failed", "Jobs failed during obfuscation").unwrap();
        let validations_run = IntCounter::new("validations_run", "Linter invocations").unwrap();
        for counter in [
            &jobs_started,
            &jobs_delivered,
            &jobs_rejected,
            &jobs_failed,
            &validations_run,
        ] {
            registry.register(Box::new(counter.clone())).unwrap();
        }
        Self {
            registry,
            jobs_started,
            jobs_delivered,
            jobs_rejected,
            jobs_failed,
            validations_run,
        }
    }

    /// Text exposition format for the `/metrics` route.
    pub fn export(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
