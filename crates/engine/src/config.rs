//! Runtime configuration from the environment.

use std::time::Duration;

/// Engine runtime knobs.
///
/// Every value has a production-safe default; unset or malformed
/// variables log a warning and fall back rather than abort startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Soft reservation lifetime (`CURIO_RESERVATION_TTL_SECS`).
    pub reservation_ttl: Duration,
    /// Cart sweep cadence (`CURIO_SWEEP_INTERVAL_SECS`).
    pub sweep_interval: Duration,
    /// Reconciliation cycle cadence (`CURIO_RECONCILE_INTERVAL_SECS`).
    pub reconcile_interval: Duration,
    /// Items examined per reconciliation cycle (`CURIO_RECONCILE_BATCH`).
    pub reconcile_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::from_secs(900),
            sweep_interval: Duration::from_secs(60),
            reconcile_interval: Duration::from_secs(300),
            reconcile_batch: 100,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reservation_ttl: Duration::from_secs(env_u64(
                "CURIO_RESERVATION_TTL_SECS",
                defaults.reservation_ttl.as_secs(),
            )),
            sweep_interval: Duration::from_secs(env_u64(
                "CURIO_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )),
            reconcile_interval: Duration::from_secs(env_u64(
                "CURIO_RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval.as_secs(),
            )),
            reconcile_batch: env_u64("CURIO_RECONCILE_BATCH", defaults.reconcile_batch as u64)
                as usize,
        }
    }

    /// Lock TTL for the reconciliation mutex: twice the cycle cadence,
    /// so a crashed holder is displaced after one missed cycle.
    pub fn reconcile_lock_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds((self.reconcile_interval.as_secs() as i64).saturating_mul(2))
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(0) => {
                tracing::warn!(var = name, "zero is not a usable value; using default {default}");
                default
            }
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(var = name, value = %raw, "unparseable value; using default {default}");
                default
            }
        },
        Err(_) => default,
    }
}
