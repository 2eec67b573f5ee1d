use std::sync::Arc;

use curio_engine::{Engine, EngineConfig};
use curio_reconcile::{InMemoryLedger, LedgerClient};

fn main() -> anyhow::Result<()> {
    curio_observability::init();

    let config = EngineConfig::from_env();
    tracing::info!(
        reservation_ttl_secs = config.reservation_ttl.as_secs(),
        sweep_interval_secs = config.sweep_interval.as_secs(),
        reconcile_interval_secs = config.reconcile_interval.as_secs(),
        reconcile_batch = config.reconcile_batch,
        "engine starting"
    );

    // In-memory Ledger until a real warehouse integration is wired in.
    let ledger: Arc<dyn LedgerClient> = Arc::new(InMemoryLedger::new());
    let engine = Engine::in_memory(config, ledger);
    let workers = engine.start_workers();

    tracing::info!("engine running; workers active");
    loop {
        std::thread::park();
        // Unparked spuriously; nothing to do but keep the workers
        // alive.
        let _ = &workers;
    }
}
