use std::sync::{Arc, Once};

use strata_catalog::Catalog;
use strata_transaction::TxnManager;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("strata_catalog=debug,strata_transaction=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

/// A catalog wired into a fresh transaction manager.
pub fn setup() -> (Arc<Catalog>, Arc<TxnManager>) {
    init_tracing();
    let catalog = Arc::new(Catalog::new("/data"));
    let manager = Arc::new(TxnManager::new());
    manager.register_participant(catalog.clone());
    (catalog, manager)
}
