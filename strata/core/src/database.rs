use std::sync::Arc;

use strata_catalog::{Catalog, CatalogDocument};
use strata_transaction::{Timestamp, TxnContext, TxnError, TxnId, TxnManager};
use tracing::{debug, info, warn};

use crate::error::Result;

pub const DEFAULT_BASE_DIR: &str = "/var/strata/data";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Directory under which database and table locations are derived.
    pub base_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            base_dir: DEFAULT_BASE_DIR.to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn with_base_dir(mut self, base_dir: impl Into<String>) -> Self {
        self.base_dir = base_dir.into();
        self
    }
}

pub struct Database {
    config: DatabaseConfig,
    txn_manager: Arc<TxnManager>,
    catalog: Arc<Catalog>,
}

impl Database {
    pub fn open_in_memory(config: &DatabaseConfig) -> Result<Self> {
        let catalog = Catalog::new(config.base_dir.clone());
        Ok(Self::assemble(config, catalog, TxnManager::new()))
    }

    /// Rebuilds a database from a checkpoint produced by [`Self::checkpoint`].
    ///
    /// Versions that were not committed when the checkpoint was taken are
    /// discarded. New transactions get ids and timestamps above every value
    /// found in the checkpoint.
    pub fn restore(config: &DatabaseConfig, json: &str) -> Result<Self> {
        let doc = CatalogDocument::from_json(json)?;
        if doc.base_dir != config.base_dir {
            warn!(
                checkpoint_base_dir = %doc.base_dir,
                config_base_dir = %config.base_dir,
                "database.restore.base_dir_mismatch"
            );
        }
        let txn_manager = TxnManager::new();
        txn_manager.observe(doc.max_txn_id(), doc.max_ts())?;
        let catalog = Catalog::from_document(&doc)?;
        info!(
            databases = doc.databases.len(),
            max_txn_id = doc.max_txn_id().raw(),
            max_ts = doc.max_ts().raw(),
            "database.restore"
        );
        Ok(Self::assemble(config, catalog, txn_manager))
    }

    fn assemble(config: &DatabaseConfig, catalog: Catalog, txn_manager: TxnManager) -> Self {
        let catalog = Arc::new(catalog);
        let txn_manager = Arc::new(txn_manager);
        txn_manager.register_participant(catalog.clone());
        info!(base_dir = %config.base_dir, "database.open");
        Self {
            config: config.clone(),
            txn_manager,
            catalog,
        }
    }

    #[inline]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    #[inline]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    #[inline]
    pub fn txn_manager(&self) -> &Arc<TxnManager> {
        &self.txn_manager
    }

    pub fn begin(&self) -> Result<Arc<TxnContext>> {
        Ok(self.txn_manager.begin()?)
    }

    /// Looks up an active transaction by id.
    pub fn transaction(&self, txn_id: TxnId) -> Result<Arc<TxnContext>> {
        Ok(self
            .txn_manager
            .get(txn_id)
            .ok_or(TxnError::TransactionNotFound(txn_id))?)
    }

    pub fn commit(&self, txn: &TxnContext) -> Result<Timestamp> {
        Ok(self.txn_manager.commit(txn)?)
    }

    pub fn rollback(&self, txn: &TxnContext) -> Result<()> {
        Ok(self.txn_manager.rollback(txn)?)
    }

    /// Serializes the whole catalog, version history included.
    pub fn checkpoint(&self) -> Result<String> {
        let json = self.catalog.to_json()?;
        debug!(bytes = json.len(), "database.checkpoint");
        Ok(json)
    }

    /// Purges versions no active or future transaction can read. Returns how
    /// many versions were removed.
    pub fn garbage_collect(&self) -> usize {
        let watermark = self.txn_manager.low_watermark();
        self.catalog.garbage_collect(watermark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.base_dir, DEFAULT_BASE_DIR);
        let config = config.with_base_dir("/tmp/strata");
        assert_eq!(config.base_dir, "/tmp/strata");
    }

    #[test]
    fn test_open_in_memory_uses_base_dir() {
        let config = DatabaseConfig::default().with_base_dir("/srv");
        let db = Database::open_in_memory(&config).unwrap();
        assert_eq!(db.catalog().base_dir(), "/srv");

        let txn = db.begin().unwrap();
        let entry = db.catalog().create_database("sales", &txn).unwrap();
        db.commit(&txn).unwrap();
        assert_eq!(entry.as_database().unwrap().db_dir(), "/srv/sales");
        assert_eq!(db.txn_manager().active_count(), 0);
    }

    #[test]
    fn test_transaction_lookup() {
        let db = Database::open_in_memory(&DatabaseConfig::default()).unwrap();
        let txn = db.begin().unwrap();
        let found = db.transaction(txn.txn_id()).unwrap();
        assert!(Arc::ptr_eq(&found, &txn));

        db.rollback(&txn).unwrap();
        assert!(matches!(
            db.transaction(txn.txn_id()),
            Err(crate::Error::Transaction(TxnError::TransactionNotFound(_)))
        ));
    }
}
