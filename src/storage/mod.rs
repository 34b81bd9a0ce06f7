use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StorageConfig;
use crate::error::Result;
use crate::models::{IdentityKey, Report, ReportFilter, ReportPayload, StorageInfo, Upserted};

pub mod fs;
pub mod postgres;

pub use fs::FileStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Create or fully overwrite the report for `key`.
    async fn upsert_report(&self, key: &IdentityKey, payload: ReportPayload) -> Result<Upserted>;

    /// `Ok(None)` when nothing is stored for `key`.
    async fn get_report(&self, key: &IdentityKey) -> Result<Option<Report>>;

    /// Reports matching every field set in `filter`, in listing order.
    async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>>;

    fn info(&self) -> StorageInfo;
}

/// Open the backend named by `config`, creating directories or schema as needed.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn ReportStore>> {
    match config {
        StorageConfig::Filesystem { base_dir } => {
            let store = FileStore::create(base_dir.clone()).await?;
            Ok(Arc::new(store))
        }
        StorageConfig::Postgres {
            url,
            max_connections,
        } => {
            let store = PgStore::connect(url, *max_connections).await?;
            store.init_db().await?;
            Ok(Arc::new(store))
        }
    }
}
