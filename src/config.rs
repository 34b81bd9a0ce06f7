use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::models::BackendKind;

pub const DEFAULT_REPORTS_DIR: &str = "data/reports";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Filesystem { base_dir: PathBuf },
    Postgres { url: String, max_connections: u32 },
}

impl StorageConfig {
    /// Build from the raw settings; the backend kind decides which of the rest is required.
    pub fn from_settings(
        backend: BackendKind,
        reports_dir: Option<PathBuf>,
        database_url: Option<String>,
    ) -> Result<Self> {
        match backend {
            BackendKind::Fs => Ok(StorageConfig::Filesystem {
                base_dir: reports_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_REPORTS_DIR)),
            }),
            BackendKind::Postgres => {
                let url = database_url
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| {
                        Error::Config("DATABASE_URL must be set for the postgres backend".to_string())
                    })?;
                Ok(StorageConfig::Postgres {
                    url,
                    max_connections: DEFAULT_MAX_CONNECTIONS,
                })
            }
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            StorageConfig::Filesystem { .. } => BackendKind::Fs,
            StorageConfig::Postgres { .. } => BackendKind::Postgres,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_defaults_its_directory() {
        let config = StorageConfig::from_settings(BackendKind::Fs, None, None).unwrap();
        assert_eq!(
            config,
            StorageConfig::Filesystem {
                base_dir: PathBuf::from(DEFAULT_REPORTS_DIR)
            }
        );
    }

    #[test]
    fn postgres_requires_a_url() {
        assert!(matches!(
            StorageConfig::from_settings(BackendKind::Postgres, None, Some("  ".to_string())),
            Err(Error::Config(_))
        ));

        let config = StorageConfig::from_settings(
            BackendKind::Postgres,
            None,
            Some("postgres://localhost/reports".to_string()),
        )
        .unwrap();
        assert_eq!(config.backend(), BackendKind::Postgres);
    }
}
