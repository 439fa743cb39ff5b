use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::engine::Engine;
use crate::limits::*;
use crate::model::Ms;
use crate::notify::NotifyHub;
use crate::reaper;

/// Manages per-tenant engines. Each tenant gets its own Engine + WAL + sweeper.
/// Tenant = database name from the pgwire connection (one per campus).
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    retention_ms: Ms,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, retention_ms: Ms) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            retention_ms,
        }
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Sanitize tenant name to prevent path traversal
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(wal_path, notify)?);

        // Spawn sweeper + compactor for this tenant
        let sweeper_engine = engine.clone();
        let retention = self.retention_ms;
        tokio::spawn(async move {
            reaper::run_sweeper(sweeper_engine, retention).await;
        });
        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            reaper::run_compactor(compactor_engine, threshold).await;
        });

        self.engines.insert(tenant.to_string(), engine.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use ulid::Ulid;

    use super::*;
    use crate::model::Span;

    const WEEK_MS: Ms = 604_800_000;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("aula_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    async fn propose(engine: &Engine, venue: &str, start: Ms, end: Ms) -> Ulid {
        engine
            .propose_reservation(
                Ulid::new(),
                venue,
                Span::new(start, end),
                "registrar",
                HashMap::new(),
                None,
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let dir = test_data_dir("isolation");
        let tm = TenantManager::new(dir, 1000, WEEK_MS);

        let eng_a = tm.get_or_create("north_campus").unwrap();
        let eng_b = tm.get_or_create("south_campus").unwrap();

        // Same venue name and span in both tenants — no cross-tenant conflict
        propose(&eng_a, "Main Hall", 0, 10_000).await;
        propose(&eng_b, "Main Hall", 0, 10_000).await;

        assert_eq!(eng_a.list_reservations("Main Hall", None).await.unwrap().len(), 1);
        assert_eq!(eng_b.list_reservations("Main Hall", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tenant_lazy_creation() {
        let dir = test_data_dir("lazy");
        let tm = TenantManager::new(dir.clone(), 1000, WEEK_MS);

        // No WAL files should exist yet
        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert!(entries.is_empty());

        // Create a tenant
        let _eng = tm.get_or_create("my_campus").unwrap();

        // WAL file should now exist
        assert!(dir.join("my_campus.wal").exists());
    }

    #[tokio::test]
    async fn tenant_same_engine_returned() {
        let dir = test_data_dir("same_eng");
        let tm = TenantManager::new(dir, 1000, WEEK_MS);

        let eng1 = tm.get_or_create("foo").unwrap();
        let eng2 = tm.get_or_create("foo").unwrap();

        // Should be the same Arc
        assert!(Arc::ptr_eq(&eng1, &eng2));
    }

    #[tokio::test]
    async fn tenant_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let tm = TenantManager::new(dir.clone(), 1000, WEEK_MS);

        // Path traversal attempt
        let _eng = tm.get_or_create("../evil").unwrap();
        // Should create "evil.wal", not "../evil.wal"
        assert!(dir.join("evil.wal").exists());

        // Empty after sanitization
        let result = tm.get_or_create("../..");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tenant_name_too_long() {
        let dir = test_data_dir("name_too_long");
        let tm = TenantManager::new(dir, 1000, WEEK_MS);

        let long_name = "x".repeat(MAX_TENANT_NAME_LEN + 1);
        let result = tm.get_or_create(&long_name);
        assert!(result.is_err());
        let err = result.err().unwrap();
        assert!(err.to_string().contains("tenant name too long"));
    }

    #[tokio::test]
    async fn tenant_count_limit() {
        let dir = test_data_dir("count_limit");
        let tm = TenantManager::new(dir, 1000, WEEK_MS);

        for i in 0..MAX_TENANTS {
            tm.get_or_create(&format!("t{i}")).unwrap();
        }
        let result = tm.get_or_create("one_more");
        assert!(result.is_err());
        let err = result.err().unwrap();
        assert!(err.to_string().contains("too many tenants"));
    }
}
