// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Persistence layer (component G of `SPEC_FULL.md`). `sqlx::SqlitePool`
//! behind a thin `Store` struct so the broker and cache crates are
//! storage-agnostic; the logical schema mirrors `spec.md` §3/§6 and is
//! grounded in `examples/original_source/model/model.go`, redesigned so
//! patterns/tags/source-labels key on `instance_id` only (no
//! `binding_id` back-pointers, per `spec.md` §9).
//!
//! Migrations live under `store/migrations` and are applied with
//! `sqlx::migrate!` at startup.

pub mod error;
pub mod models;

pub use error::Error;
common_util::define_result!(Error);

use std::collections::BTreeMap;

use chrono::Utc;
use snafu::{OptionExt, ResultExt};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use models::{BindingRow, DrainType, NewInstanceParam, ResolvedInstanceParam};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connects to the sqlite database at `path` (or `:memory:` for
    /// tests), applies pending migrations and returns the ready store.
    /// Pool sizing follows `db.cnx_max_idle`/`db.cnx_max_open`.
    pub async fn connect(path: &str, max_connections: u32) -> Result<Self> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{path}?mode=rwc")
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await
            .context(error::Connect)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context(error::Migrate)?;
        Ok(Self { pool })
    }

    /// Inserts a fresh `InstanceParam` row at `new.revision` plus its
    /// children, per `spec.md` §3 ("Mutation: none — a new row per
    /// change"). Patterns/tags/source-labels key on `(instance_id,
    /// revision)`, never just `instance_id`, so an older revision stays
    /// fully queryable while a newer one is already live — the
    /// crossfade `spec.md` §4.D's cache key format depends on.
    pub async fn create_instance_param(&self, new: NewInstanceParam) -> Result<()> {
        let mut tx = self.pool.begin().await.context(error::Query)?;

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO instance_params
                (instance_id, revision, org_id, space_id, namespace, plan_name,
                 company_id, use_tls, drain_type, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.instance_id)
        .bind(new.revision)
        .bind(&new.org_id)
        .bind(&new.space_id)
        .bind(&new.namespace)
        .bind(&new.plan_name)
        .bind(&new.company_id)
        .bind(new.use_tls)
        .bind(new.drain_type.as_str())
        .bind(&now)
        .execute(&mut tx)
        .await
        .context(error::Query)?;

        for (position, pattern) in new.patterns.iter().enumerate() {
            sqlx::query(
                "INSERT INTO patterns (instance_id, revision, pattern, position) VALUES (?, ?, ?, ?)",
            )
            .bind(&new.instance_id)
            .bind(new.revision)
            .bind(pattern)
            .bind(position as i64)
            .execute(&mut tx)
            .await
            .context(error::Query)?;
        }
        for (key, value) in &new.tags {
            sqlx::query("INSERT INTO tags (instance_id, revision, key, value) VALUES (?, ?, ?, ?)")
                .bind(&new.instance_id)
                .bind(new.revision)
                .bind(key)
                .bind(value)
                .execute(&mut tx)
                .await
                .context(error::Query)?;
        }
        for (key, value) in &new.source_labels {
            sqlx::query(
                "INSERT INTO source_labels (instance_id, revision, key, value) VALUES (?, ?, ?, ?)",
            )
            .bind(&new.instance_id)
            .bind(new.revision)
            .bind(key)
            .bind(value)
            .execute(&mut tx)
            .await
            .context(error::Query)?;
        }

        tx.commit().await.context(error::Query)?;
        Ok(())
    }

    /// The newest revision recorded for `instance_id`, or `None` if the
    /// instance has never been provisioned.
    pub async fn latest_revision(&self, instance_id: &str) -> Result<Option<i64>> {
        let row = sqlx::query(
            "SELECT MAX(revision) as rev FROM instance_params WHERE instance_id = ?",
        )
        .bind(instance_id)
        .fetch_one(&self.pool)
        .await
        .context(error::Query)?;
        let rev: Option<i64> = row.try_get("rev").context(error::Query)?;
        Ok(rev)
    }

    pub async fn get_instance_param(
        &self,
        instance_id: &str,
        revision: i64,
    ) -> Result<Option<ResolvedInstanceParam>> {
        let row = sqlx::query(
            "SELECT instance_id, revision, org_id, space_id, namespace, plan_name,
                    company_id, use_tls, drain_type
             FROM instance_params WHERE instance_id = ? AND revision = ?",
        )
        .bind(instance_id)
        .bind(revision)
        .fetch_optional(&self.pool)
        .await
        .context(error::Query)?;

        let Some(row) = row else { return Ok(None) };

        let patterns = sqlx::query(
            "SELECT pattern FROM patterns WHERE instance_id = ? AND revision = ? ORDER BY position",
        )
        .bind(instance_id)
        .bind(revision)
        .fetch_all(&self.pool)
        .await
        .context(error::Query)?
        .into_iter()
        .map(|r| r.try_get::<String, _>("pattern"))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context(error::Query)?;

        let tags = fetch_kv(&self.pool, "tags", instance_id, revision).await?;
        let source_labels = fetch_kv(&self.pool, "source_labels", instance_id, revision).await?;

        Ok(Some(ResolvedInstanceParam {
            instance_id: row.try_get("instance_id").context(error::Query)?,
            revision: row.try_get("revision").context(error::Query)?,
            org_id: row.try_get("org_id").context(error::Query)?,
            space_id: row.try_get("space_id").context(error::Query)?,
            namespace: row.try_get("namespace").context(error::Query)?,
            plan_name: row.try_get("plan_name").context(error::Query)?,
            company_id: row.try_get("company_id").context(error::Query)?,
            use_tls: row.try_get("use_tls").context(error::Query)?,
            drain_type: DrainType::from_str(&row.try_get::<String, _>("drain_type").context(error::Query)?),
            patterns,
            tags,
            source_labels,
        }))
    }

    pub async fn get_latest_instance_param(
        &self,
        instance_id: &str,
    ) -> Result<Option<ResolvedInstanceParam>> {
        match self.latest_revision(instance_id).await? {
            Some(rev) => self.get_instance_param(instance_id, rev).await,
            None => Ok(None),
        }
    }

    pub async fn create_binding(&self, binding_id: &str, instance_id: &str, app_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO bindings (binding_id, instance_id, app_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(binding_id)
        .bind(instance_id)
        .bind(app_id)
        .bind(&now)
        .execute(&self.pool)
        .await
        .context(error::Query)?;
        Ok(())
    }

    pub async fn get_binding(&self, binding_id: &str) -> Result<Option<BindingRow>> {
        let row = sqlx::query("SELECT binding_id, instance_id, app_id FROM bindings WHERE binding_id = ?")
            .bind(binding_id)
            .fetch_optional(&self.pool)
            .await
            .context(error::Query)?;
        row.map(|row| {
            Ok(BindingRow {
                binding_id: row.try_get("binding_id").context(error::Query)?,
                instance_id: row.try_get("instance_id").context(error::Query)?,
                app_id: row.try_get("app_id").context(error::Query)?,
            })
        })
        .transpose()
    }

    pub async fn delete_binding(&self, binding_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM bindings WHERE binding_id = ?")
            .bind(binding_id)
            .execute(&self.pool)
            .await
            .context(error::Query)?;
        Ok(())
    }

    /// Deprovision: removes every `Binding`/`InstanceParam` row for
    /// `instance_id`; patterns/tags/source-labels cascade because they
    /// are keyed the same way.
    pub async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.context(error::Query)?;
        sqlx::query("DELETE FROM bindings WHERE instance_id = ?")
            .bind(instance_id)
            .execute(&mut tx)
            .await
            .context(error::Query)?;
        sqlx::query("DELETE FROM instance_params WHERE instance_id = ?")
            .bind(instance_id)
            .execute(&mut tx)
            .await
            .context(error::Query)?;
        sqlx::query("DELETE FROM patterns WHERE instance_id = ?")
            .bind(instance_id)
            .execute(&mut tx)
            .await
            .context(error::Query)?;
        sqlx::query("DELETE FROM tags WHERE instance_id = ?")
            .bind(instance_id)
            .execute(&mut tx)
            .await
            .context(error::Query)?;
        sqlx::query("DELETE FROM source_labels WHERE instance_id = ?")
            .bind(instance_id)
            .execute(&mut tx)
            .await
            .context(error::Query)?;
        tx.commit().await.context(error::Query)?;
        Ok(())
    }

    /// Every binding paired with its instance's newest resolved
    /// `InstanceParam`, used by `cache::MetadataCache::pre_cache`.
    pub async fn list_bindings_with_latest_param(
        &self,
    ) -> Result<Vec<(BindingRow, ResolvedInstanceParam)>> {
        let bindings = sqlx::query("SELECT binding_id, instance_id, app_id FROM bindings")
            .fetch_all(&self.pool)
            .await
            .context(error::Query)?;

        let mut out = Vec::with_capacity(bindings.len());
        for row in bindings {
            let binding = BindingRow {
                binding_id: row.try_get("binding_id").context(error::Query)?,
                instance_id: row.try_get("instance_id").context(error::Query)?,
                app_id: row.try_get("app_id").context(error::Query)?,
            };
            if let Some(param) = self.get_latest_instance_param(&binding.instance_id).await? {
                out.push((binding, param));
            }
        }
        Ok(out)
    }

    /// Whether `binding_id` is still present, used by the cache
    /// cleaner's "evict entries whose binding no longer exists" pass.
    pub async fn binding_exists(&self, binding_id: &str) -> Result<bool> {
        Ok(self.get_binding(binding_id).await?.is_some())
    }
}

async fn fetch_kv(
    pool: &SqlitePool,
    table: &str,
    instance_id: &str,
    revision: i64,
) -> Result<BTreeMap<String, String>> {
    let query = format!("SELECT key, value FROM {table} WHERE instance_id = ? AND revision = ?");
    let rows = sqlx::query(&query)
        .bind(instance_id)
        .bind(revision)
        .fetch_all(pool)
        .await
        .context(error::Query)?;
    let mut map = BTreeMap::new();
    for row in rows {
        let key: String = row.try_get("key").context(error::Query)?;
        let value: String = row.try_get("value").context(error::Query)?;
        map.insert(key, value);
    }
    Ok(map)
}

pub fn instance_not_found(instance_id: &str) -> Error {
    Error::InstanceNotFound {
        instance_id: instance_id.to_string(),
        backtrace: snafu::Backtrace::generate(),
    }
}

pub fn binding_not_found(binding_id: &str) -> Error {
    Error::BindingNotFound {
        binding_id: binding_id.to_string(),
        backtrace: snafu::Backtrace::generate(),
    }
}

pub fn revision_not_found(instance_id: &str, revision: i64) -> Error {
    Error::RevisionNotFound {
        instance_id: instance_id.to_string(),
        revision,
        backtrace: snafu::Backtrace::generate(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::NewInstanceParam;

    async fn memory_store() -> Store {
        Store::connect(":memory:", 1).await.unwrap()
    }

    fn sample_param(instance_id: &str, revision: i64) -> NewInstanceParam {
        NewInstanceParam {
            instance_id: instance_id.to_string(),
            revision,
            org_id: "org-1".into(),
            space_id: "space-1".into(),
            namespace: "".into(),
            plan_name: "loghost".into(),
            company_id: "".into(),
            use_tls: false,
            drain_type: DrainType::Empty,
            patterns: vec!["pattern-a".into()],
            tags: BTreeMap::from([("env".to_string(), "{{.org}}".to_string())]),
            source_labels: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn provision_then_get_instance_round_trips() {
        let store = memory_store().await;
        store.create_instance_param(sample_param("inst-1", 1)).await.unwrap();
        let param = store.get_latest_instance_param("inst-1").await.unwrap().unwrap();
        assert_eq!(param.revision, 1);
        assert_eq!(param.patterns, vec!["pattern-a".to_string()]);
        assert_eq!(param.tags["env"], "{{.org}}");
    }

    #[tokio::test]
    async fn update_bumps_revision_and_keeps_old_patterns_queryable() {
        let store = memory_store().await;
        store.create_instance_param(sample_param("inst-1", 1)).await.unwrap();
        let mut rev2 = sample_param("inst-1", 2);
        rev2.patterns = vec!["pattern-b".into()];
        store.create_instance_param(rev2).await.unwrap();

        let latest = store.get_latest_instance_param("inst-1").await.unwrap().unwrap();
        assert_eq!(latest.revision, 2);
        assert_eq!(latest.patterns, vec!["pattern-b".to_string()]);

        // The old revision's own patterns survive a crossfade untouched.
        let rev1 = store.get_instance_param("inst-1", 1).await.unwrap().unwrap();
        assert_eq!(rev1.patterns, vec!["pattern-a".to_string()]);
    }

    #[tokio::test]
    async fn deprovision_removes_everything() {
        let store = memory_store().await;
        store.create_instance_param(sample_param("inst-1", 1)).await.unwrap();
        store.create_binding("bind-1", "inst-1", "app-1").await.unwrap();
        store.delete_instance("inst-1").await.unwrap();
        assert!(store.get_latest_instance_param("inst-1").await.unwrap().is_none());
        assert!(store.get_binding("bind-1").await.unwrap().is_none());
    }
}
