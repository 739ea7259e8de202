//! Rule Store
//!
//! SQLite-backed durable storage for allow/deny rules, following the
//! workspace's config-store convention: a schema file loaded with
//! `include_str!` at `init()` time, additive-only migrations so old
//! databases never fail to open, and plain `sqlx::query` (not the
//! compile-time-checked macros, since no `DATABASE_URL` is available at
//! build time for this workspace).

use chrono::{DateTime, Utc};
use portwatch_core::types::{Rule, RuleAction, Scope};
use portwatch_core::validation::{
    validate_destination, validate_identifier, validate_port, validate_rule_action,
    validate_rule_scope, validate_ttl_hours,
};
use portwatch_core::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../schema.sql");

/// Parameters accepted by [`RuleStore::create`].
#[derive(Debug, Clone)]
pub struct NewRule {
    pub process: String,
    pub destination: String,
    pub action: RuleAction,
    pub scope: Scope,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    pub exe_path: Option<String>,
    pub exe_hash: Option<String>,
    pub ttl_hours: Option<i64>,
    pub user_comment: Option<String>,
    pub context: Option<serde_json::Value>,
}

pub struct RuleStore {
    pool: SqlitePool,
}

impl RuleStore {
    /// Open (creating if necessary) the SQLite database at `path`, apply
    /// the base schema, and run additive migrations.
    pub async fn init(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| Error::Config(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&self.pool).await?;
        }

        // Additive migration: older databases predate the `context` column.
        let added = sqlx::query("ALTER TABLE rules ADD COLUMN context TEXT")
            .execute(&self.pool)
            .await;
        if let Err(sqlx::Error::Database(db_err)) = &added {
            if !db_err.message().contains("duplicate column name") {
                return Err(Error::Database(added.unwrap_err()));
            }
        }
        Ok(())
    }

    pub async fn create(&self, new_rule: NewRule) -> Result<String> {
        validate_identifier(&new_rule.process, 256).map_err(|e| Error::Validation(e.to_string()))?;
        validate_destination(&new_rule.destination)
            .map_err(|e| Error::Validation(e.to_string()))?;
        if let Some(port) = new_rule.port {
            validate_port(port).map_err(|e| Error::Validation(e.to_string()))?;
        }
        validate_rule_action(&new_rule.action.to_string())
            .map_err(|e| Error::Validation(e.to_string()))?;
        validate_rule_scope(&new_rule.scope.to_string())
            .map_err(|e| Error::Validation(e.to_string()))?;
        validate_ttl_hours(&new_rule.scope.to_string(), new_rule.ttl_hours)
            .map_err(|e| Error::Validation(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let expires_at = if new_rule.scope == Scope::Temporary {
            new_rule
                .ttl_hours
                .map(|h| created_at + chrono::Duration::hours(h))
        } else {
            None
        };

        sqlx::query(
            "INSERT INTO rules (id, process, exe_path, exe_hash, destination, port, protocol, \
             action, scope, created_at, expires_at, user_comment, enabled, context) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(&id)
        .bind(&new_rule.process)
        .bind(&new_rule.exe_path)
        .bind(&new_rule.exe_hash)
        .bind(&new_rule.destination)
        .bind(new_rule.port.map(|p| p as i64))
        .bind(&new_rule.protocol)
        .bind(new_rule.action.to_string())
        .bind(new_rule.scope.to_string())
        .bind(created_at.to_rfc3339())
        .bind(expires_at.map(|e| e.to_rfc3339()))
        .bind(&new_rule.user_comment)
        .bind(new_rule.context.as_ref().map(|c| c.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Rule>> {
        let row = sqlx::query("SELECT * FROM rules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_rule).transpose()
    }

    pub async fn list(&self, enabled_only: bool) -> Result<Vec<Rule>> {
        let sql = if enabled_only {
            "SELECT * FROM rules WHERE enabled = 1 ORDER BY created_at DESC"
        } else {
            "SELECT * FROM rules ORDER BY created_at DESC"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_rule).collect()
    }

    pub async fn update(
        &self,
        id: &str,
        action: Option<RuleAction>,
        comment: Option<String>,
    ) -> Result<()> {
        if let Some(action) = action {
            sqlx::query("UPDATE rules SET action = ? WHERE id = ?")
                .bind(action.to_string())
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        if let Some(comment) = comment {
            sqlx::query("UPDATE rules SET user_comment = ? WHERE id = ?")
                .bind(comment)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE rules SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn enable(&self, id: &str) -> Result<()> {
        self.set_enabled(id, true).await
    }

    pub async fn disable(&self, id: &str) -> Result<()> {
        self.set_enabled(id, false).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Flip any enabled rule whose `expires_at` is in the past to
    /// `enabled=false`. Run before every `find()`.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE rules SET enabled = 0 \
             WHERE enabled = 1 AND expires_at IS NOT NULL AND expires_at < ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Find the best matching enabled rule for a live connection, in
    /// priority order: hash match, then exe-path match, then
    /// process+destination+port, then process+destination+any-port.
    /// A `scope=once` match is disabled immediately.
    pub async fn find(
        &self,
        process: &str,
        destination: &str,
        port: Option<u16>,
        exe_path: Option<&str>,
        exe_hash: Option<&str>,
    ) -> Result<Option<Rule>> {
        self.cleanup_expired().await?;

        let port_i64 = port.map(|p| p as i64);

        if let Some(hash) = exe_hash {
            if let Some(rule) = self
                .match_one(
                    "SELECT * FROM rules WHERE enabled = 1 AND exe_hash = ? AND destination = ? \
                     AND (port = ? OR port IS NULL) ORDER BY port IS NULL ASC LIMIT 1",
                    hash,
                    destination,
                    port_i64,
                )
                .await?
            {
                return Ok(Some(self.finalize_match(rule).await?));
            }
        }

        if let Some(path) = exe_path {
            if let Some(rule) = self
                .match_one(
                    "SELECT * FROM rules WHERE enabled = 1 AND exe_path = ? AND destination = ? \
                     AND (port = ? OR port IS NULL) ORDER BY port IS NULL ASC LIMIT 1",
                    path,
                    destination,
                    port_i64,
                )
                .await?
            {
                return Ok(Some(self.finalize_match(rule).await?));
            }
        }

        let row = sqlx::query(
            "SELECT * FROM rules WHERE enabled = 1 AND process = ? AND destination = ? \
             AND port = ? LIMIT 1",
        )
        .bind(process)
        .bind(destination)
        .bind(port_i64)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            return Ok(Some(self.finalize_match(row_to_rule(row)?).await?));
        }

        let row = sqlx::query(
            "SELECT * FROM rules WHERE enabled = 1 AND process = ? AND destination = ? \
             AND port IS NULL LIMIT 1",
        )
        .bind(process)
        .bind(destination)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            return Ok(Some(self.finalize_match(row_to_rule(row)?).await?));
        }

        Ok(None)
    }

    async fn match_one(
        &self,
        sql: &str,
        key: &str,
        destination: &str,
        port: Option<i64>,
    ) -> Result<Option<Rule>> {
        let row = sqlx::query(sql)
            .bind(key)
            .bind(destination)
            .bind(port)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_rule).transpose()
    }

    async fn finalize_match(&self, rule: Rule) -> Result<Rule> {
        if rule.scope == Scope::Once {
            self.disable(&rule.id).await?;
        }
        Ok(rule)
    }

    pub async fn export(&self) -> Result<Vec<Rule>> {
        self.list(false).await
    }

    /// Import rules, regenerating ids to avoid collisions. When
    /// `overwrite` is true, existing rules are cleared first.
    pub async fn import(&self, rules: Vec<Rule>, overwrite: bool) -> Result<usize> {
        if overwrite {
            sqlx::query("DELETE FROM rules").execute(&self.pool).await?;
        }

        let mut imported = 0;
        for rule in rules {
            let new_rule = NewRule {
                process: rule.process,
                destination: rule.destination,
                action: rule.action,
                scope: rule.scope,
                port: rule.port,
                protocol: rule.protocol,
                exe_path: rule.exe_path,
                exe_hash: rule.exe_hash,
                ttl_hours: rule
                    .expires_at
                    .map(|exp| (exp - Utc::now()).num_hours().max(1)),
                user_comment: rule.user_comment,
                context: rule.context,
            };
            self.create(new_rule).await?;
            imported += 1;
        }
        Ok(imported)
    }

    pub async fn save_system_config(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO system_config (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_system_config(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM system_config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    /// Wipe every persisted rule and config entry. Part of the
    /// `factory_reset` action endpoint.
    pub async fn wipe(&self) -> Result<()> {
        sqlx::query("DELETE FROM rules").execute(&self.pool).await?;
        sqlx::query("DELETE FROM system_config")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_rule(row: sqlx::sqlite::SqliteRow) -> Result<Rule> {
    let action_str: String = row.get("action");
    let scope_str: String = row.get("scope");
    let created_at_str: String = row.get("created_at");
    let expires_at_str: Option<String> = row.get("expires_at");
    let port: Option<i64> = row.get("port");
    let context_str: Option<String> = row.get("context");

    Ok(Rule {
        id: row.get("id"),
        process: row.get("process"),
        exe_path: row.get("exe_path"),
        exe_hash: row.get("exe_hash"),
        destination: row.get("destination"),
        port: port.map(|p| p as u16),
        protocol: row.get("protocol"),
        action: RuleAction::from_str(&action_str).map_err(Error::Validation)?,
        scope: Scope::from_str(&scope_str).map_err(Error::Validation)?,
        created_at: parse_rfc3339(&created_at_str)?,
        expires_at: expires_at_str.map(|s| parse_rfc3339(&s)).transpose()?,
        user_comment: row.get("user_comment"),
        enabled: row.get::<bool, _>("enabled"),
        context: context_str
            .map(|s| serde_json::from_str(&s))
            .transpose()?,
    })
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Config(format!("bad timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule() -> NewRule {
        NewRule {
            process: "curl".to_string(),
            destination: "bad.example".to_string(),
            action: RuleAction::Deny,
            scope: Scope::Always,
            port: Some(443),
            protocol: Some("tcp".to_string()),
            exe_path: Some("/usr/bin/curl".to_string()),
            exe_hash: None,
            ttl_hours: None,
            user_comment: None,
            context: None,
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let store = RuleStore::in_memory().await.unwrap();
        let id = store.create(sample_rule()).await.unwrap();
        let rule = store.get(&id).await.unwrap().unwrap();
        assert_eq!(rule.process, "curl");
        assert_eq!(rule.action, RuleAction::Deny);
    }

    #[tokio::test]
    async fn temporary_scope_requires_ttl() {
        let store = RuleStore::in_memory().await.unwrap();
        let mut rule = sample_rule();
        rule.scope = Scope::Temporary;
        rule.ttl_hours = None;
        assert!(store.create(rule).await.is_err());
    }

    #[tokio::test]
    async fn find_prefers_hash_match_over_process_match() {
        let store = RuleStore::in_memory().await.unwrap();
        let mut hash_rule = sample_rule();
        hash_rule.exe_hash = Some("deadbeef".to_string());
        hash_rule.action = RuleAction::Allow;
        store.create(hash_rule).await.unwrap();

        let mut process_rule = sample_rule();
        process_rule.exe_path = None;
        process_rule.action = RuleAction::Deny;
        store.create(process_rule).await.unwrap();

        let found = store
            .find(
                "curl",
                "bad.example",
                Some(443),
                Some("/usr/bin/curl"),
                Some("deadbeef"),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.action, RuleAction::Allow);
    }

    #[tokio::test]
    async fn once_scope_rule_disables_after_match() {
        let store = RuleStore::in_memory().await.unwrap();
        let mut rule = sample_rule();
        rule.scope = Scope::Once;
        rule.exe_hash = Some("abc123".to_string());
        store.create(rule).await.unwrap();

        let first = store
            .find(
                "curl",
                "bad.example",
                Some(443),
                Some("/usr/bin/curl"),
                Some("abc123"),
            )
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .find(
                "curl",
                "bad.example",
                Some(443),
                Some("/usr/bin/curl"),
                Some("abc123"),
            )
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn export_then_import_with_overwrite_preserves_logical_contents() {
        let store = RuleStore::in_memory().await.unwrap();
        store.create(sample_rule()).await.unwrap();
        let exported = store.export().await.unwrap();

        let other = RuleStore::in_memory().await.unwrap();
        other.import(exported.clone(), true).await.unwrap();
        let reimported = other.export().await.unwrap();

        assert_eq!(reimported.len(), exported.len());
        assert_eq!(reimported[0].process, exported[0].process);
        assert_ne!(reimported[0].id, exported[0].id);
    }

    #[tokio::test]
    async fn cleanup_expired_disables_past_temporary_rules() {
        let store = RuleStore::in_memory().await.unwrap();
        let mut rule = sample_rule();
        rule.scope = Scope::Temporary;
        rule.ttl_hours = Some(1);
        let id = store.create(rule).await.unwrap();

        sqlx::query("UPDATE rules SET expires_at = '2000-01-01T00:00:00Z' WHERE id = ?")
            .bind(&id)
            .execute(&store.pool)
            .await
            .unwrap();

        let affected = store.cleanup_expired().await.unwrap();
        assert_eq!(affected, 1);
        assert!(!store.get(&id).await.unwrap().unwrap().enabled);
    }
}
