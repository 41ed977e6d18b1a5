//! SQLite backend.
//!
//! Flat indexed columns for every lookup path plus a JSON payload column
//! holding the full record. Columns that mutate (supersession stamps,
//! mention status, alert acknowledgement) are overlaid onto the payload at
//! read time, so payloads are written exactly once.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

use granska_core::{
    Alert, AlertId, AuditEntry, CoreError, CoreResult, DecisionId, Entity, EntityId, EntityType,
    Fact, FactId, GroundTruthPair, IdentifierRecord, IdentifierType, Mention, MentionId,
    Provenance, ProvenanceId, ResolutionDecision, ResolutionStatus,
};

use crate::backend::StoreBackend;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    status TEXT NOT NULL,
    canonical_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type, id);
CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(canonical_name);

CREATE TABLE IF NOT EXISTS identifiers (
    id TEXT PRIMARY KEY,
    entity TEXT NOT NULL,
    id_type TEXT NOT NULL,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL,
    payload TEXT NOT NULL,
    UNIQUE(entity, id_type, value)
);
CREATE INDEX IF NOT EXISTS idx_identifiers_lookup ON identifiers(id_type, value);
CREATE INDEX IF NOT EXISTS idx_identifiers_entity ON identifiers(entity);
CREATE INDEX IF NOT EXISTS idx_identifiers_value ON identifiers(value);

CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    subject TEXT NOT NULL,
    object TEXT,
    predicate TEXT NOT NULL,
    created_at TEXT NOT NULL,
    superseded_by TEXT,
    superseded_at TEXT,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_facts_subject_current ON facts(subject, predicate)
    WHERE superseded_by IS NULL;
CREATE INDEX IF NOT EXISTS idx_facts_object_current ON facts(object, predicate)
    WHERE superseded_by IS NULL;
CREATE INDEX IF NOT EXISTS idx_facts_subject ON facts(subject);
CREATE INDEX IF NOT EXISTS idx_facts_object ON facts(object);
CREATE INDEX IF NOT EXISTS idx_facts_predicate ON facts(predicate);

CREATE TABLE IF NOT EXISTS mentions (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_mentions_status ON mentions(status, created_at);

CREATE TABLE IF NOT EXISTS provenances (
    id TEXT PRIMARY KEY,
    payload TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY,
    mention_type TEXT NOT NULL,
    pending_review INTEGER NOT NULL,
    priority INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_decisions_queue
    ON decisions(pending_review, priority DESC, created_at);

CREATE TABLE IF NOT EXISTS audit_log (
    seq INTEGER PRIMARY KEY,
    id TEXT NOT NULL,
    entry_hash TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_hash ON audit_log(entry_hash);

CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    acknowledged INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_ack ON alerts(acknowledged, created_at DESC);

CREATE TABLE IF NOT EXISTS ground_truth (
    id TEXT PRIMARY KEY,
    payload TEXT NOT NULL
);
"#;

/// SQLite configuration options
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database URL (e.g. "sqlite:granska.db?mode=rwc" or "sqlite::memory:")
    pub url: String,
    pub max_connections: u32,
    /// WAL journal mode for concurrent readers
    pub wal_mode: bool,
    pub foreign_keys: bool,
    pub busy_timeout_secs: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:granska.db?mode=rwc".to_string(),
            max_connections: 5,
            wal_mode: true,
            foreign_keys: true,
            busy_timeout_secs: 30,
        }
    }
}

impl SqliteConfig {
    /// Config for an in-memory database (testing)
    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            wal_mode: false,
            foreign_keys: true,
            busy_timeout_secs: 5,
        }
    }
}

/// SQLite storage backend
#[derive(Debug)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

fn storage_err(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn ser_err(e: serde_json::Error) -> CoreError {
    CoreError::Serialization(e.to_string())
}

/// Fixed-width RFC 3339 so lexicographic string order is chronological
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteBackend {
    pub async fn new(url: &str) -> CoreResult<Self> {
        Self::new_with_config(SqliteConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .await
    }

    pub async fn new_with_config(config: SqliteConfig) -> CoreResult<Self> {
        let mut options =
            SqliteConnectOptions::from_str(&config.url).map_err(storage_err)?;

        if config.foreign_keys {
            options = options.pragma("foreign_keys", "ON");
        }
        options = options.pragma("busy_timeout", config.busy_timeout_secs.to_string());
        if config.wal_mode {
            options = options.pragma("journal_mode", "WAL");
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await.map_err(storage_err)?;

        info!(url = %config.url, wal = config.wal_mode, "connected to sqlite store");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn decode<T: serde::de::DeserializeOwned>(payload: &str) -> CoreResult<T> {
        serde_json::from_str(payload).map_err(ser_err)
    }

    fn encode<T: serde::Serialize>(value: &T) -> CoreResult<String> {
        serde_json::to_string(value).map_err(ser_err)
    }

    fn decode_fact(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Fact> {
        let payload: String = row.get("payload");
        let mut fact: Fact = Self::decode(&payload)?;
        let superseded_by: Option<String> = row.get("superseded_by");
        let superseded_at: Option<String> = row.get("superseded_at");
        fact.superseded_by = superseded_by
            .as_deref()
            .map(FactId::from_str)
            .transpose()
            .map_err(|e| CoreError::Serialization(e.to_string()))?;
        fact.superseded_at = superseded_at
            .as_deref()
            .map(|s| {
                DateTime::parse_from_rfc3339(s)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| CoreError::Serialization(e.to_string()))
            })
            .transpose()?;
        Ok(fact)
    }

    async fn fetch_facts(&self, sql: &str, bind: &str) -> CoreResult<Vec<Fact>> {
        let rows = sqlx::query(sql)
            .bind(bind)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(Self::decode_fact).collect()
    }
}

#[async_trait]
impl StoreBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    async fn insert_entity(&self, entity: &Entity) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO entities (id, entity_type, status, canonical_name, created_at, payload)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entity.id.to_string())
        .bind(entity.entity_type.as_str())
        .bind(format!("{:?}", entity.status).to_uppercase())
        .bind(&entity.canonical_name)
        .bind(ts(entity.created_at))
        .bind(Self::encode(entity)?)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::Invariant(format!("entity {} already exists", entity.id))
            }
            _ => storage_err(e),
        })?;
        Ok(())
    }

    async fn get_entity(&self, id: EntityId) -> CoreResult<Option<Entity>> {
        let row = sqlx::query("SELECT payload FROM entities WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(|r| Self::decode(&r.get::<String, _>("payload")))
            .transpose()
    }

    async fn update_entity(&self, entity: &Entity) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE entities SET status = ?, canonical_name = ?, payload = ? WHERE id = ?",
        )
        .bind(format!("{:?}", entity.status).to_uppercase())
        .bind(&entity.canonical_name)
        .bind(Self::encode(entity)?)
        .bind(entity.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("entity {}", entity.id)));
        }
        Ok(())
    }

    async fn list_entities(
        &self,
        entity_type: Option<EntityType>,
        offset: usize,
        limit: usize,
    ) -> CoreResult<Vec<Entity>> {
        let rows = match entity_type {
            Some(t) => {
                sqlx::query(
                    "SELECT payload FROM entities WHERE entity_type = ?
                     ORDER BY id LIMIT ? OFFSET ?",
                )
                .bind(t.as_str())
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT payload FROM entities ORDER BY id LIMIT ? OFFSET ?")
                    .bind(limit as i64)
                    .bind(offset as i64)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(storage_err)?;
        rows.iter()
            .map(|r| Self::decode(&r.get::<String, _>("payload")))
            .collect()
    }

    async fn count_entities(&self, entity_type: Option<EntityType>) -> CoreResult<u64> {
        let row = match entity_type {
            Some(t) => {
                sqlx::query("SELECT COUNT(*) AS n FROM entities WHERE entity_type = ?")
                    .bind(t.as_str())
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS n FROM entities")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(storage_err)?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn search_entities_by_name(
        &self,
        needle: &str,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> CoreResult<Vec<Entity>> {
        let escaped = needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let rows = match entity_type {
            Some(t) => {
                sqlx::query(
                    "SELECT payload FROM entities
                     WHERE entity_type = ? AND canonical_name LIKE ? ESCAPE '\\' COLLATE NOCASE
                     ORDER BY id LIMIT ?",
                )
                .bind(t.as_str())
                .bind(&pattern)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT payload FROM entities
                     WHERE canonical_name LIKE ? ESCAPE '\\' COLLATE NOCASE
                     ORDER BY id LIMIT ?",
                )
                .bind(&pattern)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(storage_err)?;
        rows.iter()
            .map(|r| Self::decode(&r.get::<String, _>("payload")))
            .collect()
    }

    async fn insert_identifier(&self, record: &IdentifierRecord) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO identifiers (id, entity, id_type, value, created_at, payload)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.entity.to_string())
        .bind(record.id_type.as_str())
        .bind(&record.value)
        .bind(ts(record.created_at))
        .bind(Self::encode(record)?)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::DuplicateIdentifier {
                    id_type: record.id_type.as_str().to_string(),
                    value: record.value.clone(),
                }
            }
            _ => storage_err(e),
        })?;
        Ok(())
    }

    async fn identifiers_for_entity(&self, entity: EntityId) -> CoreResult<Vec<IdentifierRecord>> {
        let rows = sqlx::query(
            "SELECT payload FROM identifiers WHERE entity = ? ORDER BY created_at, id",
        )
        .bind(entity.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter()
            .map(|r| Self::decode(&r.get::<String, _>("payload")))
            .collect()
    }

    async fn identifiers_by_value(
        &self,
        id_type: IdentifierType,
        value: &str,
    ) -> CoreResult<Vec<IdentifierRecord>> {
        let rows = sqlx::query(
            "SELECT payload FROM identifiers WHERE id_type = ? AND value = ?
             ORDER BY created_at, id",
        )
        .bind(id_type.as_str())
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter()
            .map(|r| Self::decode(&r.get::<String, _>("payload")))
            .collect()
    }

    async fn identifiers_by_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> CoreResult<Vec<IdentifierRecord>> {
        // Escape LIKE metacharacters in the user-supplied prefix
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let rows = sqlx::query(
            "SELECT payload FROM identifiers WHERE value LIKE ? ESCAPE '\\'
             ORDER BY created_at, id LIMIT ?",
        )
        .bind(format!("{escaped}%"))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter()
            .map(|r| Self::decode(&r.get::<String, _>("payload")))
            .collect()
    }

    async fn delete_identifiers(&self, entity: EntityId) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM identifiers WHERE entity = ?")
            .bind(entity.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn insert_fact(&self, fact: &Fact) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO facts (id, subject, object, predicate, created_at, payload)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(fact.id.to_string())
        .bind(fact.subject.to_string())
        .bind(fact.object().map(|o| o.to_string()))
        .bind(fact.predicate())
        .bind(ts(fact.created_at))
        .bind(Self::encode(fact)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get_fact(&self, id: FactId) -> CoreResult<Option<Fact>> {
        let row = sqlx::query(
            "SELECT payload, superseded_by, superseded_at FROM facts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(Self::decode_fact).transpose()
    }

    async fn facts_by_subject(&self, subject: EntityId) -> CoreResult<Vec<Fact>> {
        self.fetch_facts(
            "SELECT payload, superseded_by, superseded_at FROM facts
             WHERE subject = ? ORDER BY created_at, id",
            &subject.to_string(),
        )
        .await
    }

    async fn facts_by_object(&self, object: EntityId) -> CoreResult<Vec<Fact>> {
        self.fetch_facts(
            "SELECT payload, superseded_by, superseded_at FROM facts
             WHERE object = ? ORDER BY created_at, id",
            &object.to_string(),
        )
        .await
    }

    async fn facts_by_predicate(&self, predicate: &str) -> CoreResult<Vec<Fact>> {
        self.fetch_facts(
            "SELECT payload, superseded_by, superseded_at FROM facts
             WHERE predicate = ? ORDER BY created_at, id",
            predicate,
        )
        .await
    }

    async fn supersede_fact(
        &self,
        old: FactId,
        new_fact: &Fact,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let claimed = sqlx::query(
            "UPDATE facts SET superseded_by = ?, superseded_at = ?
             WHERE id = ? AND superseded_by IS NULL",
        )
        .bind(new_fact.id.to_string())
        .bind(ts(at))
        .bind(old.to_string())
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        if claimed.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM facts WHERE id = ?")
                .bind(old.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_err)?
                .is_some();
            // Dropping the transaction rolls the claim back
            return if exists {
                Err(CoreError::Conflict(format!("fact {old} already superseded")))
            } else {
                Err(CoreError::NotFound(format!("fact {old}")))
            };
        }

        sqlx::query(
            "INSERT INTO facts (id, subject, object, predicate, created_at, payload)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(new_fact.id.to_string())
        .bind(new_fact.subject.to_string())
        .bind(new_fact.object().map(|o| o.to_string()))
        .bind(new_fact.predicate())
        .bind(ts(new_fact.created_at))
        .bind(Self::encode(new_fact)?)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)
    }

    async fn update_fact(&self, fact: &Fact) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE facts SET payload = ?, superseded_by = ?, superseded_at = ? WHERE id = ?",
        )
        .bind(Self::encode(fact)?)
        .bind(fact.superseded_by.map(|f| f.to_string()))
        .bind(fact.superseded_at.map(ts))
        .bind(fact.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("fact {}", fact.id)));
        }
        Ok(())
    }

    async fn insert_mention(&self, mention: &Mention) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO mentions (id, status, created_at, payload) VALUES (?, ?, ?, ?)",
        )
        .bind(mention.id.to_string())
        .bind(status_str(mention.resolution.status))
        .bind(ts(mention.created_at))
        .bind(Self::encode(mention)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get_mention(&self, id: MentionId) -> CoreResult<Option<Mention>> {
        let row = sqlx::query("SELECT payload FROM mentions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(|r| Self::decode(&r.get::<String, _>("payload")))
            .transpose()
    }

    async fn update_mention(&self, mention: &Mention) -> CoreResult<()> {
        let result = sqlx::query("UPDATE mentions SET status = ?, payload = ? WHERE id = ?")
            .bind(status_str(mention.resolution.status))
            .bind(Self::encode(mention)?)
            .bind(mention.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("mention {}", mention.id)));
        }
        Ok(())
    }

    async fn pending_mentions(&self, limit: usize) -> CoreResult<Vec<Mention>> {
        let rows = sqlx::query(
            "SELECT payload FROM mentions WHERE status = 'PENDING'
             ORDER BY created_at, id LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter()
            .map(|r| Self::decode(&r.get::<String, _>("payload")))
            .collect()
    }

    async fn insert_provenance(&self, provenance: &Provenance) -> CoreResult<()> {
        // Idempotent: a provenance may back several records
        sqlx::query("INSERT OR IGNORE INTO provenances (id, payload) VALUES (?, ?)")
            .bind(provenance.id.to_string())
            .bind(Self::encode(provenance)?)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get_provenance(&self, id: ProvenanceId) -> CoreResult<Option<Provenance>> {
        let row = sqlx::query("SELECT payload FROM provenances WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(|r| Self::decode(&r.get::<String, _>("payload")))
            .transpose()
    }

    async fn insert_decision(&self, decision: &ResolutionDecision) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO decisions (id, mention_type, pending_review, priority, created_at, payload)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(decision.id.to_string())
        .bind(decision.mention_type.as_str())
        .bind(decision.is_pending_review() as i64)
        .bind(decision.priority)
        .bind(ts(decision.created_at))
        .bind(Self::encode(decision)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get_decision(&self, id: DecisionId) -> CoreResult<Option<ResolutionDecision>> {
        let row = sqlx::query("SELECT payload FROM decisions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(|r| Self::decode(&r.get::<String, _>("payload")))
            .transpose()
    }

    async fn update_decision(&self, decision: &ResolutionDecision) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE decisions SET pending_review = ?, payload = ? WHERE id = ?",
        )
        .bind(decision.is_pending_review() as i64)
        .bind(Self::encode(decision)?)
        .bind(decision.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("decision {}", decision.id)));
        }
        Ok(())
    }

    async fn pending_decisions(
        &self,
        mention_type: Option<EntityType>,
        limit: usize,
    ) -> CoreResult<Vec<ResolutionDecision>> {
        let rows = match mention_type {
            Some(t) => {
                sqlx::query(
                    "SELECT payload FROM decisions
                     WHERE pending_review = 1 AND mention_type = ?
                     ORDER BY priority DESC, created_at, id LIMIT ?",
                )
                .bind(t.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT payload FROM decisions WHERE pending_review = 1
                     ORDER BY priority DESC, created_at, id LIMIT ?",
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(storage_err)?;
        rows.iter()
            .map(|r| Self::decode(&r.get::<String, _>("payload")))
            .collect()
    }

    async fn append_audit(&self, entry: &AuditEntry) -> CoreResult<()> {
        sqlx::query("INSERT INTO audit_log (seq, id, entry_hash, payload) VALUES (?, ?, ?, ?)")
            .bind(entry.sequence_number as i64)
            .bind(entry.id.to_string())
            .bind(entry.entry_hash.to_hex())
            .bind(Self::encode(entry)?)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => CoreError::Invariant(
                    "audit sequence must be strictly increasing".to_string(),
                ),
                _ => storage_err(e),
            })?;
        Ok(())
    }

    async fn audit_entries(&self) -> CoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query("SELECT payload FROM audit_log ORDER BY seq")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter()
            .map(|r| Self::decode(&r.get::<String, _>("payload")))
            .collect()
    }

    async fn last_audit(&self) -> CoreResult<Option<AuditEntry>> {
        let row = sqlx::query("SELECT payload FROM audit_log ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(|r| Self::decode(&r.get::<String, _>("payload")))
            .transpose()
    }

    async fn insert_alert(&self, alert: &Alert) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO alerts (id, acknowledged, created_at, payload) VALUES (?, ?, ?, ?)",
        )
        .bind(alert.id.to_string())
        .bind(alert.acknowledged as i64)
        .bind(ts(alert.created_at))
        .bind(Self::encode(alert)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get_alert(&self, id: AlertId) -> CoreResult<Option<Alert>> {
        let row = sqlx::query("SELECT payload FROM alerts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(|r| Self::decode(&r.get::<String, _>("payload")))
            .transpose()
    }

    async fn update_alert(&self, alert: &Alert) -> CoreResult<()> {
        let result = sqlx::query("UPDATE alerts SET acknowledged = ?, payload = ? WHERE id = ?")
            .bind(alert.acknowledged as i64)
            .bind(Self::encode(alert)?)
            .bind(alert.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("alert {}", alert.id)));
        }
        Ok(())
    }

    async fn list_alerts(
        &self,
        acknowledged: Option<bool>,
        limit: usize,
    ) -> CoreResult<Vec<Alert>> {
        let rows = match acknowledged {
            Some(ack) => {
                sqlx::query(
                    "SELECT payload FROM alerts WHERE acknowledged = ?
                     ORDER BY created_at DESC, id LIMIT ?",
                )
                .bind(ack as i64)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT payload FROM alerts ORDER BY created_at DESC, id LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(storage_err)?;
        rows.iter()
            .map(|r| Self::decode(&r.get::<String, _>("payload")))
            .collect()
    }

    async fn insert_ground_truth(&self, pair: &GroundTruthPair) -> CoreResult<()> {
        sqlx::query("INSERT INTO ground_truth (id, payload) VALUES (?, ?)")
            .bind(pair.id.to_string())
            .bind(Self::encode(pair)?)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn ground_truth(&self) -> CoreResult<Vec<GroundTruthPair>> {
        let rows = sqlx::query("SELECT payload FROM ground_truth ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter()
            .map(|r| Self::decode(&r.get::<String, _>("payload")))
            .collect()
    }
}

fn status_str(status: ResolutionStatus) -> &'static str {
    match status {
        ResolutionStatus::Pending => "PENDING",
        ResolutionStatus::AutoMatched => "AUTO_MATCHED",
        ResolutionStatus::HumanMatched => "HUMAN_MATCHED",
        ResolutionStatus::AutoRejected => "AUTO_REJECTED",
        ResolutionStatus::HumanRejected => "HUMAN_REJECTED",
    }
}
