// SPDX-License-Identifier: MIT OR Apache-2.0
//! Postgres-backed stores.
//!
//! All queries are runtime-bound (`sqlx::query` + `bind`); the idempotency
//! upsert uses `INSERT … ON CONFLICT DO NOTHING RETURNING *` with a
//! read-back inside one transaction, and the clarification answer is a
//! guarded `UPDATE … WHERE status = 'open' RETURNING *` so at most one
//! caller wins.

use crate::{
    ArtifactRecord, ClarificationRecord, ClarificationStore, IntentRecord, IntentStore,
    IntentUpdate, JournalStore, NewArtifact, NewClarification, NewIntent, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_core::{AnswerType, ArtifactKind, Candidate, ClarificationStatus, IntentStatus};
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use uuid::Uuid;

/// Postgres implementation of every store trait, sharing one pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with the default pool sizing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn intent_from_row(row: &PgRow) -> Result<IntentRecord, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(IntentRecord {
        intent_id: row.try_get("intent_id")?,
        status: status.parse::<IntentStatus>().map_err(corrupt)?,
        idempotency_key: row.try_get("idempotency_key")?,
        correlation_id: row.try_get("correlation_id")?,
        trace_id: row.try_get("trace_id")?,
        actor_id: row.try_get("actor_id")?,
        raw_packet: row.try_get("raw_packet")?,
        canonical_draft: row.try_get("canonical_draft")?,
        final_canonical: row.try_get("final_canonical")?,
        response_envelope: row.try_get("response_envelope")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn clarification_from_row(row: &PgRow) -> Result<ClarificationRecord, StoreError> {
    let status: String = row.try_get("status")?;
    let expected: String = row.try_get("expected_answer_type")?;
    let candidates: Value = row.try_get("candidates")?;
    let candidates: Vec<Candidate> = serde_json::from_value(candidates).map_err(corrupt)?;
    let clarification_id: Uuid = row.try_get("clarification_id")?;
    Ok(ClarificationRecord {
        clarification_id: clarification_id.to_string(),
        intent_id: row.try_get("intent_id")?,
        status: status.parse::<ClarificationStatus>().map_err(corrupt)?,
        question: row.try_get("question")?,
        expected_answer_type: expected.parse::<AnswerType>().map_err(corrupt)?,
        candidates,
        answer: row.try_get("answer")?,
        answered_at: row.try_get("answered_at")?,
        actor_id: row.try_get("actor_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn artifact_from_row(row: &PgRow) -> Result<ArtifactRecord, StoreError> {
    let kind: String = row.try_get("kind")?;
    let kind = match kind.as_str() {
        "intent" => ArtifactKind::Intent,
        "action" => ArtifactKind::Action,
        other => return Err(StoreError::Corrupt(format!("unknown artifact kind {other}"))),
    };
    let id: Uuid = row.try_get("id")?;
    Ok(ArtifactRecord {
        id: id.to_string(),
        intent_id: row.try_get("intent_id")?,
        correlation_id: row.try_get("correlation_id")?,
        kind,
        intent_type: row.try_get("intent_type")?,
        action: row.try_get("action")?,
        status: row.try_get("status")?,
        idempotency_key: row.try_get("idempotency_key")?,
        artifact_version: row.try_get("artifact_version")?,
        artifact_hash: row.try_get("artifact_hash")?,
        artifact: row.try_get("artifact")?,
        received_at: row.try_get("received_at")?,
    })
}

#[async_trait]
impl IntentStore for PgStore {
    async fn upsert_by_idempotency_key(
        &self,
        new: NewIntent,
    ) -> Result<(IntentRecord, bool), StoreError> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO intents
                (intent_id, status, idempotency_key, raw_packet,
                 correlation_id, trace_id, actor_id)
            VALUES ($1, 'received', $2, $3, $4, $5, $6)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&new.intent_id)
        .bind(&new.idempotency_key)
        .bind(&new.raw_packet)
        .bind(&new.correlation_id)
        .bind(&new.trace_id)
        .bind(&new.actor_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (row, created) = match inserted {
            Some(row) => (intent_from_row(&row)?, true),
            None => {
                let existing =
                    sqlx::query("SELECT * FROM intents WHERE idempotency_key = $1")
                        .bind(&new.idempotency_key)
                        .fetch_one(&mut *tx)
                        .await?;
                (intent_from_row(&existing)?, false)
            }
        };
        tx.commit().await?;
        Ok((row, created))
    }

    async fn get(&self, intent_id: &str) -> Result<Option<IntentRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM intents WHERE intent_id = $1")
            .bind(intent_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(intent_from_row).transpose()
    }

    async fn update(
        &self,
        intent_id: &str,
        update: IntentUpdate,
    ) -> Result<IntentRecord, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE intents SET
                status = COALESCE($2, status),
                canonical_draft = COALESCE($3, canonical_draft),
                final_canonical = COALESCE($4, final_canonical),
                response_envelope = COALESCE($5, response_envelope),
                updated_at = now()
            WHERE intent_id = $1
            RETURNING *
            "#,
        )
        .bind(intent_id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.canonical_draft)
        .bind(update.final_canonical)
        .bind(update.response_envelope)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("intent {intent_id}")))?;
        intent_from_row(&row)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ClarificationStore for PgStore {
    async fn insert(&self, new: NewClarification) -> Result<ClarificationRecord, StoreError> {
        let candidates = serde_json::to_value(&new.candidates).map_err(corrupt)?;
        let row = sqlx::query(
            r#"
            INSERT INTO clarifications
                (intent_id, status, question, expected_answer_type,
                 candidates, actor_id)
            VALUES ($1, 'open', $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&new.intent_id)
        .bind(&new.question)
        .bind(new.expected_answer_type.as_str())
        .bind(candidates)
        .bind(&new.actor_id)
        .fetch_one(&self.pool)
        .await?;
        clarification_from_row(&row)
    }

    async fn get(
        &self,
        clarification_id: &str,
    ) -> Result<Option<ClarificationRecord>, StoreError> {
        let Ok(id) = Uuid::parse_str(clarification_id) else {
            return Ok(None);
        };
        let row = sqlx::query("SELECT * FROM clarifications WHERE clarification_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(clarification_from_row).transpose()
    }

    async fn open_for_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<ClarificationRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM clarifications
            WHERE intent_id = $1 AND status = 'open'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(clarification_from_row).transpose()
    }

    async fn list_open(
        &self,
        actor_id: Option<&str>,
    ) -> Result<Vec<ClarificationRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM clarifications
            WHERE status = 'open'
              AND ($1::text IS NULL OR actor_id IS NULL OR actor_id = $1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(clarification_from_row).collect()
    }

    async fn answer(
        &self,
        clarification_id: &str,
        answer: &Value,
    ) -> Result<Option<ClarificationRecord>, StoreError> {
        let Ok(id) = Uuid::parse_str(clarification_id) else {
            return Ok(None);
        };
        let row = sqlx::query(
            r#"
            UPDATE clarifications
            SET status = 'answered', answer = $2, answered_at = now()
            WHERE clarification_id = $1 AND status = 'open'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(answer)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(clarification_from_row).transpose()
    }

    async fn expire(&self, clarification_id: &str) -> Result<(), StoreError> {
        let Ok(id) = Uuid::parse_str(clarification_id) else {
            return Err(StoreError::NotFound(format!(
                "clarification {clarification_id}"
            )));
        };
        sqlx::query(
            "UPDATE clarifications SET status = 'expired' \
             WHERE clarification_id = $1 AND status = 'open'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn expire_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE clarifications
            SET status = 'expired'
            WHERE status = 'open' AND created_at < $1
            RETURNING intent_id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("intent_id").map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl JournalStore for PgStore {
    async fn append(&self, new: NewArtifact) -> Result<ArtifactRecord, StoreError> {
        new.verify_hash()?;
        let row = sqlx::query(
            r#"
            INSERT INTO intent_artifacts
                (intent_id, correlation_id, kind, intent_type, action,
                 status, idempotency_key, artifact_version, artifact_hash,
                 artifact)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&new.intent_id)
        .bind(&new.correlation_id)
        .bind(new.kind.as_str())
        .bind(&new.intent_type)
        .bind(&new.action)
        .bind(&new.status)
        .bind(&new.idempotency_key)
        .bind(new.artifact_version)
        .bind(&new.artifact_hash)
        .bind(&new.artifact)
        .fetch_one(&self.pool)
        .await?;
        artifact_from_row(&row)
    }

    async fn latest(
        &self,
        intent_id: &str,
        kind: ArtifactKind,
        status: &str,
    ) -> Result<Option<ArtifactRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM intent_artifacts
            WHERE intent_id = $1 AND kind = $2 AND status = $3
            ORDER BY received_at DESC
            LIMIT 1
            "#,
        )
        .bind(intent_id)
        .bind(kind.as_str())
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(artifact_from_row).transpose()
    }

    async fn list_for_intent(
        &self,
        intent_id: &str,
    ) -> Result<Vec<ArtifactRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM intent_artifacts WHERE intent_id = $1 ORDER BY received_at ASC",
        )
        .bind(intent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(artifact_from_row).collect()
    }
}
