// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory store backing the test suite.
//!
//! One [`MemoryStore`] implements all three store traits over a single
//! `RwLock`, which also gives the upsert and the guarded answer their
//! exactly-one-winner semantics.

use crate::{
    ArtifactRecord, ClarificationRecord, ClarificationStore, IntentRecord, IntentStore,
    IntentUpdate, JournalStore, NewArtifact, NewClarification, NewIntent, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_core::{ArtifactKind, ClarificationStatus, IntentStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    intents: HashMap<String, IntentRecord>,
    intent_by_key: HashMap<String, String>,
    clarifications: HashMap<String, ClarificationRecord>,
    clarification_order: Vec<String>,
    artifacts: Vec<ArtifactRecord>,
}

/// Shared in-memory implementation of every store trait.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Back-date a clarification's `created_at` (expiry tests).
    pub async fn set_clarification_created_at(
        &self,
        clarification_id: &str,
        created_at: DateTime<Utc>,
    ) {
        let mut inner = self.inner.write().await;
        if let Some(row) = inner.clarifications.get_mut(clarification_id) {
            row.created_at = created_at;
        }
    }
}

#[async_trait]
impl IntentStore for MemoryStore {
    async fn upsert_by_idempotency_key(
        &self,
        new: NewIntent,
    ) -> Result<(IntentRecord, bool), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing_id) = inner.intent_by_key.get(&new.idempotency_key) {
            let row = inner.intents[existing_id].clone();
            return Ok((row, false));
        }
        let now = Utc::now();
        let row = IntentRecord {
            intent_id: new.intent_id.clone(),
            status: IntentStatus::Received,
            idempotency_key: new.idempotency_key.clone(),
            correlation_id: new.correlation_id,
            trace_id: new.trace_id,
            actor_id: new.actor_id,
            raw_packet: new.raw_packet,
            canonical_draft: None,
            final_canonical: None,
            response_envelope: None,
            created_at: now,
            updated_at: now,
        };
        inner
            .intent_by_key
            .insert(new.idempotency_key, new.intent_id.clone());
        inner.intents.insert(new.intent_id, row.clone());
        Ok((row, true))
    }

    async fn get(&self, intent_id: &str) -> Result<Option<IntentRecord>, StoreError> {
        Ok(self.inner.read().await.intents.get(intent_id).cloned())
    }

    async fn update(
        &self,
        intent_id: &str,
        update: IntentUpdate,
    ) -> Result<IntentRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let row = inner
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| StoreError::NotFound(format!("intent {intent_id}")))?;
        if let Some(status) = update.status {
            row.status = status;
        }
        if let Some(draft) = update.canonical_draft {
            row.canonical_draft = Some(draft);
        }
        if let Some(canonical) = update.final_canonical {
            row.final_canonical = Some(canonical);
        }
        if let Some(envelope) = update.response_envelope {
            row.response_envelope = Some(envelope);
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl ClarificationStore for MemoryStore {
    async fn insert(&self, new: NewClarification) -> Result<ClarificationRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let row = ClarificationRecord {
            clarification_id: Uuid::new_v4().to_string(),
            intent_id: new.intent_id,
            status: ClarificationStatus::Open,
            question: new.question,
            expected_answer_type: new.expected_answer_type,
            candidates: new.candidates,
            answer: None,
            answered_at: None,
            actor_id: new.actor_id,
            created_at: Utc::now(),
        };
        inner.clarification_order.push(row.clarification_id.clone());
        inner
            .clarifications
            .insert(row.clarification_id.clone(), row.clone());
        Ok(row)
    }

    async fn get(
        &self,
        clarification_id: &str,
    ) -> Result<Option<ClarificationRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .clarifications
            .get(clarification_id)
            .cloned())
    }

    async fn open_for_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<ClarificationRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .clarification_order
            .iter()
            .rev()
            .filter_map(|id| inner.clarifications.get(id))
            .find(|row| row.intent_id == intent_id && row.status == ClarificationStatus::Open)
            .cloned())
    }

    async fn list_open(
        &self,
        actor_id: Option<&str>,
    ) -> Result<Vec<ClarificationRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .clarification_order
            .iter()
            .filter_map(|id| inner.clarifications.get(id))
            .filter(|row| row.status == ClarificationStatus::Open)
            .filter(|row| match (actor_id, row.actor_id.as_deref()) {
                (Some(caller), Some(owner)) => caller == owner,
                _ => true,
            })
            .cloned()
            .collect())
    }

    async fn answer(
        &self,
        clarification_id: &str,
        answer: &Value,
    ) -> Result<Option<ClarificationRecord>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(row) = inner.clarifications.get_mut(clarification_id) else {
            return Ok(None);
        };
        if row.status != ClarificationStatus::Open {
            return Ok(None);
        }
        row.status = ClarificationStatus::Answered;
        row.answer = Some(answer.clone());
        row.answered_at = Some(Utc::now());
        Ok(Some(row.clone()))
    }

    async fn expire(&self, clarification_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let row = inner
            .clarifications
            .get_mut(clarification_id)
            .ok_or_else(|| StoreError::NotFound(format!("clarification {clarification_id}")))?;
        if row.status == ClarificationStatus::Open {
            row.status = ClarificationStatus::Expired;
        }
        Ok(())
    }

    async fn expire_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let mut inner = self.inner.write().await;
        let mut intent_ids = Vec::new();
        for row in inner.clarifications.values_mut() {
            if row.status == ClarificationStatus::Open && row.created_at < cutoff {
                row.status = ClarificationStatus::Expired;
                intent_ids.push(row.intent_id.clone());
            }
        }
        Ok(intent_ids)
    }
}

#[async_trait]
impl JournalStore for MemoryStore {
    async fn append(&self, new: NewArtifact) -> Result<ArtifactRecord, StoreError> {
        new.verify_hash()?;
        let mut inner = self.inner.write().await;
        let row = ArtifactRecord {
            id: Uuid::new_v4().to_string(),
            intent_id: new.intent_id,
            correlation_id: new.correlation_id,
            kind: new.kind,
            intent_type: new.intent_type,
            action: new.action,
            status: new.status,
            idempotency_key: new.idempotency_key,
            artifact_version: new.artifact_version,
            artifact_hash: new.artifact_hash,
            artifact: new.artifact,
            received_at: Utc::now(),
        };
        inner.artifacts.push(row.clone());
        Ok(row)
    }

    async fn latest(
        &self,
        intent_id: &str,
        kind: ArtifactKind,
        status: &str,
    ) -> Result<Option<ArtifactRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .artifacts
            .iter()
            .rev()
            .find(|row| row.intent_id == intent_id && row.kind == kind && row.status == status)
            .cloned())
    }

    async fn list_for_intent(
        &self,
        intent_id: &str,
    ) -> Result<Vec<ArtifactRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .artifacts
            .iter()
            .filter(|row| row.intent_id == intent_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::AnswerType;
    use serde_json::json;

    fn new_intent(key: &str) -> NewIntent {
        NewIntent {
            intent_id: format!("int_{key}"),
            idempotency_key: key.to_string(),
            correlation_id: "cor_1".into(),
            trace_id: "trace-1".into(),
            actor_id: None,
            raw_packet: json!({"kind": "intent"}),
        }
    }

    fn new_clarification(intent_id: &str) -> NewClarification {
        NewClarification {
            intent_id: intent_id.into(),
            question: "Which project?".into(),
            expected_answer_type: AnswerType::Choice,
            candidates: Vec::new(),
            actor_id: None,
        }
    }

    #[tokio::test]
    async fn first_upsert_creates_later_upserts_read_back() {
        let store = MemoryStore::new();
        let (first, created) = store.upsert_by_idempotency_key(new_intent("k1")).await.unwrap();
        assert!(created);
        assert_eq!(first.status, IntentStatus::Received);

        let mut replay = new_intent("k1");
        replay.intent_id = "int_other".into();
        let (second, created) = store.upsert_by_idempotency_key(replay).await.unwrap();
        assert!(!created);
        assert_eq!(second.intent_id, first.intent_id);
    }

    #[tokio::test]
    async fn update_patches_only_provided_members() {
        let store = MemoryStore::new();
        let (row, _) = store.upsert_by_idempotency_key(new_intent("k1")).await.unwrap();
        let updated = store
            .update(
                &row.intent_id,
                IntentUpdate {
                    status: Some(IntentStatus::Ready),
                    final_canonical: Some(json!({"intent_type": "create_task"})),
                    ..IntentUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, IntentStatus::Ready);
        assert!(updated.final_canonical.is_some());
        assert!(updated.response_envelope.is_none());
        assert_eq!(updated.raw_packet, row.raw_packet);
    }

    #[tokio::test]
    async fn update_unknown_intent_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update("int_missing", IntentUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn answer_is_a_single_winner_cas() {
        let store = MemoryStore::new();
        let row = store.insert(new_clarification("int_1")).await.unwrap();

        let first = store
            .answer(&row.clarification_id, &json!({"choice_id": "a"}))
            .await
            .unwrap();
        let winner = first.expect("first caller wins");
        assert_eq!(winner.status, ClarificationStatus::Answered);
        assert!(winner.answered_at.is_some());

        let second = store
            .answer(&row.clarification_id, &json!({"choice_id": "b"}))
            .await
            .unwrap();
        assert!(second.is_none());
        // The stored answer is the winner's.
        let stored = ClarificationStore::get(&store, &row.clarification_id).await.unwrap().unwrap();
        assert_eq!(stored.answer.unwrap()["choice_id"], "a");
    }

    #[tokio::test]
    async fn open_for_intent_returns_most_recent_open_row() {
        let store = MemoryStore::new();
        let first = store.insert(new_clarification("int_1")).await.unwrap();
        store
            .answer(&first.clarification_id, &json!({"answer_text": "x"}))
            .await
            .unwrap();
        let second = store.insert(new_clarification("int_1")).await.unwrap();

        let open = store.open_for_intent("int_1").await.unwrap().unwrap();
        assert_eq!(open.clarification_id, second.clarification_id);
    }

    #[tokio::test]
    async fn list_open_scopes_by_actor() {
        let store = MemoryStore::new();
        let mut scoped = new_clarification("int_1");
        scoped.actor_id = Some("alice".into());
        store.insert(scoped).await.unwrap();
        store.insert(new_clarification("int_2")).await.unwrap();

        let alice = store.list_open(Some("alice")).await.unwrap();
        assert_eq!(alice.len(), 2);
        let bob = store.list_open(Some("bob")).await.unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].intent_id, "int_2");
        let unscoped = store.list_open(None).await.unwrap();
        assert_eq!(unscoped.len(), 2);
    }

    #[tokio::test]
    async fn expiry_sweep_returns_owning_intents() {
        let store = MemoryStore::new();
        let old = store.insert(new_clarification("int_old")).await.unwrap();
        store.insert(new_clarification("int_new")).await.unwrap();
        store
            .set_clarification_created_at(
                &old.clarification_id,
                Utc::now() - chrono::Duration::hours(100),
            )
            .await;

        let cutoff = Utc::now() - chrono::Duration::hours(72);
        let swept = store.expire_older_than(cutoff).await.unwrap();
        assert_eq!(swept, vec!["int_old".to_string()]);

        let remaining = store.list_open(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].intent_id, "int_new");
    }

    #[tokio::test]
    async fn journal_refuses_mismatched_hash() {
        let store = MemoryStore::new();
        let mut artifact = NewArtifact::new(
            "int_1",
            "cor_1",
            ArtifactKind::Intent,
            None,
            None,
            "received",
            None,
            1,
            json!({"n": 1}),
        );
        artifact.artifact_hash = "0".repeat(64);
        let err = store.append(artifact).await.unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn journal_latest_honours_kind_and_status() {
        let store = MemoryStore::new();
        for (kind, status, n) in [
            (ArtifactKind::Intent, "received", 1),
            (ArtifactKind::Intent, "ready", 2),
            (ArtifactKind::Action, "executed", 3),
            (ArtifactKind::Intent, "ready", 4),
        ] {
            store
                .append(NewArtifact::new(
                    "int_1",
                    "cor_1",
                    kind,
                    None,
                    None,
                    status,
                    None,
                    1,
                    json!({"n": n}),
                ))
                .await
                .unwrap();
        }
        let latest = store
            .latest("int_1", ArtifactKind::Intent, "ready")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.artifact["n"], 4);
        assert!(
            store
                .latest("int_1", ArtifactKind::Action, "failed")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(store.list_for_intent("int_1").await.unwrap().len(), 4);
    }
}
