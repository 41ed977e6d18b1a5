//! Hash-chained audit entries.
//!
//! Every mutation appends exactly one entry whose hash binds the previous
//! entry's hash to the canonical (RFC 8785) serialization of the event.
//! The first entry chains from [`Hash::ZERO`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::Hash;
use crate::ids::AuditEntryId;

/// Event vocabulary emitted by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    EntityCreate,
    EntityMerge,
    EntitySplit,
    EntityAnonymize,
    FactCreate,
    FactSupersede,
    ResolutionDecision,
    HumanReview,
    PiiQuery,
    PatternMatch,
    DerivationJob,
    AlertCreate,
}

/// Who performed the mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    #[default]
    System,
    User(String),
    Api(String),
}

/// What the mutation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Entity,
    Fact,
    Mention,
    Identifier,
    Decision,
    Alert,
    Job,
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTarget {
    pub kind: TargetKind,
    pub id: String,
}

impl AuditTarget {
    pub fn new(kind: TargetKind, id: impl ToString) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }
}

/// Canonicalized view of an entry that the hash covers.
/// Unix-seconds timestamp keeps the JCS form stable across platforms.
#[derive(Serialize)]
struct HashParams<'a> {
    sequence_number: u64,
    timestamp: i64,
    event_type: &'a AuditEventType,
    actor: &'a Actor,
    target: &'a AuditTarget,
    payload: &'a serde_json::Value,
}

/// One immutable entry in the append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    /// Strictly monotonic insertion order, starting at 0
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub actor: Actor,
    pub target: AuditTarget,
    pub payload: serde_json::Value,
    pub previous_hash: Hash,
    pub entry_hash: Hash,
}

/// Payload keys whose values never belong in the log verbatim
const REDACTED_KEYS: &[&str] = &[
    "personnummer",
    "samordningsnummer",
    "password",
    "secret",
    "token",
];

impl AuditEntry {
    /// Build a chained entry. `previous` is [`Hash::ZERO`] for the first one.
    pub fn build(
        event_type: AuditEventType,
        actor: Actor,
        target: AuditTarget,
        payload: serde_json::Value,
        previous: &Hash,
        sequence_number: u64,
    ) -> Self {
        let timestamp = Utc::now();
        let payload = Self::redact(payload);
        let entry_hash = Self::compute_hash(
            sequence_number,
            timestamp,
            &event_type,
            &actor,
            &target,
            &payload,
            previous,
        );
        Self {
            id: AuditEntryId::new(),
            sequence_number,
            timestamp,
            event_type,
            actor,
            target,
            payload,
            previous_hash: previous.clone(),
            entry_hash,
        }
    }

    /// Recompute this entry's hash from its own fields
    pub fn recompute_hash(&self) -> Hash {
        Self::compute_hash(
            self.sequence_number,
            self.timestamp,
            &self.event_type,
            &self.actor,
            &self.target,
            &self.payload,
            &self.previous_hash,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn compute_hash(
        sequence_number: u64,
        timestamp: DateTime<Utc>,
        event_type: &AuditEventType,
        actor: &Actor,
        target: &AuditTarget,
        payload: &serde_json::Value,
        previous: &Hash,
    ) -> Hash {
        let params = HashParams {
            sequence_number,
            timestamp: timestamp.timestamp(),
            event_type,
            actor,
            target,
            payload,
        };
        match serde_jcs::to_vec(&params) {
            Ok(jcs) => Hash::digest_chained(previous, &jcs),
            Err(_) => {
                // JCS cannot fail on this shape; keep a stable fallback anyway
                let content = format!(
                    "{sequence_number}:{}:{event_type:?}:{actor:?}:{}:{payload}",
                    timestamp.timestamp(),
                    target.id,
                );
                Hash::digest_chained(previous, content.as_bytes())
            }
        }
    }

    /// Replace known sensitive keys anywhere in the payload tree
    pub fn redact(value: serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(mut map) => {
                for key in map.keys().cloned().collect::<Vec<_>>() {
                    let lower = key.to_lowercase();
                    if REDACTED_KEYS.iter().any(|k| lower.contains(k)) {
                        map.insert(key, serde_json::Value::String("[REDACTED]".to_string()));
                    } else if let Some(v) = map.remove(&key) {
                        map.insert(key, Self::redact(v));
                    }
                }
                serde_json::Value::Object(map)
            }
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(Self::redact).collect())
            }
            other => other,
        }
    }
}

/// Outcome of walking the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainStatus {
    Intact { length: u64 },
    Broken { index: u64, reason: String },
}

impl ChainStatus {
    pub fn is_intact(&self) -> bool {
        matches!(self, Self::Intact { .. })
    }
}

/// Verify a full chain in insertion order: seed, links, recomputed hashes,
/// and strictly increasing sequence numbers.
pub fn verify_chain(entries: &[AuditEntry]) -> ChainStatus {
    let mut prev_hash = Hash::ZERO;
    let mut prev_seq: Option<u64> = None;

    for (i, entry) in entries.iter().enumerate() {
        let index = i as u64;
        if entry.previous_hash != prev_hash {
            return ChainStatus::Broken {
                index,
                reason: "previous_hash does not match prior entry".to_string(),
            };
        }
        if entry.recompute_hash() != entry.entry_hash {
            return ChainStatus::Broken {
                index,
                reason: "entry_hash does not recompute from contents".to_string(),
            };
        }
        if let Some(p) = prev_seq {
            if entry.sequence_number <= p {
                return ChainStatus::Broken {
                    index,
                    reason: "sequence_number not strictly increasing".to_string(),
                };
            }
        }
        prev_seq = Some(entry.sequence_number);
        prev_hash = entry.entry_hash.clone();
    }

    ChainStatus::Intact {
        length: entries.len() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain_of(n: usize) -> Vec<AuditEntry> {
        let mut entries = Vec::new();
        let mut prev = Hash::ZERO;
        for i in 0..n {
            let e = AuditEntry::build(
                AuditEventType::FactCreate,
                Actor::System,
                AuditTarget::new(TargetKind::Fact, format!("fact-{i}")),
                json!({ "seq": i }),
                &prev,
                i as u64,
            );
            prev = e.entry_hash.clone();
            entries.push(e);
        }
        entries
    }

    #[test]
    fn intact_chain_verifies() {
        let entries = chain_of(100);
        assert_eq!(
            verify_chain(&entries),
            ChainStatus::Intact { length: 100 }
        );
    }

    #[test]
    fn mutated_payload_breaks_chain_at_index() {
        let mut entries = chain_of(100);
        entries[41].payload = json!({ "seq": "tampered" });
        match verify_chain(&entries) {
            ChainStatus::Broken { index, .. } => assert_eq!(index, 41),
            other => panic!("expected broken chain, got {other:?}"),
        }
    }

    #[test]
    fn wrong_seed_breaks_at_zero() {
        let mut entries = chain_of(3);
        entries[0].previous_hash = Hash::digest(b"not-the-seed");
        match verify_chain(&entries) {
            ChainStatus::Broken { index, .. } => assert_eq!(index, 0),
            other => panic!("expected broken chain, got {other:?}"),
        }
    }

    #[test]
    fn non_monotonic_sequence_detected() {
        let mut entries = chain_of(3);
        // Re-link entry 2 correctly but reuse sequence number 1
        let prev = entries[1].entry_hash.clone();
        entries[2] = AuditEntry::build(
            AuditEventType::FactCreate,
            Actor::System,
            AuditTarget::new(TargetKind::Fact, "fact-2"),
            json!({}),
            &prev,
            1,
        );
        match verify_chain(&entries) {
            ChainStatus::Broken { index, .. } => assert_eq!(index, 2),
            other => panic!("expected broken chain, got {other:?}"),
        }
    }

    #[test]
    fn redaction_masks_sensitive_keys() {
        let v = AuditEntry::redact(json!({
            "personnummer": "198501011239",
            "nested": { "api_token": "x", "name": "kept" }
        }));
        assert_eq!(v["personnummer"], "[REDACTED]");
        assert_eq!(v["nested"]["api_token"], "[REDACTED]");
        assert_eq!(v["nested"]["name"], "kept");
    }
}
