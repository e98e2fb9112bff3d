//! Versioned record envelope and partial updates.
//!
//! Every entity kind shares the same control fields (`id`, `version`,
//! `creator`, `modifier`, descriptive columns and timestamps) around an
//! opaque payload. The version is the optimistic concurrency token: it
//! starts at [`INITIAL_VERSION`] and grows by exactly one per successful
//! conditional update.

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::{ActorId, EntityKind, RecordId, RecordStatus, Timestamp};

/// Version assigned to freshly created records.
pub const INITIAL_VERSION: i64 = 1;

/// Payload carried inside a [`Record`].
///
/// # Implementation Requirements
///
/// - `kind()` must return the same value for every instance
/// - the payload must serialize to a JSON object, so that field patches can
///   be merged into it
pub trait Payload: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Entity kind this payload belongs to.
    fn kind() -> EntityKind;
}

/// A stored entity: control fields plus payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<P> {
    pub id: RecordId,
    pub version: i64,
    pub creator: ActorId,
    pub modifier: ActorId,
    pub status: RecordStatus,
    pub sort: i32,
    pub remark: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub payload: P,
}

impl<P: Payload> Record<P> {
    /// Build a brand-new record with a generated id and the initial version.
    pub fn create(payload: P, creator: impl Into<ActorId>) -> Self {
        let creator = creator.into();
        let now = Utc::now();
        Self {
            id: RecordId::generate(),
            version: INITIAL_VERSION,
            modifier: creator.clone(),
            creator,
            status: RecordStatus::default(),
            sort: 0,
            remark: None,
            created_at: now,
            updated_at: now,
            payload,
        }
    }

    /// Set the sort key (builder style).
    pub fn with_sort(mut self, sort: i32) -> Self {
        self.sort = sort;
        self
    }

    /// Set the remark (builder style).
    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    /// Set the status (builder style).
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }

    /// Entity kind of this record.
    pub fn kind(&self) -> EntityKind {
        P::kind()
    }
}

/// Partial update applied by a conditional update.
///
/// Control columns are explicit options; payload fields are a top-level
/// JSON merge. `id`, `version`, `creator` and `created_at` cannot be
/// expressed here and therefore never change through a patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldPatch {
    pub status: Option<RecordStatus>,
    pub sort: Option<i32>,
    pub remark: Option<String>,
    pub payload: Map<String, Value>,
}

impl FieldPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a payload field.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(field.into(), value.into());
        self
    }

    /// Set the status column.
    pub fn status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the sort column.
    pub fn sort(mut self, sort: i32) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the remark column.
    pub fn remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    /// True when applying the patch would only bump version and modifier.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.sort.is_none()
            && self.remark.is_none()
            && self.payload.is_empty()
    }

    /// Apply the patch to a record in place, bumping the version by one.
    ///
    /// The record is left untouched when the payload merge fails.
    pub fn apply<P: Payload>(
        &self,
        record: &mut Record<P>,
        modifier: &str,
        at: Timestamp,
    ) -> Result<(), ValidationError> {
        if !self.payload.is_empty() {
            record.payload = merge_payload(&record.payload, &self.payload)?;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(sort) = self.sort {
            record.sort = sort;
        }
        if let Some(remark) = &self.remark {
            record.remark = Some(remark.clone());
        }
        record.version += 1;
        record.modifier = modifier.to_string();
        record.updated_at = at;
        Ok(())
    }
}

/// Merge top-level JSON fields into a payload, producing a new payload.
pub fn merge_payload<P: Payload>(
    payload: &P,
    fields: &Map<String, Value>,
) -> Result<P, ValidationError> {
    let mut value = serde_json::to_value(payload).map_err(|e| ValidationError::InvalidValue {
        field: "payload".to_string(),
        reason: e.to_string(),
    })?;

    let object = value
        .as_object_mut()
        .ok_or_else(|| ValidationError::InvalidValue {
            field: "payload".to_string(),
            reason: format!("{} payload is not a JSON object", P::kind()),
        })?;

    for (field, v) in fields {
        if !object.contains_key(field) {
            return Err(ValidationError::InvalidValue {
                field: field.clone(),
                reason: format!("unknown {} field", P::kind()),
            });
        }
        object.insert(field.clone(), v.clone());
    }

    serde_json::from_value(value).map_err(|e| ValidationError::InvalidValue {
        field: "payload".to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::UserProfile;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_user() -> Record<UserProfile> {
        Record::create(
            UserProfile {
                username: "alice".to_string(),
                nickname: "Alice".to_string(),
                email: Some("alice@example.com".to_string()),
                phone: None,
                dept_id: None,
            },
            "admin",
        )
    }

    #[test]
    fn test_create_starts_at_initial_version() {
        let record = sample_user();
        assert_eq!(record.version, INITIAL_VERSION);
        assert_eq!(record.creator, "admin");
        assert_eq!(record.modifier, "admin");
        assert_eq!(record.kind(), EntityKind::User);
    }

    #[test]
    fn test_apply_merges_payload_and_bumps_version() {
        let mut record = sample_user();
        let at = Utc::now();
        let patch = FieldPatch::new()
            .set("nickname", "Al")
            .status(RecordStatus::Disabled)
            .remark("renamed");

        patch.apply(&mut record, "operator", at).unwrap();

        assert_eq!(record.payload.nickname, "Al");
        assert_eq!(record.payload.username, "alice");
        assert_eq!(record.status, RecordStatus::Disabled);
        assert_eq!(record.remark.as_deref(), Some("renamed"));
        assert_eq!(record.version, 2);
        assert_eq!(record.modifier, "operator");
        assert_eq!(record.creator, "admin");
        assert_eq!(record.updated_at, at);
    }

    #[test]
    fn test_apply_rejects_unknown_field_without_mutating() {
        let mut record = sample_user();
        let before = record.clone();
        let patch = FieldPatch::new().set("password_hash", "x");

        assert!(patch.apply(&mut record, "operator", Utc::now()).is_err());
        assert_eq!(record, before);
    }

    #[test]
    fn test_apply_rejects_type_mismatch() {
        let mut record = sample_user();
        let patch = FieldPatch::new().set("username", json!(42));
        assert!(patch.apply(&mut record, "operator", Utc::now()).is_err());
        assert_eq!(record.version, INITIAL_VERSION);
    }

    #[test]
    fn test_empty_patch_detection() {
        assert!(FieldPatch::new().is_empty());
        assert!(!FieldPatch::new().sort(3).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Every successful apply increments the version by exactly one.
        #[test]
        fn prop_apply_increments_version_by_one(
            nicknames in proptest::collection::vec("[a-z]{1,12}", 1..10)
        ) {
            let mut record = sample_user();
            for (i, nickname) in nicknames.iter().enumerate() {
                let patch = FieldPatch::new().set("nickname", nickname.as_str());
                patch.apply(&mut record, "op", Utc::now()).unwrap();
                prop_assert_eq!(record.version, INITIAL_VERSION + i as i64 + 1);
                prop_assert_eq!(&record.payload.nickname, nickname);
            }
        }
    }
}
