//! Enum types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Entity kind discriminator.
///
/// Each kind owns one table in the durable store and one segment of the
/// cache key namespace (`<domain>:<kind>:info:<id>`). The set is closed on
/// purpose: it cannot collide with the `captcha` segment used by challenge
/// records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Role,
    Menu,
    Dept,
    Dict,
    Bucket,
}

impl EntityKind {
    /// All entity kinds, in registration order.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::User,
        EntityKind::Role,
        EntityKind::Menu,
        EntityKind::Dept,
        EntityKind::Dict,
        EntityKind::Bucket,
    ];

    /// Key-namespace segment for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Role => "role",
            EntityKind::Menu => "menu",
            EntityKind::Dept => "dept",
            EntityKind::Dict => "dict",
            EntityKind::Bucket => "bucket",
        }
    }

    /// Durable-store table holding records of this kind.
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::User => "sys_user",
            EntityKind::Role => "sys_role",
            EntityKind::Menu => "sys_menu",
            EntityKind::Dept => "sys_dept",
            EntityKind::Dict => "sys_dict",
            EntityKind::Bucket => "sys_bucket",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "entity_kind".to_string(),
                reason: format!("unknown entity kind '{}'", s),
            })
    }
}

/// Lifecycle status shared by every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Enabled,
    Disabled,
}

impl RecordStatus {
    /// Column encoding used by the durable store.
    pub fn as_i16(&self) -> i16 {
        match self {
            RecordStatus::Enabled => 1,
            RecordStatus::Disabled => 2,
        }
    }

    /// Decode the column encoding.
    pub fn from_i16(value: i16) -> Result<Self, ValidationError> {
        match value {
            1 => Ok(RecordStatus::Enabled),
            2 => Ok(RecordStatus::Disabled),
            other => Err(ValidationError::InvalidValue {
                field: "status".to_string(),
                reason: format!("unknown status code {}", other),
            }),
        }
    }
}

/// Action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("captcha".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_entity_kind_serde_matches_key_segment() {
        let json = serde_json::to_string(&EntityKind::Bucket).unwrap();
        assert_eq!(json, "\"bucket\"");
    }

    #[test]
    fn test_table_names_are_distinct() {
        let mut names: Vec<_> = EntityKind::ALL.iter().map(|k| k.table_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), EntityKind::ALL.len());
    }

    #[test]
    fn test_record_status_column_encoding() {
        assert_eq!(RecordStatus::from_i16(1).unwrap(), RecordStatus::Enabled);
        assert_eq!(RecordStatus::from_i16(RecordStatus::Disabled.as_i16()).unwrap(), RecordStatus::Disabled);
        assert!(RecordStatus::from_i16(0).is_err());
    }
}
