//! Payload structures for the administrative entities.
//!
//! These carry no behavior beyond declaring their [`EntityKind`]; the
//! versioning, caching and persistence protocol lives in `keystone-storage`.

use serde::{Deserialize, Serialize};

use crate::{EntityKind, Payload, RecordId};

/// Back-office user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub nickname: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub dept_id: Option<RecordId>,
}

impl Payload for UserProfile {
    fn kind() -> EntityKind {
        EntityKind::User
    }
}

/// Data visibility granted by a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataScope {
    #[default]
    All,
    Dept,
    DeptAndChildren,
    SelfOnly,
    Custom,
}

/// Role grouping permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub code: String,
    pub data_scope: DataScope,
}

impl Payload for Role {
    fn kind() -> EntityKind {
        EntityKind::Role
    }
}

/// Menu node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuType {
    Directory,
    Page,
    Button,
}

/// Navigation menu entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    pub title: String,
    pub path: Option<String>,
    pub parent_id: Option<RecordId>,
    pub menu_type: MenuType,
    pub permission: Option<String>,
}

impl Payload for Menu {
    fn kind() -> EntityKind {
        EntityKind::Menu
    }
}

/// Organisational department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dept {
    pub name: String,
    pub parent_id: Option<RecordId>,
    pub leader: Option<String>,
}

impl Payload for Dept {
    fn kind() -> EntityKind {
        EntityKind::Dept
    }
}

/// Dictionary entry (label/value pair within a dictionary type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictItem {
    pub dict_type: String,
    pub label: String,
    pub value: String,
}

impl Payload for DictItem {
    fn kind() -> EntityKind {
        EntityKind::Dict
    }
}

/// Object-storage bucket access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    #[default]
    Private,
    PublicRead,
    PublicReadWrite,
}

/// Object-storage bucket registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub endpoint: String,
    pub region: Option<String>,
    pub access_policy: AccessPolicy,
}

impl Payload for Bucket {
    fn kind() -> EntityKind {
        EntityKind::Bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_kinds() {
        assert_eq!(UserProfile::kind(), EntityKind::User);
        assert_eq!(Role::kind(), EntityKind::Role);
        assert_eq!(Menu::kind(), EntityKind::Menu);
        assert_eq!(Dept::kind(), EntityKind::Dept);
        assert_eq!(DictItem::kind(), EntityKind::Dict);
        assert_eq!(Bucket::kind(), EntityKind::Bucket);
    }

    #[test]
    fn test_optional_fields_serialize_as_null() {
        let dept = Dept {
            name: "R&D".to_string(),
            parent_id: None,
            leader: None,
        };
        let value = serde_json::to_value(&dept).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("parent_id"));
        assert!(object["leader"].is_null());
    }
}
