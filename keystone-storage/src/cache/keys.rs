//! Cache key namespace.
//!
//! Three disjoint key spaces share one cache:
//!
//! - `<domain>:<kind>:info:<id>` entity entries (positive or negative)
//! - `<domain>:captcha:<subject>:<purpose>` challenge records
//! - `token:blacklist:<token>` deny-list entries
//!
//! The formats are part of the interoperability surface: other processes
//! reading or invalidating the same cache rely on them byte for byte.

use keystone_core::{EntityKind, RecordId};

/// Segment separating entity kind and id in entity keys.
const INFO_SEGMENT: &str = "info";

/// Segment naming the challenge key space.
const CAPTCHA_SEGMENT: &str = "captcha";

/// Prefix of deny-list keys. Not domain-scoped.
pub const DENY_LIST_PREFIX: &str = "token:blacklist";

/// Domain-scoped key builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyNamespace {
    domain: String,
}

impl KeyNamespace {
    /// Create a namespace for the given domain prefix.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Key for an entity entry: `<domain>:<kind>:info:<id>`.
    pub fn entity_info(&self, kind: EntityKind, id: &RecordId) -> String {
        format!("{}:{}:{}:{}", self.domain, kind.as_str(), INFO_SEGMENT, id)
    }

    /// Prefix shared by every entity entry of one kind.
    pub fn entity_prefix(&self, kind: EntityKind) -> String {
        format!("{}:{}:{}:", self.domain, kind.as_str(), INFO_SEGMENT)
    }

    /// Key for a challenge record: `<domain>:captcha:<subject>:<purpose>`.
    pub fn captcha(&self, subject: &str, purpose: &str) -> String {
        format!("{}:{}:{}:{}", self.domain, CAPTCHA_SEGMENT, subject, purpose)
    }

    /// Prefix shared by every challenge record.
    pub fn captcha_prefix(&self) -> String {
        format!("{}:{}:", self.domain, CAPTCHA_SEGMENT)
    }
}

/// Key for a deny-list entry: `token:blacklist:<token>`.
pub fn deny_list_key(token: &str) -> String {
    format!("{}:{}", DENY_LIST_PREFIX, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_entity_key_format() {
        let keys = KeyNamespace::new("admin");
        assert_eq!(
            keys.entity_info(EntityKind::User, &RecordId::new("X")),
            "admin:user:info:X"
        );
        assert_eq!(keys.entity_prefix(EntityKind::Dict), "admin:dict:info:");
    }

    #[test]
    fn test_captcha_key_format() {
        let keys = KeyNamespace::new("admin");
        assert_eq!(keys.captcha("13800000000", "login"), "admin:captcha:13800000000:login");
    }

    #[test]
    fn test_deny_list_key_format() {
        assert_eq!(deny_list_key("abc.def"), "token:blacklist:abc.def");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Entity keys never land in the challenge key space, whatever the id.
        #[test]
        fn prop_entity_and_captcha_spaces_are_disjoint(
            id in "[a-z0-9:]{1,24}",
            subject in "[a-z0-9]{1,12}",
            purpose in "[a-z]{1,8}",
        ) {
            let keys = KeyNamespace::new("admin");
            let captcha_prefix = keys.captcha_prefix();
            for kind in EntityKind::ALL {
                let entity = keys.entity_info(kind, &RecordId::new(id.clone()));
                prop_assert!(!entity.starts_with(&captcha_prefix));
                prop_assert_ne!(&entity, &keys.captcha(&subject, &purpose));
            }
        }

        /// Domain-scoped keys never collide with deny-list keys.
        #[test]
        fn prop_deny_list_space_is_disjoint(token in "[A-Za-z0-9._-]{1,40}") {
            let keys = KeyNamespace::new("admin");
            let deny = deny_list_key(&token);
            prop_assert!(!deny.starts_with(&keys.captcha_prefix()));
            for kind in EntityKind::ALL {
                prop_assert!(!deny.starts_with(&keys.entity_prefix(kind)));
            }
        }
    }
}
