//! Keystone Core - Record Types
//!
//! Pure data structures shared by every other crate: identifiers, the
//! versioned record envelope, field patches, entity payloads and the error
//! taxonomy. No I/O happens here.

pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod record;

pub use entities::{AccessPolicy, Bucket, DataScope, Dept, DictItem, Menu, MenuType, Role, UserProfile};
pub use enums::{AuditAction, EntityKind, RecordStatus};
pub use error::{
    CacheError, ChallengeError, ConfigError, KeystoneError, KeystoneResult, StoreError,
    ValidationError,
};
pub use identity::{ActorId, RecordId, Timestamp};
pub use record::{merge_payload, FieldPatch, Payload, Record, INITIAL_VERSION};
