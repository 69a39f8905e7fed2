//! Serde tests for core model types.
//!
//! These check that records decode from the sparse JSON the API and the
//! settings file actually produce, relying on `#[serde(default)]` fields.

use crate::{AccountInfo, Identity, PersonInfo, ProjectInfo, SnapshotState, TodoInfo};

// ============================================================================
// Sparse Payloads
// ============================================================================

#[test]
fn test_todo_defaults_for_missing_fields() {
    let todo: TodoInfo = serde_json::from_str(r#"{"id": 7, "content": "Ship it"}"#).unwrap();
    assert_eq!(todo.id, 7);
    assert!(!todo.completed);
    assert!(todo.due_on.is_none());
    assert!(todo.assignees.is_empty());
}

#[test]
fn test_person_defaults_for_missing_fields() {
    let person: PersonInfo = serde_json::from_str(r#"{"id": 3, "name": "Grace"}"#).unwrap();
    assert_eq!(person.name, "Grace");
    assert!(person.email.is_empty());
    assert!(!person.admin);
}

#[test]
fn test_project_requires_timestamp() {
    let missing = serde_json::from_str::<ProjectInfo>(
        r#"{"id": 1, "name": "HQ", "account_id": "99"}"#,
    );
    assert!(missing.is_err());

    let project: ProjectInfo = serde_json::from_str(
        r#"{"id": 1, "name": "HQ", "account_id": "99", "updated_at": "2024-05-01T12:00:00Z"}"#,
    )
    .unwrap();
    assert_eq!(project.account_id, "99");
    assert!(project.account_name.is_empty());
}

// ============================================================================
// Enums and Identity
// ============================================================================

#[test]
fn test_snapshot_state_lowercase() {
    assert_eq!(serde_json::to_string(&SnapshotState::Stale).unwrap(), r#""stale""#);
    let parsed: SnapshotState = serde_json::from_str(r#""error""#).unwrap();
    assert_eq!(parsed, SnapshotState::Error);
    assert!(serde_json::from_str::<SnapshotState>(r#""Stale""#).is_err());
}

#[test]
fn test_identity_and_account_decode() {
    let identity: Identity = serde_json::from_str(
        r#"{"id": 5, "first_name": "Ada", "last_name": "L", "email_address": "ada@example.com"}"#,
    )
    .unwrap();
    assert_eq!(identity.id, 5);

    let account: AccountInfo = serde_json::from_str(r#"{"id": "42", "name": "Acme"}"#).unwrap();
    assert_eq!(account, AccountInfo::new("42", "Acme"));
}
