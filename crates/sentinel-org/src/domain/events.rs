//! Outbox event payloads published by the organization context.

use serde::{Deserialize, Serialize};

use crate::domain::model::Role;

/// Topic for [`InviteCreated`].
pub const INVITE_CREATED_TOPIC: &str = "invite.created";

/// Topic for [`InviteAccepted`].
pub const INVITE_ACCEPTED_TOPIC: &str = "invite.accepted";

/// Topic for [`MemberRemoved`].
pub const MEMBER_REMOVED_TOPIC: &str = "member.removed";

/// Every topic this context publishes. Workers validate against it at startup.
pub const ORG_TOPICS: &[&str] = &[
    INVITE_CREATED_TOPIC,
    INVITE_ACCEPTED_TOPIC,
    MEMBER_REMOVED_TOPIC,
];

/// An invite was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCreated {
    /// The invite.
    pub invite_id: String,
    /// The organization.
    pub org_id: String,
    /// Invitee email.
    pub email: String,
    /// Role granted on acceptance.
    pub role: Role,
}

/// An invite was accepted and the user joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteAccepted {
    /// The invite.
    pub invite_id: String,
    /// The organization.
    pub org_id: String,
    /// The new member.
    pub user_id: String,
    /// Their role.
    pub role: Role,
}

/// A member was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRemoved {
    /// The organization.
    pub org_id: String,
    /// The removed member.
    pub user_id: String,
    /// Who removed them.
    pub removed_by: Option<String>,
}
