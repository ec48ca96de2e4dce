//! Invites, members and their storage keys.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sentinel_core::error::DomainError;
use serde::{Deserialize, Serialize};

/// Collection holding [`Invite`] documents keyed by invite id.
pub const INVITES: &str = "invites";

/// Collection mapping `{org_id}:{email}` to the pending invite's id.
pub const INVITE_EMAILS: &str = "invite_emails";

/// Collection holding [`Member`] documents keyed by `{org_id}:{user_id}`.
pub const MEMBERS: &str = "members";

/// Key in [`INVITE_EMAILS`].
#[must_use]
pub fn invite_email_key(org_id: &str, email: &str) -> String {
    format!("{org_id}:{email}")
}

/// Key in [`MEMBERS`].
#[must_use]
pub fn member_key(org_id: &str, user_id: &str) -> String {
    format!("{org_id}:{user_id}")
}

/// Access level within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full control.
    Admin,
    /// Regular member.
    Member,
    /// Read-only.
    Viewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Viewer => "viewer",
        })
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            "viewer" => Ok(Self::Viewer),
            other => Err(DomainError::Validation(format!("unknown role: {other:?}"))),
        }
    }
}

/// Invite lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteStatus {
    /// Waiting for the invitee.
    Pending,
    /// The invitee joined.
    Accepted,
}

/// An invitation to join an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    /// Invite identifier.
    pub id: String,
    /// The organization.
    pub org_id: String,
    /// Normalized invitee email.
    pub email: String,
    /// Role granted on acceptance.
    pub role: Role,
    /// Lifecycle status.
    pub status: InviteStatus,
    /// Who sent it.
    pub invited_by: Option<String>,
    /// When it was sent.
    pub created_at: DateTime<Utc>,
    /// Who accepted it.
    pub accepted_by: Option<String>,
}

/// A user's membership in an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// The organization.
    pub org_id: String,
    /// The user.
    pub user_id: String,
    /// Their role.
    pub role: Role,
    /// When they joined.
    pub joined_at: DateTime<Utc>,
}

/// Validates and lowercases an email address.
///
/// # Errors
///
/// Returns `DomainError::Validation` unless the address has exactly one `@`
/// with a non-empty local part and a dotted domain, and no whitespace.
pub fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_ascii_lowercase();
    let invalid = || DomainError::Validation(format!("invalid email address: {raw:?}"));

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let domain_ok = !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.');
    if local.is_empty() || !domain_ok {
        return Err(invalid());
    }
    Ok(email)
}

/// Rejects blank identifiers.
///
/// # Errors
///
/// Returns `DomainError::Validation` naming `field`.
pub fn require_id(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        Err(DomainError::Validation(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}
