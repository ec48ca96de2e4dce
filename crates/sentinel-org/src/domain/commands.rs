//! Commands for the organization context.

/// Guarded operation name for [`InviteMember`].
pub const INVITE_MEMBER_OPERATION: &str = "org.invite_member";

/// Guarded operation name for [`AcceptInvite`].
pub const ACCEPT_INVITE_OPERATION: &str = "org.accept_invite";

/// Guarded operation name for [`RemoveMember`].
pub const REMOVE_MEMBER_OPERATION: &str = "org.remove_member";

/// Invite someone to an organization by email.
#[derive(Debug, Clone)]
pub struct InviteMember {
    /// The organization.
    pub org_id: String,
    /// Invitee email, validated and lowercased by the handler.
    pub email: String,
    /// Role granted on acceptance: `admin`, `member` or `viewer`.
    pub role: String,
    /// Who sent the invite.
    pub actor_id: Option<String>,
}

/// Accept a pending invite.
#[derive(Debug, Clone)]
pub struct AcceptInvite {
    /// The organization.
    pub org_id: String,
    /// The invite being accepted.
    pub invite_id: String,
    /// The user joining.
    pub user_id: String,
}

/// Remove a member from an organization.
#[derive(Debug, Clone)]
pub struct RemoveMember {
    /// The organization.
    pub org_id: String,
    /// The member being removed.
    pub user_id: String,
    /// Who removed them.
    pub actor_id: Option<String>,
}
