//! Command handlers for the organization context.
//!
//! Each handler runs as a guarded operation. Inside it, one store transaction
//! applies the document changes and stages the outbox event, so the event
//! exists if and only if the change committed.

use std::sync::Arc;

use sentinel_core::clock::Clock;
use sentinel_core::error::{AppError, DomainError, ServiceError};
use sentinel_core::event::EventMeta;
use sentinel_core::store::{StoreTransaction, TransactionalStore, run_transaction};
use sentinel_outbox::writer::OutboxWriter;
use sentinel_resilience::executor::{ExecuteOptions, GuardedExecutor};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::domain::commands::{
    ACCEPT_INVITE_OPERATION, AcceptInvite, INVITE_MEMBER_OPERATION, InviteMember,
    REMOVE_MEMBER_OPERATION, RemoveMember,
};
use crate::domain::events::{
    INVITE_ACCEPTED_TOPIC, INVITE_CREATED_TOPIC, InviteAccepted, InviteCreated,
    MEMBER_REMOVED_TOPIC, MemberRemoved,
};
use crate::domain::model::{
    INVITE_EMAILS, INVITES, Invite, InviteStatus, MEMBERS, Member, Role, invite_email_key,
    member_key, normalize_email, require_id,
};

/// Everything the handlers need, shared across requests.
#[derive(Clone)]
pub struct OrgContext {
    /// Guards every handler.
    pub executor: GuardedExecutor,
    /// Primary store.
    pub store: Arc<dyn TransactionalStore>,
    /// Stages outbox events.
    pub writer: OutboxWriter,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for OrgContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrgContext")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

async fn load<T: DeserializeOwned>(
    tx: &mut dyn StoreTransaction,
    collection: &str,
    id: &str,
) -> Result<Option<T>, DomainError> {
    tx.get_document(collection, id)
        .await?
        .map(|body| {
            serde_json::from_value(body).map_err(|e| {
                DomainError::Infrastructure(format!("corrupt {collection} document {id}: {e}"))
            })
        })
        .transpose()
}

async fn save<T: Serialize>(
    tx: &mut dyn StoreTransaction,
    collection: &str,
    id: &str,
    value: &T,
) -> Result<(), DomainError> {
    let body = serde_json::to_value(value)
        .map_err(|e| {
            DomainError::Infrastructure(format!("failed to serialize {collection}: {e}"))
        })?;
    tx.put_document(collection, id, body).await
}

fn payload<T: Serialize>(event: &T) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(event)
        .map_err(|e| DomainError::Infrastructure(format!("failed to serialize event: {e}")))
}

/// Handles [`InviteMember`]: stores a pending invite and publishes
/// `invite.created`.
///
/// # Errors
///
/// `INVALID_INPUT` for a malformed email or role, `ALREADY_EXISTS` if the
/// email already has a pending invite, plus the executor's guard failures.
pub async fn handle_invite_member(
    command: InviteMember,
    ctx: &OrgContext,
    options: ExecuteOptions,
) -> Result<Invite, AppError> {
    let store = Arc::clone(&ctx.store);
    let writer = ctx.writer.clone();
    let now = ctx.clock.now();

    ctx.executor
        .execute_with(INVITE_MEMBER_OPERATION, options, move || async move {
            require_id("orgId", &command.org_id)?;
            let email = normalize_email(&command.email)?;
            let role: Role = command.role.parse()?;

            run_transaction(store.as_ref(), move |tx| {
                Box::pin(async move {
                    let email_key = invite_email_key(&command.org_id, &email);
                    if tx.get_document(INVITE_EMAILS, &email_key).await?.is_some() {
                        return Err(DomainError::AlreadyExists(format!(
                            "pending invite for {email}"
                        ))
                        .into());
                    }

                    let invite = Invite {
                        id: Uuid::now_v7().to_string(),
                        org_id: command.org_id.clone(),
                        email: email.clone(),
                        role,
                        status: InviteStatus::Pending,
                        invited_by: command.actor_id.clone(),
                        created_at: now,
                        accepted_by: None,
                    };
                    save(tx, INVITES, &invite.id, &invite).await?;
                    tx.put_document(INVITE_EMAILS, &email_key, json!({ "inviteId": invite.id }))
                        .await?;

                    let event = InviteCreated {
                        invite_id: invite.id.clone(),
                        org_id: invite.org_id.clone(),
                        email: invite.email.clone(),
                        role,
                    };
                    writer
                        .create_event(
                            tx,
                            INVITE_CREATED_TOPIC,
                            payload(&event)?,
                            EventMeta::new(command.org_id, command.actor_id),
                        )
                        .await?;

                    info!(invite_id = %invite.id, org_id = %invite.org_id, "invite created");
                    Ok::<_, ServiceError>(invite)
                })
            })
            .await
        })
        .await
}

/// Handles [`AcceptInvite`]: marks the invite accepted, adds the member and
/// publishes `invite.accepted`.
///
/// # Errors
///
/// `NOT_FOUND` if the invite does not exist in the organization,
/// `FAILED_PRECONDITION` if it was already accepted, `ALREADY_EXISTS` if the
/// user is already a member, plus the executor's guard failures.
pub async fn handle_accept_invite(
    command: AcceptInvite,
    ctx: &OrgContext,
    options: ExecuteOptions,
) -> Result<Member, AppError> {
    let store = Arc::clone(&ctx.store);
    let writer = ctx.writer.clone();
    let now = ctx.clock.now();

    ctx.executor
        .execute_with(ACCEPT_INVITE_OPERATION, options, move || async move {
            require_id("userId", &command.user_id)?;

            run_transaction(store.as_ref(), move |tx| {
                Box::pin(async move {
                    let mut invite: Invite = load(tx, INVITES, &command.invite_id)
                        .await?
                        .filter(|invite: &Invite| invite.org_id == command.org_id)
                        .ok_or_else(|| DomainError::NotFound {
                            entity: "invite",
                            id: command.invite_id.clone(),
                        })?;
                    if invite.status != InviteStatus::Pending {
                        return Err(DomainError::Precondition(format!(
                            "invite {} was already accepted",
                            invite.id
                        ))
                        .into());
                    }

                    let key = member_key(&command.org_id, &command.user_id);
                    if tx.get_document(MEMBERS, &key).await?.is_some() {
                        return Err(DomainError::AlreadyExists(format!(
                            "member {} in org {}",
                            command.user_id, command.org_id
                        ))
                        .into());
                    }

                    invite.status = InviteStatus::Accepted;
                    invite.accepted_by = Some(command.user_id.clone());
                    save(tx, INVITES, &invite.id, &invite).await?;
                    tx.delete_document(
                        INVITE_EMAILS,
                        &invite_email_key(&invite.org_id, &invite.email),
                    )
                    .await?;

                    let member = Member {
                        org_id: command.org_id.clone(),
                        user_id: command.user_id.clone(),
                        role: invite.role,
                        joined_at: now,
                    };
                    save(tx, MEMBERS, &key, &member).await?;

                    let event = InviteAccepted {
                        invite_id: invite.id.clone(),
                        org_id: member.org_id.clone(),
                        user_id: member.user_id.clone(),
                        role: member.role,
                    };
                    writer
                        .create_event(
                            tx,
                            INVITE_ACCEPTED_TOPIC,
                            payload(&event)?,
                            EventMeta::new(command.org_id, Some(command.user_id)),
                        )
                        .await?;

                    info!(invite_id = %invite.id, user_id = %member.user_id, "invite accepted");
                    Ok::<_, ServiceError>(member)
                })
            })
            .await
        })
        .await
}

/// Handles [`RemoveMember`]: deletes the membership and publishes
/// `member.removed`.
///
/// # Errors
///
/// `NOT_FOUND` if the user is not a member, plus the executor's guard
/// failures.
pub async fn handle_remove_member(
    command: RemoveMember,
    ctx: &OrgContext,
    options: ExecuteOptions,
) -> Result<MemberRemoved, AppError> {
    let store = Arc::clone(&ctx.store);
    let writer = ctx.writer.clone();

    ctx.executor
        .execute_with(REMOVE_MEMBER_OPERATION, options, move || async move {
            run_transaction(store.as_ref(), move |tx| {
                Box::pin(async move {
                    let key = member_key(&command.org_id, &command.user_id);
                    if !tx.delete_document(MEMBERS, &key).await? {
                        return Err(DomainError::NotFound {
                            entity: "member",
                            id: command.user_id.clone(),
                        }
                        .into());
                    }

                    let event = MemberRemoved {
                        org_id: command.org_id.clone(),
                        user_id: command.user_id.clone(),
                        removed_by: command.actor_id.clone(),
                    };
                    writer
                        .create_event(
                            tx,
                            MEMBER_REMOVED_TOPIC,
                            payload(&event)?,
                            EventMeta::new(command.org_id, command.actor_id),
                        )
                        .await?;

                    info!(org_id = %event.org_id, user_id = %event.user_id, "member removed");
                    Ok::<_, ServiceError>(event)
                })
            })
            .await
        })
        .await
}
