//! Notification Dispatcher
//!
//! Every notification is written to the store before any email is attempted.
//! Email is best effort: a transport failure is logged and leaves
//! `email_sent = false` on the stored row.

pub mod email;

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use email::{
    EmailError, EmailMessage, EmailTransport, LogEmailTransport, MemoryEmailTransport,
    RelayEmailTransport,
};

use crate::error::{PortalError, PortalResult};
use crate::models::{LinkType, MemberKind, Notification, NotificationType, Project, User};
use crate::permissions::Role;
use crate::store::{PortalStore, UserQuery};

/// Default inbox page size
pub const INBOX_LIMIT: i64 = 50;

/// Content of a notification before it is addressed to a user
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub link: Option<(LinkType, Uuid)>,
}

impl NotificationDraft {
    pub fn new(
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            title: title.into(),
            message: message.into(),
            link: None,
        }
    }

    pub fn link(mut self, link_type: LinkType, id: Uuid) -> Self {
        self.link = Some((link_type, id));
        self
    }
}

pub struct NotificationDispatcher {
    store: Arc<dyn PortalStore>,
    email: Arc<dyn EmailTransport>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn PortalStore>, email: Arc<dyn EmailTransport>) -> Self {
        Self { store, email }
    }

    /// Record a notification for `recipient` and email it if they opted in
    pub async fn create_notification(
        &self,
        recipient: &User,
        draft: &NotificationDraft,
    ) -> PortalResult<Notification> {
        let mut notification = Notification::new(
            recipient.user_id,
            draft.notification_type,
            draft.title.clone(),
            draft.message.clone(),
            draft.link,
        );
        self.store.insert_notification(&notification).await?;

        if recipient.is_active && recipient.email_notifications {
            let message = EmailMessage {
                to: recipient.email.clone(),
                subject: format!("[GEA Portal] {}", draft.title),
                body: email_body(recipient, draft),
            };
            match self.email.send(&message).await {
                Ok(()) => {
                    let sent_at = Utc::now();
                    self.store
                        .mark_email_sent(notification.notification_id, sent_at)
                        .await?;
                    notification.email_sent = true;
                    notification.email_sent_at = Some(sent_at);
                }
                Err(e) => {
                    warn!(
                        notification_id = %notification.notification_id,
                        user = %recipient.username,
                        "Email delivery failed: {}",
                        e
                    );
                }
            }
        }

        debug!(
            notification_type = draft.notification_type.as_str(),
            user = %recipient.username,
            "Notification created"
        );
        Ok(notification)
    }

    /// Notify a user by id
    pub async fn notify_user(
        &self,
        user_id: Uuid,
        draft: &NotificationDraft,
    ) -> PortalResult<Notification> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| PortalError::not_found("user", user_id))?;
        self.create_notification(&user, draft).await
    }

    /// Fan out to every recipient. A failed insert is logged and skipped so
    /// one bad row does not starve the rest. Returns how many were recorded.
    pub async fn notify_many(&self, recipients: &[User], draft: &NotificationDraft) -> usize {
        let mut delivered = 0;
        for recipient in recipients {
            match self.create_notification(recipient, draft).await {
                Ok(_) => delivered += 1,
                Err(e) => warn!(
                    user = %recipient.username,
                    notification_type = draft.notification_type.as_str(),
                    "Failed to record notification: {}",
                    e
                ),
            }
        }
        if delivered > 0 {
            info!(
                notification_type = draft.notification_type.as_str(),
                recipients = delivered,
                "Notifications dispatched"
            );
        }
        delivered
    }

    // ── Recipient sets ──

    /// Active users of the project's GLAB, assigned assessors and experts and
    /// active GEA users, deduplicated, minus `exclude`
    pub async fn project_participants(
        &self,
        project: &Project,
        exclude: Option<Uuid>,
    ) -> PortalResult<Vec<User>> {
        let mut users = self
            .store
            .list_users(&UserQuery::active().in_glab(project.glab_id))
            .await?;

        for member in self.store.project_members(project.project_id).await? {
            if !matches!(
                member.kind,
                MemberKind::Assessor | MemberKind::TechnicalExpert
            ) {
                continue;
            }
            if let Some(user) = self.store.get_user(member.user_id).await? {
                if user.is_active {
                    users.push(user);
                }
            }
        }

        users.extend(self.gea_reviewers().await?);
        Ok(dedup_users(users, exclude))
    }

    /// Active central-authority users
    pub async fn gea_reviewers(&self) -> PortalResult<Vec<User>> {
        self.store
            .list_users(&UserQuery::active().with_roles(&[Role::GeaAdmin, Role::GeaStaff]))
            .await
    }

    /// Active administrators of one GLAB
    pub async fn glab_admins(&self, glab_id: Uuid) -> PortalResult<Vec<User>> {
        self.store
            .list_users(
                &UserQuery::active()
                    .with_roles(&[Role::GlabAdmin])
                    .in_glab(glab_id),
            )
            .await
    }

    /// Active users of one GLAB, or of every GLAB when `glab_id` is `None`
    pub async fn glab_users(&self, glab_id: Option<Uuid>) -> PortalResult<Vec<User>> {
        let mut query = UserQuery::active().with_roles(&[Role::GlabAdmin, Role::GlabAssessor]);
        if let Some(glab_id) = glab_id {
            query = query.in_glab(glab_id);
        }
        self.store.list_users(&query).await
    }

    // ── Inbox ──

    /// Latest notifications for the user, newest first
    pub async fn inbox(&self, user_id: Uuid) -> PortalResult<Vec<Notification>> {
        self.store.list_notifications(user_id, INBOX_LIMIT).await
    }

    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> PortalResult<()> {
        let notification = self
            .store
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| PortalError::not_found("notification", notification_id))?;
        if notification.user_id != user_id {
            return Err(PortalError::denied("Notification belongs to another user"));
        }
        if !self
            .store
            .mark_read(notification_id, user_id, Utc::now())
            .await?
        {
            return Err(PortalError::denied("Notification belongs to another user"));
        }
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> PortalResult<u64> {
        self.store.mark_all_read(user_id, Utc::now()).await
    }

    pub async fn unread_count(&self, user_id: Uuid) -> PortalResult<i64> {
        self.store.unread_count(user_id).await
    }
}

fn email_body(recipient: &User, draft: &NotificationDraft) -> String {
    format!(
        "Hello {},\n\n{}\n\nYou can switch off these emails in your portal profile.",
        recipient.display_name(),
        draft.message
    )
}

fn dedup_users(users: Vec<User>, exclude: Option<Uuid>) -> Vec<User> {
    let mut seen = HashSet::new();
    users
        .into_iter()
        .filter(|u| Some(u.user_id) != exclude && seen.insert(u.user_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn setup(transport: MemoryEmailTransport) -> (Arc<MemoryStore>, NotificationDispatcher) {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = NotificationDispatcher::new(store.clone(), Arc::new(transport));
        (store, dispatcher)
    }

    fn draft() -> NotificationDraft {
        NotificationDraft::new(
            NotificationType::AssessorAssigned,
            "Assessor assigned",
            "You have been assigned to GL-001-2025-0001",
        )
    }

    #[tokio::test]
    async fn test_email_sent_when_opted_in() {
        let transport = MemoryEmailTransport::new();
        let (store, dispatcher) = setup(transport.clone()).await;
        let user = User::new("assessor", "assessor@lab.test", Role::GlabAssessor);
        store.insert_user(&user).await.unwrap();

        let n = dispatcher.create_notification(&user, &draft()).await.unwrap();

        assert!(n.email_sent);
        let stored = store.get_notification(n.notification_id).await.unwrap().unwrap();
        assert!(stored.email_sent);
        assert!(stored.email_sent_at.is_some());
        assert_eq!(transport.sent()[0].to, "assessor@lab.test");
    }

    #[tokio::test]
    async fn test_email_failure_keeps_notification() {
        let (store, dispatcher) = setup(MemoryEmailTransport::failing()).await;
        let user = User::new("assessor", "assessor@lab.test", Role::GlabAssessor);
        store.insert_user(&user).await.unwrap();

        let n = dispatcher.create_notification(&user, &draft()).await.unwrap();

        let stored = store.get_notification(n.notification_id).await.unwrap().unwrap();
        assert!(!stored.email_sent);
        assert_eq!(store.unread_count(user.user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_opted_out_user_gets_no_email() {
        let transport = MemoryEmailTransport::new();
        let (store, dispatcher) = setup(transport.clone()).await;
        let mut user = User::new("quiet", "quiet@lab.test", Role::GlabAdmin);
        user.email_notifications = false;
        store.insert_user(&user).await.unwrap();

        let n = dispatcher.create_notification(&user, &draft()).await.unwrap();
        assert!(!n.email_sent);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_of_foreign_notification_is_denied() {
        let (store, dispatcher) = setup(MemoryEmailTransport::new()).await;
        let owner = User::new("owner", "owner@lab.test", Role::GlabAdmin);
        let other = User::new("other", "other@lab.test", Role::GlabAdmin);
        store.insert_user(&owner).await.unwrap();
        store.insert_user(&other).await.unwrap();

        let n = dispatcher.create_notification(&owner, &draft()).await.unwrap();

        let err = dispatcher
            .mark_read(other.user_id, n.notification_id)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::PermissionDenied(_)));

        dispatcher.mark_read(owner.user_id, n.notification_id).await.unwrap();
        assert_eq!(dispatcher.unread_count(owner.user_id).await.unwrap(), 0);
    }

    #[test]
    fn test_dedup_excludes_actor() {
        let a = User::new("a", "a@x.test", Role::GeaStaff);
        let b = User::new("b", "b@x.test", Role::GlabAdmin);
        let users = vec![a.clone(), b.clone(), a.clone()];

        let out = dedup_users(users, Some(b.user_id));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].user_id, a.user_id);
    }
}
