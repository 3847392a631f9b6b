//! Project chat and GEA announcements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{PortalError, PortalResult};
use crate::models::*;
use crate::notify::{NotificationDispatcher, NotificationDraft};
use crate::permissions::Capability;
use crate::store::PortalStore;
use crate::workflow::access::{ensure_can_view, require};

/// Longest accepted chat message, in characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAnnouncement {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: AnnouncementPriority,
    /// `None` broadcasts to every GLAB
    pub target_glab_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct CollabService {
    store: Arc<dyn PortalStore>,
    notifier: Arc<NotificationDispatcher>,
}

impl CollabService {
    pub fn new(store: Arc<dyn PortalStore>, notifier: Arc<NotificationDispatcher>) -> Self {
        Self { store, notifier }
    }

    async fn visible_project(&self, actor: &User, project_id: Uuid) -> PortalResult<Project> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| PortalError::not_found("project", project_id))?;
        ensure_can_view(self.store.as_ref(), actor, &project).await?;
        Ok(project)
    }

    pub async fn post_message(
        &self,
        actor: &User,
        project_id: Uuid,
        body: &str,
    ) -> PortalResult<ChatMessage> {
        require(actor, Capability::PostMessage)?;
        let project = self.visible_project(actor, project_id).await?;

        let body = body.trim();
        if body.is_empty() {
            return Err(PortalError::validation("Message is empty"));
        }
        if body.chars().count() > MAX_MESSAGE_CHARS {
            return Err(PortalError::validation(format!(
                "Message exceeds {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        let message = ChatMessage {
            message_id: Uuid::new_v4(),
            project_id,
            sender_id: actor.user_id,
            body: body.to_string(),
            sent_at: Utc::now(),
        };
        self.store.insert_chat_message(&message).await?;

        let draft = NotificationDraft::new(
            NotificationType::ChatMessage,
            format!("New message in {}", project.reference_number),
            format!("{}: {}", actor.display_name(), preview(body)),
        )
        .link(LinkType::Project, project_id);
        match self
            .notifier
            .project_participants(&project, Some(actor.user_id))
            .await
        {
            Ok(recipients) => {
                self.notifier.notify_many(&recipients, &draft).await;
            }
            Err(e) => tracing::warn!(project = %project.reference_number, "Chat recipients: {}", e),
        }

        Ok(message)
    }

    /// Messages oldest first; `since` supports polling for new ones
    pub async fn list_messages(
        &self,
        actor: &User,
        project_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> PortalResult<Vec<ChatMessage>> {
        self.visible_project(actor, project_id).await?;
        self.store.chat_messages(project_id, since).await
    }

    pub async fn publish_announcement(
        &self,
        actor: &User,
        input: NewAnnouncement,
    ) -> PortalResult<Announcement> {
        require(actor, Capability::PublishAnnouncement)?;

        if input.title.trim().is_empty() || input.message.trim().is_empty() {
            return Err(PortalError::validation(
                "Announcement title and message are required",
            ));
        }
        if let Some(glab_id) = input.target_glab_id {
            if self.store.get_glab(glab_id).await?.is_none() {
                return Err(PortalError::not_found("glab", glab_id));
            }
        }

        let announcement = Announcement {
            announcement_id: Uuid::new_v4(),
            title: input.title.trim().to_string(),
            message: input.message.trim().to_string(),
            priority: input.priority,
            target_glab_id: input.target_glab_id,
            created_by: actor.user_id,
            created_at: Utc::now(),
            expires_at: input.expires_at,
            is_active: true,
        };
        self.store.insert_announcement(&announcement).await?;
        info!(title = %announcement.title, target = ?announcement.target_glab_id, "Announcement published");

        let draft = NotificationDraft::new(
            NotificationType::Announcement,
            format!("Announcement: {}", announcement.title),
            preview(&announcement.message),
        )
        .link(LinkType::Announcement, announcement.announcement_id);
        match self.notifier.glab_users(announcement.target_glab_id).await {
            Ok(recipients) => {
                self.notifier.notify_many(&recipients, &draft).await;
            }
            Err(e) => tracing::warn!("Announcement recipients: {}", e),
        }

        Ok(announcement)
    }

    pub async fn retract_announcement(&self, actor: &User, announcement_id: Uuid) -> PortalResult<()> {
        require(actor, Capability::RetractAnnouncement)?;
        if !self.store.deactivate_announcement(announcement_id).await? {
            return Err(PortalError::not_found("announcement", announcement_id));
        }
        info!(announcement = %announcement_id, "Announcement retracted");
        Ok(())
    }

    /// Active, unexpired announcements the user may see, newest first
    pub async fn announcements_for(&self, actor: &User) -> PortalResult<Vec<Announcement>> {
        let now = Utc::now();
        let all = self.store.list_announcements().await?;
        Ok(all
            .into_iter()
            .filter(|a| {
                if actor.role.is_gea() {
                    a.is_active && a.expires_at.is_none_or(|e| e > now)
                } else {
                    a.visible_to(actor.glab_id, now)
                }
            })
            .collect())
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut)
}
