//! Project chat and GEA announcements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct ChatMessage {
    pub message_id: Uuid,
    pub project_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "lowercase")
)]
pub enum AnnouncementPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Broadcast from GEA to one GLAB or to all of them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Announcement {
    pub announcement_id: Uuid,
    pub title: String,
    pub message: String,
    pub priority: AnnouncementPriority,
    /// `None` targets every GLAB
    pub target_glab_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Announcement {
    /// Active, unexpired and addressed to the GLAB (or to everyone)
    pub fn visible_to(&self, glab_id: Option<Uuid>, now: DateTime<Utc>) -> bool {
        if !self.is_active || self.expires_at.is_some_and(|e| e <= now) {
            return false;
        }
        match self.target_glab_id {
            None => true,
            Some(target) => glab_id == Some(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_visibility() {
        let glab = Uuid::new_v4();
        let now = Utc::now();
        let mut a = Announcement {
            announcement_id: Uuid::new_v4(),
            title: "Fee schedule".into(),
            message: "Updated".into(),
            priority: AnnouncementPriority::High,
            target_glab_id: Some(glab),
            created_by: Uuid::new_v4(),
            created_at: now,
            expires_at: None,
            is_active: true,
        };
        assert!(a.visible_to(Some(glab), now));
        assert!(!a.visible_to(Some(Uuid::new_v4()), now));
        assert!(!a.visible_to(None, now));

        a.target_glab_id = None;
        assert!(a.visible_to(None, now));

        a.expires_at = Some(now - Duration::hours(1));
        assert!(!a.visible_to(Some(glab), now));
    }
}
