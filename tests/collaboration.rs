//! Project chat and announcements

mod helpers;

use helpers::{user, World};

use gea_portal::collab::NewAnnouncement;
use gea_portal::models::*;
use gea_portal::{PortalError, Role};

fn announcement(title: &str, target_glab_id: Option<uuid::Uuid>) -> NewAnnouncement {
    NewAnnouncement {
        title: title.into(),
        message: "Quarterly calibration session next week.".into(),
        priority: AnnouncementPriority::default(),
        target_glab_id,
        expires_at: None,
    }
}

#[tokio::test]
async fn test_chat_notifies_participants_except_sender() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let collab = &world.portal.collab;

    let message = collab
        .post_message(&world.glab_admin, project.project_id, "  Site visit booked  ")
        .await
        .unwrap();
    assert_eq!(message.body, "Site visit booked");

    let notifier = &world.portal.notifier;
    assert_eq!(notifier.unread_count(world.glab_admin.user_id).await.unwrap(), 0);
    for participant in [&world.assessor, &world.gea_admin, &world.gea_staff] {
        let inbox = notifier.inbox(participant.user_id).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].notification_type, NotificationType::ChatMessage);
        assert_eq!(inbox[0].link_id, Some(project.project_id));
    }

    let reply = collab
        .post_message(&world.gea_staff, project.project_id, "Noted")
        .await
        .unwrap();
    let thread = collab
        .list_messages(&world.glab_admin, project.project_id, None)
        .await
        .unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[1].message_id, reply.message_id);
}

#[tokio::test]
async fn test_chat_requires_project_access() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let collab = &world.portal.collab;

    let err = collab
        .post_message(&world.assessor, project.project_id, "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::PermissionDenied(_)));

    let err = collab
        .post_message(&world.glab_admin, project.project_id, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));

    let other_lab = world
        .portal
        .directory
        .create_user(&world.gea_admin, user("outsider", Role::GlabAdmin, None))
        .await;
    // A GLAB admin must belong to a GLAB
    assert!(other_lab.is_err());
}

#[tokio::test]
async fn test_targeted_announcement_reaches_one_glab() {
    let world = World::new().await;
    let collab = &world.portal.collab;

    let err = collab
        .publish_announcement(&world.glab_admin, announcement("Nope", None))
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::PermissionDenied(_)));

    let posted = collab
        .publish_announcement(
            &world.gea_staff,
            announcement("Calibration", Some(world.glab.glab_id)),
        )
        .await
        .unwrap();

    let notifier = &world.portal.notifier;
    for member in [&world.glab_admin, &world.assessor] {
        let inbox = notifier.inbox(member.user_id).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].notification_type, NotificationType::Announcement);
    }
    assert_eq!(notifier.unread_count(world.gea_admin.user_id).await.unwrap(), 0);

    let visible = collab.announcements_for(&world.assessor).await.unwrap();
    assert_eq!(visible.len(), 1);

    collab
        .retract_announcement(&world.gea_admin, posted.announcement_id)
        .await
        .unwrap();
    assert!(collab
        .announcements_for(&world.assessor)
        .await
        .unwrap()
        .is_empty());

    let err = collab
        .retract_announcement(&world.gea_admin, uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::NotFound { .. }));
}
