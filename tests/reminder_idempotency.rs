//! Reminder scheduler against the in-memory ledger

mod helpers;

use helpers::{date, user, World};

use gea_portal::models::*;
use gea_portal::{PortalStore, Role};

async fn certified_assessor(world: &World, certified_on: chrono::NaiveDate) -> User {
    let mut input = user("certified", Role::GlabAssessor, Some(world.glab.glab_id));
    input.certification_date = Some(certified_on);
    world
        .portal
        .directory
        .create_user(&world.gea_admin, input)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_license_reminders_fire_once_per_threshold() {
    let world = World::new().await;
    let scheduler = &world.portal.scheduler;

    // Payment due 2025-03-01
    let report = scheduler.run_daily_cycle(date(2024, 12, 31)).await.unwrap();
    assert_eq!(report.license_reminders, 1);
    assert_eq!(report.already_sent, 0);
    // One GLAB admin plus both GEA reviewers
    assert_eq!(report.notifications, 3);

    let inbox = world.portal.notifier.inbox(world.glab_admin.user_id).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].title, "License Payment Due in 60 Days");
    assert_eq!(inbox[0].notification_type, NotificationType::LicenseReminder);
    assert_eq!(inbox[0].link_id, Some(world.glab.glab_id));

    let staff = world.portal.notifier.inbox(world.gea_staff.user_id).await.unwrap();
    assert_eq!(staff[0].title, "GLAB License Payment Due: Savanna Assurance");

    let rerun = scheduler.run_daily_cycle(date(2024, 12, 31)).await.unwrap();
    assert_eq!(rerun.reminders_sent(), 0);
    assert_eq!(rerun.already_sent, 1);
    assert_eq!(rerun.notifications, 0);
    assert_eq!(
        world.portal.notifier.inbox(world.glab_admin.user_id).await.unwrap().len(),
        1
    );

    let report = scheduler.run_daily_cycle(date(2025, 1, 30)).await.unwrap();
    assert_eq!(report.license_reminders, 1);
    let inbox = world.portal.notifier.inbox(world.glab_admin.user_id).await.unwrap();
    assert_eq!(inbox.len(), 2);
    assert!(inbox.iter().any(|n| n.title == "License Payment Due in 30 Days"));

    let ledger = world.store.list_reminders().await.unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().all(|r| r.sent && r.sent_at.is_some()));
    let mut thresholds: Vec<_> = ledger.iter().map(|r| r.days_before).collect();
    thresholds.sort();
    assert_eq!(thresholds, vec![30, 60]);
    assert!(ledger.iter().all(|r| r.due_date == date(2025, 3, 1)));
}

#[tokio::test]
async fn test_days_between_thresholds_send_nothing() {
    let world = World::new().await;
    let report = world
        .portal
        .scheduler
        .run_daily_cycle(date(2025, 1, 1))
        .await
        .unwrap();
    assert_eq!(report.reminders_sent(), 0);
    assert!(world.store.list_reminders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_suspended_glab_gets_no_license_reminder() {
    let world = World::new().await;
    world
        .portal
        .directory
        .set_glab_status(&world.gea_admin, world.glab.glab_id, GlabStatus::Suspended)
        .await
        .unwrap();

    let report = world
        .portal
        .scheduler
        .run_daily_cycle(date(2024, 12, 31))
        .await
        .unwrap();
    assert_eq!(report.license_reminders, 0);
}

#[tokio::test]
async fn test_recertification_and_cpd_reminders() {
    let world = World::new().await;
    let assessor = certified_assessor(&world, date(2022, 3, 1)).await;
    assert_eq!(assessor.recertification_due, Some(date(2025, 3, 1)));

    let record = world
        .portal
        .cpd
        .open_cycle(&world.gea_admin, assessor.user_id, date(2022, 3, 1))
        .await
        .unwrap();
    assert_eq!(record.cycle_end, date(2025, 3, 1));

    let report = world
        .portal
        .scheduler
        .run_daily_cycle(date(2025, 2, 14))
        .await
        .unwrap();
    assert_eq!(report.license_reminders, 1);
    assert_eq!(report.recertification_reminders, 1);
    assert_eq!(report.cpd_reminders, 1);

    let inbox = world.portal.notifier.inbox(assessor.user_id).await.unwrap();
    assert_eq!(inbox.len(), 2);
    let recert = inbox
        .iter()
        .find(|n| n.notification_type == NotificationType::RecertificationReminder)
        .unwrap();
    assert_eq!(recert.title, "Recertification Due in 15 Days");
    assert_eq!(recert.link_id, Some(record.record_id));
    let cpd = inbox
        .iter()
        .find(|n| n.notification_type == NotificationType::CpdReminder)
        .unwrap();
    assert_eq!(cpd.title, "CPD Hours Due in 15 Days");

    let rerun = world
        .portal
        .scheduler
        .run_daily_cycle(date(2025, 2, 14))
        .await
        .unwrap();
    assert_eq!(rerun.reminders_sent(), 0);
    assert_eq!(rerun.already_sent, 3);
    assert_eq!(
        world.portal.notifier.inbox(assessor.user_id).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_inactive_assessor_is_skipped() {
    let world = World::new().await;
    let assessor = certified_assessor(&world, date(2022, 3, 1)).await;
    world
        .portal
        .directory
        .set_user_active(&world.gea_admin, assessor.user_id, false)
        .await
        .unwrap();

    let report = world
        .portal
        .scheduler
        .run_daily_cycle(date(2024, 12, 31))
        .await
        .unwrap();
    assert_eq!(report.recertification_reminders, 0);
    assert!(world
        .portal
        .notifier
        .inbox(assessor.user_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_cycle_lapses_after_end_date() {
    let world = World::new().await;
    let assessor = certified_assessor(&world, date(2022, 3, 1)).await;
    let record = world
        .portal
        .cpd
        .open_cycle(&world.gea_admin, assessor.user_id, date(2022, 3, 1))
        .await
        .unwrap();

    let on_end = world
        .portal
        .scheduler
        .run_daily_cycle(date(2025, 3, 1))
        .await
        .unwrap();
    assert_eq!(on_end.records_lapsed, 0);

    let after = world
        .portal
        .scheduler
        .run_daily_cycle(date(2025, 3, 2))
        .await
        .unwrap();
    assert_eq!(after.records_lapsed, 1);

    let stored = world
        .store
        .get_recertification(record.record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, CycleStatus::Lapsed);
    assert!(stored.closed_at.is_some());

    let again = world
        .portal
        .scheduler
        .run_daily_cycle(date(2025, 3, 3))
        .await
        .unwrap();
    assert_eq!(again.records_lapsed, 0);
}

#[tokio::test]
async fn test_failed_recipient_lookup_keeps_reminder_pending() {
    let world = World::new().await;
    let scheduler = &world.portal.scheduler;

    world.store.set_failing_user_queries(true);
    let report = scheduler.run_daily_cycle(date(2024, 12, 31)).await.unwrap();
    assert_eq!(report.license_reminders, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.notifications, 0);

    let ledger = world.store.list_reminders().await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert!(!ledger[0].sent);
    assert!(ledger[0].claimed_at.is_none());

    world.store.set_failing_user_queries(false);
    let retry = scheduler.run_daily_cycle(date(2024, 12, 31)).await.unwrap();
    assert_eq!(retry.license_reminders, 1);
    assert_eq!(retry.failed, 0);
    assert_eq!(retry.notifications, 3);

    let ledger = world.store.list_reminders().await.unwrap();
    assert!(ledger[0].sent && ledger[0].sent_at.is_some());
    assert_eq!(
        world.portal.notifier.inbox(world.glab_admin.user_id).await.unwrap().len(),
        1
    );
}
