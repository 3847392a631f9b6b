//! Workflow engine end to end over the in-memory store
//!
//! Covers phase monotonicity, both advance preconditions, checklist role
//! separation, the document version chain, payments and the fee split.

mod helpers;

use helpers::{date, World};
use rust_decimal::Decimal;

use gea_portal::models::*;
use gea_portal::{BlockerType, PortalError, PortalStore};

fn blocker_types(err: &PortalError) -> Vec<BlockerType> {
    err.blockers()
        .iter()
        .map(|b| b.blocker_type.clone())
        .collect()
}

// ── Projects and fees ──

#[tokio::test]
async fn test_fee_split_is_exact() {
    let world = World::new().await;
    let project = world.project(10_000).await;

    assert_eq!(project.gea_fee, Decimal::from(1500));
    assert_eq!(project.glab_revenue, Decimal::from(8500));
    assert_eq!(project.gea_fee + project.glab_revenue, project.client_fee);
    assert_eq!(project.current_phase, 1);
    assert_eq!(project.gea_status, ReviewStatus::Pending);
}

#[tokio::test]
async fn test_reference_numbers_are_sequential_per_glab_year() {
    let world = World::new().await;
    let first = world.project(1000).await;
    let second = world.project(1000).await;

    assert!(first.reference_number.starts_with("GL-100-"));
    assert!(first.reference_number.ends_with("-0001"));
    assert!(second.reference_number.ends_with("-0002"));
}

#[tokio::test]
async fn test_negative_fee_rejected() {
    let world = World::new().await;
    let err = world
        .portal
        .engine
        .create_project(
            &world.glab_admin,
            gea_portal::NewProject {
                glab_id: None,
                client_id: world.client.client_id,
                assessment_type: AssessmentType::Initial,
                client_fee: Decimal::from(-1),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));
}

#[tokio::test]
async fn test_fee_must_fit_two_decimal_column() {
    let world = World::new().await;
    let create = |fee: Decimal| {
        world.portal.engine.create_project(
            &world.glab_admin,
            gea_portal::NewProject {
                glab_id: None,
                client_id: world.client.client_id,
                assessment_type: AssessmentType::Initial,
                client_fee: fee,
            },
        )
    };

    let err = create(Decimal::new(1_000_005, 3)).await.unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));

    let err = create(Decimal::from(1_000_000_000_000i64)).await.unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));

    // Trailing zeros beyond the cent are not extra precision
    let project = create(Decimal::new(1_000_500, 3)).await.unwrap();
    assert_eq!(project.client_fee, Decimal::new(100_050, 2));

    let project = create(gea_portal::MAX_CLIENT_FEE).await.unwrap();
    assert_eq!(project.client_fee.to_string(), "999999999999.99");
}

#[tokio::test]
async fn test_suspended_glab_cannot_open_projects() {
    let world = World::new().await;
    world
        .portal
        .directory
        .set_glab_status(&world.gea_admin, world.glab.glab_id, GlabStatus::Suspended)
        .await
        .unwrap();

    let err = world
        .portal
        .engine
        .create_project(
            &world.glab_admin,
            gea_portal::NewProject {
                glab_id: None,
                client_id: world.client.client_id,
                assessment_type: AssessmentType::Surveillance,
                client_fee: Decimal::from(500),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        blocker_types(&err)[0],
        BlockerType::GlabInactive { .. }
    ));
}

// ── Advancement ──

#[tokio::test]
async fn test_fresh_project_reports_every_blocker() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let required = world
        .portal
        .engine
        .checklist(&world.glab_admin, project.project_id, Some(1))
        .await
        .unwrap()
        .len();

    let err = world
        .portal
        .engine
        .advance_phase(&world.glab_admin, project.project_id, None)
        .await
        .unwrap_err();

    let types = blocker_types(&err);
    assert_eq!(types.len(), required + 1);
    assert_eq!(
        types
            .iter()
            .filter(|t| matches!(t, BlockerType::ChecklistItemIncomplete { .. }))
            .count(),
        required
    );
    assert!(types.contains(&BlockerType::PhaseReviewMissing { phase: 1 }));

    let status = world
        .portal
        .engine
        .project_status(&world.glab_admin, project.project_id)
        .await
        .unwrap();
    assert!(!status.can_advance);
    assert_eq!(status.blockers.len(), required + 1);
}

#[tokio::test]
async fn test_checklist_alone_does_not_advance() {
    let world = World::new().await;
    let project = world.project(1000).await;
    world.complete_checklist(&project).await;

    let err = world
        .portal
        .engine
        .advance_phase(&world.glab_admin, project.project_id, None)
        .await
        .unwrap_err();
    assert_eq!(
        blocker_types(&err),
        vec![BlockerType::PhaseReviewMissing { phase: 1 }]
    );

    world
        .portal
        .engine
        .set_phase_review(
            &world.gea_staff,
            project.project_id,
            ReviewOutcome::ChangesRequested,
            Some("Scope unclear".into()),
        )
        .await
        .unwrap();
    let err = world
        .portal
        .engine
        .advance_phase(&world.glab_admin, project.project_id, None)
        .await
        .unwrap_err();
    assert!(matches!(
        blocker_types(&err)[0],
        BlockerType::PhaseReviewNotApproved { phase: 1, .. }
    ));
    assert_eq!(world.reload(&project).await.current_phase, 1);
}

#[tokio::test]
async fn test_approval_alone_does_not_advance() {
    let world = World::new().await;
    let project = world.project(1000).await;
    world.approve_phase(&project).await;

    let err = world
        .portal
        .engine
        .advance_phase(&world.glab_admin, project.project_id, None)
        .await
        .unwrap_err();
    let types = blocker_types(&err);
    assert!(!types.is_empty());
    assert!(types
        .iter()
        .all(|t| matches!(t, BlockerType::ChecklistItemIncomplete { phase: 1, .. })));
}

#[tokio::test]
async fn test_latest_review_is_authoritative() {
    let world = World::new().await;
    let project = world.project(1000).await;
    world.complete_checklist(&project).await;
    world.approve_phase(&project).await;
    world
        .portal
        .engine
        .set_phase_review(
            &world.gea_staff,
            project.project_id,
            ReviewOutcome::Rejected,
            None,
        )
        .await
        .unwrap();

    let err = world
        .portal
        .engine
        .advance_phase(&world.glab_admin, project.project_id, None)
        .await
        .unwrap_err();
    assert!(matches!(
        blocker_types(&err)[0],
        BlockerType::PhaseReviewNotApproved { .. }
    ));

    let reviews = world
        .portal
        .engine
        .phase_reviews(&world.gea_admin, project.project_id)
        .await
        .unwrap();
    assert_eq!(reviews.len(), 2);
    assert_eq!(world.reload(&project).await.gea_status, ReviewStatus::Rejected);
}

#[tokio::test]
async fn test_advance_moves_one_phase_and_resets_review_state() {
    let world = World::new().await;
    let project = world.project(1000).await;
    world.complete_checklist(&project).await;
    world.approve_phase(&project).await;

    let advanced = world
        .portal
        .engine
        .advance_phase(&world.glab_admin, project.project_id, Some("Proposal signed".into()))
        .await
        .unwrap();
    assert_eq!(advanced.current_phase, 2);
    assert_eq!(advanced.gea_status, ReviewStatus::Pending);

    // Phase 1 approval does not carry over
    let err = world
        .portal
        .engine
        .advance_phase(&world.glab_admin, project.project_id, None)
        .await
        .unwrap_err();
    assert!(blocker_types(&err).contains(&BlockerType::PhaseReviewMissing { phase: 2 }));
    assert_eq!(world.reload(&project).await.current_phase, 2);

    let history = world
        .portal
        .engine
        .phase_history(&world.gea_admin, project.project_id)
        .await
        .unwrap();
    let actions: Vec<_> = history.iter().map(|l| l.action).collect();
    assert_eq!(actions, vec![PhaseAction::Created, PhaseAction::Advanced]);
}

#[tokio::test]
async fn test_phase_never_decreases_without_override() {
    let world = World::new().await;
    let project = world.project(1000).await;

    let mut last = 1;
    for _ in 0..3 {
        let current = world.reload(&project).await;
        world.complete_checklist(&current).await;
        world.approve_phase(&current).await;
        let advanced = world
            .portal
            .engine
            .advance_phase(&world.glab_admin, project.project_id, None)
            .await
            .unwrap();
        assert_eq!(advanced.current_phase, last + 1);
        last = advanced.current_phase;
    }
    assert_eq!(last, 4);
}

#[tokio::test]
async fn test_final_phase_and_override() {
    let world = World::new().await;
    let project = world.project(1000).await;

    let err = world
        .portal
        .engine
        .override_phase(&world.gea_staff, project.project_id, 6, "Transfer")
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::PermissionDenied(_)));

    let moved = world
        .portal
        .engine
        .override_phase(&world.gea_admin, project.project_id, 6, "Migrated from paper file")
        .await
        .unwrap();
    assert_eq!(moved.current_phase, 6);

    world.complete_checklist(&moved).await;
    world.approve_phase(&moved).await;
    let err = world
        .portal
        .engine
        .advance_phase(&world.glab_admin, project.project_id, None)
        .await
        .unwrap_err();
    assert_eq!(blocker_types(&err), vec![BlockerType::FinalPhaseReached]);

    let back = world
        .portal
        .engine
        .override_phase(&world.gea_admin, project.project_id, 2, "Reopened for evidence")
        .await
        .unwrap();
    assert_eq!(back.current_phase, 2);

    let history = world
        .portal
        .engine
        .phase_history(&world.gea_admin, project.project_id)
        .await
        .unwrap();
    assert_eq!(
        history
            .iter()
            .filter(|l| l.action == PhaseAction::Override)
            .count(),
        2
    );
}

// ── Role separation ──

#[tokio::test]
async fn test_checklists_belong_to_opposite_sides() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let engine = &world.portal.engine;

    let item = engine
        .checklist(&world.glab_admin, project.project_id, Some(1))
        .await
        .unwrap()[0]
        .clone();
    let quality = engine
        .quality_checklist(&world.gea_staff, project.project_id, Some(1))
        .await
        .unwrap()[0]
        .clone();

    let err = engine
        .complete_operational_item(&world.gea_staff, project.project_id, item.item_id)
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::PermissionDenied(_)));

    let err = engine
        .complete_quality_item(&world.glab_admin, project.project_id, quality.item_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::PermissionDenied(_)));

    let toggled = engine
        .complete_operational_item(&world.glab_admin, project.project_id, item.item_id)
        .await
        .unwrap();
    assert!(toggled.is_completed);
    assert_eq!(toggled.completed_by, Some(world.glab_admin.user_id));

    let checked = engine
        .complete_quality_item(
            &world.gea_staff,
            project.project_id,
            quality.item_id,
            Some("Form on file".into()),
        )
        .await
        .unwrap();
    assert!(checked.is_checked);

    // Toggling one side never touched the other
    let after = engine
        .quality_checklist(&world.gea_staff, project.project_id, Some(1))
        .await
        .unwrap();
    assert_eq!(after.iter().filter(|q| q.is_checked).count(), 1);
    let ops = engine
        .checklist(&world.glab_admin, project.project_id, Some(1))
        .await
        .unwrap();
    assert_eq!(ops.iter().filter(|i| i.is_completed).count(), 1);

    // A second toggle reverts
    let reverted = engine
        .complete_operational_item(&world.glab_admin, project.project_id, item.item_id)
        .await
        .unwrap();
    assert!(!reverted.is_completed);
}

#[tokio::test]
async fn test_assessor_must_be_assigned_to_operate() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let engine = &world.portal.engine;
    let item = engine
        .checklist(&world.glab_admin, project.project_id, Some(1))
        .await
        .unwrap()[0]
        .clone();

    let err = engine
        .complete_operational_item(&world.assessor, project.project_id, item.item_id)
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::PermissionDenied(_)));

    assert!(engine
        .assign_assessor(&world.glab_admin, project.project_id, world.assessor.user_id)
        .await
        .unwrap());
    assert!(!engine
        .assign_assessor(&world.glab_admin, project.project_id, world.assessor.user_id)
        .await
        .unwrap());

    engine
        .complete_operational_item(&world.assessor, project.project_id, item.item_id)
        .await
        .unwrap();

    let inbox = world
        .portal
        .notifier
        .inbox(world.assessor.user_id)
        .await
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification_type, NotificationType::AssessorAssigned);

    let listed = engine.list_projects(&world.assessor).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_custom_checklist_item_blocks_advance() {
    let world = World::new().await;
    let project = world.project(1000).await;
    world.complete_checklist(&project).await;
    world.approve_phase(&project).await;

    let custom = world
        .portal
        .engine
        .add_checklist_item(&world.gea_admin, project.project_id, 1, "Site visit photos")
        .await
        .unwrap();
    assert!(custom.is_custom && custom.is_required);

    let err = world
        .portal
        .engine
        .advance_phase(&world.glab_admin, project.project_id, None)
        .await
        .unwrap_err();
    assert_eq!(
        blocker_types(&err),
        vec![BlockerType::ChecklistItemIncomplete {
            item_id: custom.item_id,
            phase: 1
        }]
    );
}

// ── Documents ──

#[tokio::test]
async fn test_document_download_follows_project_access() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let engine = &world.portal.engine;

    let v1 = engine
        .submit_document(&world.glab_admin, project.project_id, "enrollment_form", "form.pdf", b"v1")
        .await
        .unwrap();
    engine
        .submit_document(&world.glab_admin, project.project_id, "enrollment_form", "form.pdf", b"v2")
        .await
        .unwrap();

    // Superseded versions stay downloadable
    let (document, bytes) = engine
        .download_document(&world.gea_staff, v1.document_id)
        .await
        .unwrap();
    assert_eq!(document.version, 1);
    assert_eq!(bytes, b"v1");

    // Not assigned to the project
    let err = engine
        .download_document(&world.assessor, v1.document_id)
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::PermissionDenied(_)));

    let err = engine
        .download_document(&world.glab_admin, uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::NotFound { .. }));
}

#[tokio::test]
async fn test_document_version_chain() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let engine = &world.portal.engine;
    let pid = project.project_id;

    let v1 = engine
        .submit_document(&world.glab_admin, pid, "enrollment_form", "form.pdf", b"v1")
        .await
        .unwrap();
    assert_eq!((v1.version, v1.parent_id), (1, None));

    engine
        .review_document(
            &world.gea_staff,
            v1.document_id,
            ReviewOutcome::ChangesRequested,
            Some("Unsigned".into()),
        )
        .await
        .unwrap();

    let v2 = engine
        .submit_document(&world.glab_admin, pid, "enrollment_form", "form-signed.pdf", b"v2")
        .await
        .unwrap();
    assert_eq!(v2.version, 2);
    assert_eq!(v2.parent_id, Some(v1.document_id));

    // The earlier version is untouched
    let stored_v1 = world
        .store
        .get_document(v1.document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored_v1.status, ReviewStatus::ChangesRequested);
    assert_eq!(stored_v1.stored_id, v1.stored_id);
    assert_eq!(stored_v1.original_filename, "form.pdf");

    let err = engine
        .review_document(&world.gea_staff, v1.document_id, ReviewOutcome::Approved, None)
        .await
        .unwrap_err();
    assert!(matches!(
        blocker_types(&err)[0],
        BlockerType::DocumentAlreadyReviewed { .. }
    ));

    let v3 = engine
        .submit_document(&world.glab_admin, pid, "enrollment_form", "form-final.pdf", b"v3")
        .await
        .unwrap();
    let err = engine
        .review_document(&world.gea_staff, v2.document_id, ReviewOutcome::Approved, None)
        .await
        .unwrap_err();
    assert!(matches!(
        blocker_types(&err)[0],
        BlockerType::DocumentSuperseded { .. }
    ));

    engine
        .review_document(&world.gea_staff, v3.document_id, ReviewOutcome::Approved, None)
        .await
        .unwrap();
    let err = engine
        .submit_document(&world.glab_admin, pid, "enrollment_form", "again.pdf", b"v4")
        .await
        .unwrap_err();
    assert!(matches!(
        blocker_types(&err)[0],
        BlockerType::DocumentApproved { .. }
    ));

    let all = engine.documents(&world.gea_admin, pid, Some(1)).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(world.documents.len().await, 3);
}

#[tokio::test]
async fn test_upload_validation() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let engine = &world.portal.engine;
    let pid = project.project_id;

    let err = engine
        .submit_document(&world.glab_admin, pid, "enrollment_form", "payload.exe", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));

    // A later phase's slot is not accepted in phase 1
    let err = engine
        .submit_document(&world.glab_admin, pid, "decision_record", "decision.pdf", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::Validation(_)));

    let err = engine
        .submit_document(&world.gea_staff, pid, "enrollment_form", "form.pdf", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_upload_and_review_notify_the_other_side() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let engine = &world.portal.engine;
    let notifier = &world.portal.notifier;

    let doc = engine
        .submit_document(
            &world.glab_admin,
            project.project_id,
            "coi_declaration",
            "coi.pdf",
            b"declared",
        )
        .await
        .unwrap();
    assert_eq!(notifier.unread_count(world.gea_staff.user_id).await.unwrap(), 1);
    assert_eq!(notifier.unread_count(world.gea_admin.user_id).await.unwrap(), 1);
    assert_eq!(notifier.unread_count(world.glab_admin.user_id).await.unwrap(), 0);

    engine
        .review_document(
            &world.gea_staff,
            doc.document_id,
            ReviewOutcome::ChangesRequested,
            None,
        )
        .await
        .unwrap();
    let inbox = notifier.inbox(world.glab_admin.user_id).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification_type, NotificationType::ChangesRequested);
    assert_eq!(inbox[0].link_id, Some(doc.document_id));
    assert!(inbox[0].email_sent);

    let pending = engine.pending_reviews(&world.gea_staff).await.unwrap();
    assert!(pending.is_empty());
}

// ── Payments ──

#[tokio::test]
async fn test_payment_milestones_are_set_once() {
    let world = World::new().await;
    let project = world.project(2000).await;
    let engine = &world.portal.engine;

    let updated = engine
        .record_payment(
            &world.glab_admin,
            project.project_id,
            PaymentMilestone::Initial,
            date(2025, 2, 1),
        )
        .await
        .unwrap();
    assert!(updated.initial_payment_received);
    assert_eq!(updated.initial_payment_date, Some(date(2025, 2, 1)));

    let err = engine
        .record_payment(
            &world.gea_staff,
            project.project_id,
            PaymentMilestone::Initial,
            date(2025, 2, 2),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::Conflict(_)));
    assert_eq!(
        world.reload(&project).await.initial_payment_date,
        Some(date(2025, 2, 1))
    );

    let updated = engine
        .record_payment(
            &world.gea_staff,
            project.project_id,
            PaymentMilestone::GeaFeeRemitted,
            date(2025, 3, 1),
        )
        .await
        .unwrap();
    assert!(updated.gea_fee_remitted);
    assert!(!updated.final_payment_received);

    let err = engine
        .record_payment(
            &world.assessor,
            project.project_id,
            PaymentMilestone::Final,
            date(2025, 3, 1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::PermissionDenied(_)));
}

// ── Inbox ──

#[tokio::test]
async fn test_inbox_ownership_and_failed_email() {
    let world = World::new().await;
    let project = world.project(1000).await;
    world.email.set_failing(true);

    world
        .portal
        .engine
        .submit_document(
            &world.glab_admin,
            project.project_id,
            "enrollment_form",
            "form.pdf",
            b"x",
        )
        .await
        .unwrap();

    let notifier = &world.portal.notifier;
    let inbox = notifier.inbox(world.gea_staff.user_id).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert!(!inbox[0].email_sent);

    let err = notifier
        .mark_read(world.glab_admin.user_id, inbox[0].notification_id)
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::PermissionDenied(_)));

    notifier
        .mark_read(world.gea_staff.user_id, inbox[0].notification_id)
        .await
        .unwrap();
    assert_eq!(notifier.unread_count(world.gea_staff.user_id).await.unwrap(), 0);
    assert_eq!(notifier.mark_all_read(world.gea_admin.user_id).await.unwrap(), 1);
}
