//! REST API over the in-memory portal

#![cfg(feature = "server")]

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use gea_portal::api::{self, USER_HEADER};
use helpers::World;

fn app(world: &World) -> Router {
    api::router(world.portal.app_state())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(USER_HEADER, user)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, user: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(USER_HEADER, user)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(USER_HEADER, user)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_needs_no_user() {
    let world = World::new().await;
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&world), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_requests_without_known_active_user_are_unauthorized() {
    let world = World::new().await;

    let request = Request::builder()
        .uri("/projects")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app(&world), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(app(&world), get("/projects", "nobody")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    world
        .portal
        .directory
        .set_user_active(&world.gea_admin, world.assessor.user_id, false)
        .await
        .unwrap();
    let (status, _) = send(app(&world), get("/projects", "assessor")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_header_accepts_id_or_username() {
    let world = World::new().await;

    let (status, body) = send(app(&world), get("/me", "labadmin")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "labadmin");

    let id = world.gea_staff.user_id.to_string();
    let (status, body) = send(app(&world), get("/me", &id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "reviewer");
}

#[tokio::test]
async fn test_create_project_over_http() {
    let world = World::new().await;
    let (status, body) = send(
        app(&world),
        post_json(
            "/projects",
            "labadmin",
            json!({
                "client_id": world.client.client_id,
                "assessment_type": "initial",
                "client_fee": "2000"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["current_phase"], 1);
    assert!(body["reference_number"]
        .as_str()
        .unwrap()
        .starts_with("GL-100-"));

    let (status, body) = send(app(&world), get("/projects", "labadmin")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_blocked_advance_returns_conflict_with_blockers() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let uri = format!("/projects/{}/advance", project.project_id);

    let (status, body) = send(app(&world), post_empty(&uri, "labadmin")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let blockers = body["blockers"].as_array().unwrap();
    assert_eq!(blockers.len(), 8);
    assert!(blockers
        .iter()
        .any(|b| b["blocker_type"]["type"] == "phase_review_missing"));

    world.complete_checklist(&project).await;
    world.approve_phase(&project).await;
    let (status, body) = send(
        app(&world),
        post_json(&uri, "labadmin", json!({ "notes": "Enrollment complete" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_phase"], 2);
}

#[tokio::test]
async fn test_role_separation_is_forbidden() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let items = world
        .portal
        .engine
        .checklist(&world.glab_admin, project.project_id, Some(1))
        .await
        .unwrap();

    let uri = format!(
        "/projects/{}/checklist/{}/toggle",
        project.project_id, items[0].item_id
    );
    let (status, _) = send(app(&world), post_empty(&uri, "reviewer")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(app(&world), post_empty(&uri, "labadmin")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_completed"], true);

    let review = format!("/projects/{}/phase-review", project.project_id);
    let (status, _) = send(
        app(&world),
        post_json(&review, "labadmin", json!({ "outcome": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let override_uri = format!("/projects/{}/override", project.project_id);
    let (status, _) = send(
        app(&world),
        post_json(&override_uri, "gea_admin", json!({ "to_phase": 1, "reason": "noop" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unknown_project_is_not_found() {
    let world = World::new().await;
    let uri = format!("/projects/{}", uuid::Uuid::new_v4());
    let (status, _) = send(app(&world), get(&uri, "gea_admin")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_document_upload_and_notification_inbox() {
    let world = World::new().await;
    let project = world.project(1000).await;

    let upload = Request::builder()
        .method("POST")
        .uri(format!(
            "/projects/{}/documents/enrollment_form?filename=form.pdf",
            project.project_id
        ))
        .header(USER_HEADER, "labadmin")
        .header("content-type", "application/octet-stream")
        .body(Body::from("%PDF-1.4"))
        .unwrap();
    let (status, body) = send(app(&world), upload).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["version"], 1);
    assert_eq!(body["status"], "pending");

    let (_, body) = send(app(&world), get("/notifications/unread-count", "reviewer")).await;
    assert_eq!(body["count"], 1);

    let (_, inbox) = send(app(&world), get("/notifications", "reviewer")).await;
    let notification_id = inbox[0]["notification_id"].as_str().unwrap().to_string();
    assert_eq!(inbox[0]["notification_type"], "document_uploaded");

    let read_uri = format!("/notifications/{}/read", notification_id);
    let (status, _) = send(app(&world), post_empty(&read_uri, "labadmin")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(app(&world), post_empty(&read_uri, "reviewer")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = send(app(&world), get("/notifications/unread-count", "reviewer")).await;
    assert_eq!(body["count"], 0);

    let (status, body) = send(
        app(&world),
        post_empty("/notifications/mark-all-read", "gea_admin"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked"], 1);
}

#[tokio::test]
async fn test_empty_upload_is_bad_request() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let upload = Request::builder()
        .method("POST")
        .uri(format!(
            "/projects/{}/documents/enrollment_form?filename=form.pdf",
            project.project_id
        ))
        .header(USER_HEADER, "labadmin")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app(&world), upload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_optional_body_is_bad_request() {
    let world = World::new().await;
    let project = world.project(1000).await;

    let advance = Request::builder()
        .method("POST")
        .uri(format!("/projects/{}/advance", project.project_id))
        .header(USER_HEADER, "labadmin")
        .header("content-type", "application/json")
        .body(Body::from("{\"notes\": "))
        .unwrap();
    let (status, body) = send(app(&world), advance).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid JSON"));

    let items = world
        .portal
        .engine
        .quality_checklist(&world.gea_staff, project.project_id, Some(1))
        .await
        .unwrap();
    let uri = format!(
        "/projects/{}/quality-checklist/{}/toggle",
        project.project_id, items[0].item_id
    );
    let (status, _) = send(
        app(&world),
        post_json(&uri, "reviewer", json!({ "notes": ["not", "a", "string"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(app(&world), post_empty(&uri, "reviewer")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_checked"], true);
}

#[tokio::test]
async fn test_document_download_over_http() {
    let world = World::new().await;
    let project = world.project(1000).await;
    let document = world
        .portal
        .engine
        .submit_document(
            &world.glab_admin,
            project.project_id,
            "enrollment_form",
            "form.pdf",
            b"%PDF-1.4",
        )
        .await
        .unwrap();
    let uri = format!("/documents/{}/download", document.document_id);

    let response = app(&world).oneshot(get(&uri, "reviewer")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"form.pdf\""
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"%PDF-1.4");

    let (status, _) = send(app(&world), get(&uri, "assessor")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_templates_over_http() {
    let world = World::new().await;
    let upload = |user: &str| {
        Request::builder()
            .method("POST")
            .uri("/templates?phase=1&key=enrollment_form&filename=enrollment.docx&name=Enrollment%20Form")
            .header(USER_HEADER, user)
            .body(Body::from("template-bytes"))
            .unwrap()
    };

    let (status, _) = send(app(&world), upload("reviewer")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(app(&world), upload("gea_admin")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["template_name"], "Enrollment Form");
    assert_eq!(body["is_active"], true);
    let template_id = body["template_id"].as_str().unwrap().to_string();

    let (status, body) = send(app(&world), get("/templates?phase=1", "assessor")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let uri = format!("/templates/{}/download", template_id);
    let response = app(&world).oneshot(get(&uri, "labadmin")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"template-bytes");
}
