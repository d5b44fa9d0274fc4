mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use harmony_backend::models::content_item::{ContentItem, ContentStatus};
use serde_json::json;
use uuid::Uuid;

use common::{get_request, json_request, send, spawn_app, spawn_app_with, test_config, token_for, FakeGateway};

#[tokio::test]
async fn admin_routes_require_a_valid_token() {
    let app = spawn_app();

    let (status, body) = send(&app.router, get_request("/api/admin/content/scheduled", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_authorization");

    let (status, body) = send(
        &app.router,
        get_request("/api/admin/content/scheduled", Some("not-a-jwt")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");

    let viewer = token_for("viewer");
    let (status, _) = send(
        &app.router,
        get_request("/api/admin/scheduler/status", Some(&viewer)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn editor_drafts_schedules_and_cancels_content() {
    let app = spawn_app();
    let token = token_for("editor");

    let (status, created) = send(
        &app.router,
        json_request(
            "POST",
            "/api/admin/content",
            &json!({
                "title": "Spring Recital Recap",
                "summary": "Highlights from the recital",
                "body": "Our students played beautifully.",
                "author": "Ada"
            }),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "draft");
    assert_eq!(created["slug"], "spring-recital-recap");
    assert_eq!(created["is_active"], false);
    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

    let when = Utc::now() + Duration::days(2);
    let (status, scheduled) = send(
        &app.router,
        json_request(
            "POST",
            &format!("/api/admin/content/{}/schedule", id),
            &json!({ "scheduled_for": when.to_rfc3339() }),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scheduled["status"], "scheduled");

    let (_, next) = send(
        &app.router,
        get_request("/api/admin/content/scheduled/next", Some(&token)),
    )
    .await;
    assert_eq!(next["item"]["id"], id.to_string());

    let (_, listed) = send(
        &app.router,
        get_request("/api/admin/content/scheduled", Some(&token)),
    )
    .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, cancelled) = send(
        &app.router,
        json_request(
            "POST",
            &format!("/api/admin/content/{}/cancel-schedule", id),
            &json!({}),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "draft");
    assert!(cancelled["scheduled_for"].is_null());

    let (status, _) = send(
        &app.router,
        json_request(
            "POST",
            &format!("/api/admin/content/{}/cancel-schedule", id),
            &json!({}),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, detail) = send(
        &app.router,
        get_request(&format!("/api/admin/content/{}", id), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["title"], "Spring Recital Recap");
    let revisions = detail["revisions"].as_array().unwrap();
    assert_eq!(revisions.len(), 3);
    assert!(revisions
        .iter()
        .all(|r| r["actor"] == "editor@harmony.test"));
}

#[tokio::test]
async fn schedule_rejects_past_times_and_unknown_items() {
    let app = spawn_app();
    let token = token_for("admin");

    let (_, created) = send(
        &app.router,
        json_request(
            "POST",
            "/api/admin/content",
            &json!({ "title": "Late", "body": "text" }),
            Some(&token),
        ),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app.router,
        json_request(
            "POST",
            &format!("/api/admin/content/{}/schedule", id),
            &json!({ "scheduled_for": (Utc::now() - Duration::hours(1)).to_rfc3339() }),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app.router,
        json_request(
            "POST",
            &format!("/api/admin/content/{}/schedule", Uuid::new_v4()),
            &json!({ "scheduled_for": (Utc::now() + Duration::hours(1)).to_rfc3339() }),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        json_request(
            "POST",
            "/api/admin/content",
            &json!({ "title": "", "body": "text" }),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn manual_run_publishes_due_items_and_exposes_them_publicly() {
    let app = spawn_app();
    let token = token_for("admin");
    let now = Utc::now();
    let due = ContentItem {
        id: Uuid::new_v4(),
        title: "Benefit Concert".into(),
        slug: "benefit-concert".into(),
        summary: None,
        body: "Join us".into(),
        author: None,
        status: ContentStatus::Scheduled,
        scheduled_for: Some(now - Duration::minutes(5)),
        published_at: None,
        is_active: false,
        created_at: now - Duration::days(1),
        updated_at: now - Duration::days(1),
    };
    app.store.insert_content(due.clone()).await;

    let (status, before) = send(&app.router, get_request("/api/public/content", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(before.as_array().unwrap().is_empty());

    let (status, sched) = send(
        &app.router,
        get_request("/api/admin/scheduler/status", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sched["initialized"], false);
    assert_eq!(sched["running"], false);
    assert_eq!(sched["timezone"], "America/New_York");

    let (status, report) = send(
        &app.router,
        json_request("POST", "/api/admin/scheduler/run", &json!({}), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["published"], json!([due.id.to_string()]));
    assert_eq!(report["failed"], 0);
    assert_eq!(app.content_notifier.subscriber_count(), 1);

    let (_, again) = send(
        &app.router,
        json_request("POST", "/api/admin/scheduler/run", &json!({}), Some(&token)),
    )
    .await;
    assert_eq!(again["published"], json!([]));
    assert_eq!(app.content_notifier.subscriber_count(), 1);

    let (_, public) = send(&app.router, get_request("/api/public/content?limit=5", None)).await;
    let items = public.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["slug"], "benefit-concert");
    assert_eq!(items[0]["status"], "published");
}

#[tokio::test]
async fn health_and_openapi_are_public() {
    let app = spawn_app();

    let (status, health) = send(&app.router, get_request("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");

    let (status, doc) = send(&app.router, get_request("/api/openapi.json", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/admin/content/{id}/schedule"].is_object());
    assert!(doc["paths"]["/api/donations/webhook"].is_object());
    assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
}

#[tokio::test]
async fn public_routes_are_rate_limited() {
    let mut config = test_config();
    config.public_rps = 2;
    let app = spawn_app_with(config, FakeGateway::default());

    for _ in 0..2 {
        let (status, _) = send(&app.router, get_request("/api/public/content", None)).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(&app.router, get_request("/api/public/content", None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = send(&app.router, get_request("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
}
