mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{admin_token, test_app};
use http_body_util::BodyExt;
use portfolio_cms::utils::auth::create_jwt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_admin_api_requires_session() {
    let t = test_app().await;

    let (status, body) = call(&t.app, "GET", "/admin/api/clients", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let anon = create_jwt("visitor", "anon", common::TEST_SECRET, 1).unwrap();
    let (status, _) = call(&t.app, "GET", "/admin/api/clients", Some(&anon), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = create_jwt("admin-1", "authenticated", "other-secret", 1).unwrap();
    let (status, _) = call(&t.app, "GET", "/admin/api/clients", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_browsers_are_redirected_to_login() {
    let t = test_app().await;
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/api/clients")
                .header(header::ACCEPT, "text/html,application/xhtml+xml")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/login?next=%2Fadmin%2Fapi%2Fclients"
    );
}

#[tokio::test]
async fn test_session_cookie_is_accepted() {
    let t = test_app().await;
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/api/navbar_links")
                .header(header::COOKIE, format!("sb-access-token={}", admin_token()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_client_crud_round_trip() {
    let t = test_app().await;
    let token = admin_token();

    let (status, created) = call(
        &t.app,
        "POST",
        "/admin/api/clients",
        Some(&token),
        Some(json!({
            "category_id": "restaurants",
            "name": "Trattoria",
            "cover_image": "https://media.test/clients/cover.jpg"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["sort_order"], 0);
    assert_eq!(created["_image_refs"]["cover_image"], "url");

    let (status, rows) = call(&t.app, "GET", "/admin/api/clients", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows.as_array().unwrap().len(), 1);

    let (status, updated) = call(
        &t.app,
        "PATCH",
        &format!("/admin/api/clients/{}", id),
        Some(&token),
        Some(json!({"name": "Trattoria Roma", "_image_refs": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", updated);
    assert_eq!(updated["name"], "Trattoria Roma");
    assert_eq!(updated["created_at"], created["created_at"]);

    let (status, _) = call(
        &t.app,
        "DELETE",
        &format!("/admin/api/clients/{}", id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(
        &t.app,
        "DELETE",
        &format!("/admin/api/clients/{}", id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_payload_reports_every_field() {
    let t = test_app().await;
    let (status, body) = call(
        &t.app,
        "POST",
        "/admin/api/clients",
        Some(&admin_token()),
        Some(json!({
            "category_id": "events",
            "cover_image": "data:image/png;base64,iVBORw0KGgo=",
            "sort_order": -1
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION");
    assert_eq!(body["retryable"], false);
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["name", "cover_image", "sort_order"]);
}

#[tokio::test]
async fn test_referenced_category_cannot_be_deleted() {
    let t = test_app().await;
    let token = admin_token();
    let (status, _) = call(
        &t.app,
        "POST",
        "/admin/api/clients",
        Some(&token),
        Some(json!({"category_id": "people", "name": "Portrait sitter"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &t.app,
        "DELETE",
        "/admin/api/portfolio_categories/people",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "REFERENTIAL");

    let (status, body) = call(
        &t.app,
        "POST",
        "/admin/api/clients",
        Some(&token),
        Some(json!({"category_id": "weddings", "name": "Orphan"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
}

#[tokio::test]
async fn test_categories_are_a_fixed_set() {
    let t = test_app().await;
    let token = admin_token();

    let (status, body) = call(
        &t.app,
        "POST",
        "/admin/api/portfolio_categories",
        Some(&token),
        Some(json!({"id": "weddings", "title": "Weddings"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"][0]["field"], "id");

    let (status, body) = call(
        &t.app,
        "PATCH",
        "/admin/api/portfolio_categories/events",
        Some(&token),
        Some(json!({"id": "parties", "title": "Parties"})),
    )
    .await;
    // `id` is never patched; the title change goes through
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["id"], "events");
    assert_eq!(body["title"], "Parties");
}

#[tokio::test]
async fn test_singletons_are_update_only() {
    let t = test_app().await;
    let token = admin_token();

    let (status, _) = call(
        &t.app,
        "POST",
        "/admin/api/settings",
        Some(&token),
        Some(json!({"site_title": "Second site"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&t.app, "DELETE", "/admin/api/about/about", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, before) = call(&t.app, "GET", "/admin/api/settings", Some(&token), None).await;
    let (status, after) = call(
        &t.app,
        "PATCH",
        "/admin/api/settings/site",
        Some(&token),
        Some(json!({"site_title": "Studio Lumen", "contact_email": "hello@lumen.test"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", after);
    assert_eq!(after["site_title"], "Studio Lumen");
    assert_ne!(after["updated_at"], before[0]["updated_at"]);

    let (status, body) = call(
        &t.app,
        "PATCH",
        "/admin/api/settings/site",
        Some(&token),
        Some(json!({"contact_email": "not-an-email"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"][0]["field"], "contact_email");
}

#[tokio::test]
async fn test_schema_and_unknown_tables() {
    let t = test_app().await;
    let token = admin_token();

    let (status, schema) = call(
        &t.app,
        "GET",
        "/admin/api/navbar_links/schema",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = schema
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["label", "href", "sort_order"]);

    let (status, _) = call(&t.app, "GET", "/admin/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let t = test_app().await;
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-42");
}
