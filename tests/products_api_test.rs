mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::{json, Value};

fn image_urls(images: &Value) -> Vec<String> {
    images
        .as_array()
        .expect("images array")
        .iter()
        .map(|i| i["url"].as_str().unwrap().to_string())
        .collect()
}

fn primary_count(images: &Value) -> usize {
    images
        .as_array()
        .expect("images array")
        .iter()
        .filter(|i| i["isPrimary"] == json!(true))
        .count()
}

async fn create_product(app: &TestApp, slug: &str, images: Value) -> Value {
    let (status, body) = app
        .request_json(
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "name": "Stoneware mug",
                "slug": slug,
                "price": "18.00",
                "quantity": 40,
                "images": images,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    body["data"].clone()
}

#[tokio::test]
async fn health_reports_database() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/health", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = common::response_json(response).await;
    assert_eq!(body["data"]["database"], "healthy");
}

#[tokio::test]
async fn create_then_fetch_product_with_images() {
    let app = TestApp::new().await;
    let created = create_product(
        &app,
        "stoneware-mug",
        json!([
            { "url": "https://cdn.example.com/p/mug-front.jpg" },
            { "url": "/images/mug-side.png", "isPrimary": true }
        ]),
    )
    .await;

    let id = created["id"].as_str().unwrap();
    assert_eq!(created["image_generation"], 1);
    assert_eq!(created["images"][1]["isPrimary"], true);

    let (status, body) = app
        .request_json(Method::GET, &format!("/api/v1/products/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        image_urls(&body["data"]["images"]),
        vec!["https://cdn.example.com/p/mug-front.jpg", "/images/mug-side.png"]
    );
    assert_eq!(primary_count(&body["data"]["images"]), 1);
}

#[tokio::test]
async fn replace_images_round_trip() {
    let app = TestApp::new().await;
    let created = create_product(
        &app,
        "mug",
        json!([{ "url": "https://cdn.example.com/a.jpg" }]),
    )
    .await;
    let id = created["id"].as_str().unwrap();
    let uri = format!("/api/v1/products/{id}/images");

    let (status, body) = app
        .request_json(
            Method::PUT,
            &uri,
            Some(json!({
                "images": [
                    { "url": "https://cdn.example.com/b.jpg", "isPrimary": true },
                    { "url": "https://cdn.example.com/a.jpg" }
                ],
                "expectedGeneration": 1
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["data"]["generation"], 2);
    assert_eq!(body["data"]["productId"], id);
    assert_eq!(
        image_urls(&body["data"]["images"]),
        vec!["https://cdn.example.com/b.jpg", "https://cdn.example.com/a.jpg"]
    );
    assert_eq!(body["data"]["images"][0]["isPrimary"], true);

    // Sending the current set back changes nothing but the generation.
    let current = body["data"]["images"].clone();
    let (status, again) = app
        .request_json(Method::PUT, &uri, Some(json!({ "images": current })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["data"]["images"], body["data"]["images"]);
    assert_eq!(again["data"]["generation"], 3);
}

#[tokio::test]
async fn stale_expected_generation_returns_conflict() {
    let app = TestApp::new().await;
    let created = create_product(&app, "mug", json!([])).await;
    let id = created["id"].as_str().unwrap();
    let uri = format!("/api/v1/products/{id}/images");

    let (status, body) = app
        .request_json(
            Method::PUT,
            &uri,
            Some(json!({
                "images": [{ "url": "https://cdn.example.com/a.jpg" }],
                "expectedGeneration": 0
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");

    let (_, images) = app.request_json(Method::GET, &uri, None).await;
    assert_eq!(images["data"]["images"], json!([]));
}

#[tokio::test]
async fn invalid_url_names_the_entry() {
    let app = TestApp::new().await;
    let created = create_product(&app, "mug", json!([])).await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = app
        .request_json(
            Method::PUT,
            &format!("/api/v1/products/{id}/images"),
            Some(json!({
                "images": [
                    { "url": "https://cdn.example.com/a.jpg" },
                    { "url": "   " }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["message"].as_str().unwrap().contains("index 1"),
        "body: {body}"
    );
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let app = TestApp::new().await;
    let id = uuid::Uuid::new_v4();

    let (status, _) = app
        .request_json(
            Method::PUT,
            &format!("/api/v1/products/{id}/images"),
            Some(json!({ "images": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request_json(Method::GET, &format!("/api/v1/products/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn preview_returns_plan_without_writing() {
    let app = TestApp::new().await;
    let created = create_product(
        &app,
        "mug",
        json!([
            { "url": "https://cdn.example.com/a.jpg" },
            { "url": "https://cdn.example.com/b.jpg" }
        ]),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = app
        .request_json(
            Method::POST,
            &format!("/api/v1/products/{id}/images/preview"),
            Some(json!({
                "images": [
                    { "url": "https://cdn.example.com/b.jpg" },
                    { "url": "https://cdn.example.com/c.jpg" }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    let plan = &body["data"];
    assert_eq!(plan["noop"], false);
    assert_eq!(plan["primaryUrl"], "https://cdn.example.com/b.jpg");
    assert_eq!(plan["delete"][0]["url"], "https://cdn.example.com/a.jpg");
    assert_eq!(plan["insert"][0]["url"], "https://cdn.example.com/c.jpg");
    assert_eq!(plan["update"][0]["changed"], true);

    let (_, product) = app
        .request_json(Method::GET, &format!("/api/v1/products/{id}"), None)
        .await;
    assert_eq!(product["data"]["image_generation"], 1);
    assert_eq!(product["data"]["images"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn update_product_fields_and_images_together() {
    let app = TestApp::new().await;
    let created = create_product(
        &app,
        "mug",
        json!([{ "url": "https://cdn.example.com/a.jpg" }]),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = app
        .request_json(
            Method::PUT,
            &format!("/api/v1/products/{id}"),
            Some(json!({
                "name": "Large stoneware mug",
                "images": [{ "url": "https://cdn.example.com/large.jpg" }],
                "expected_image_generation": 1
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["data"]["name"], "Large stoneware mug");
    assert_eq!(body["data"]["image_generation"], 2);
    assert_eq!(
        image_urls(&body["data"]["images"]),
        vec!["https://cdn.example.com/large.jpg"]
    );

    // A stale generation fails the whole edit, fields included.
    let (status, _) = app
        .request_json(
            Method::PUT,
            &format!("/api/v1/products/{id}"),
            Some(json!({
                "name": "Renamed again",
                "images": [],
                "expected_image_generation": 1
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, product) = app
        .request_json(Method::GET, &format!("/api/v1/products/{id}"), None)
        .await;
    assert_eq!(product["data"]["name"], "Large stoneware mug");
}

#[tokio::test]
async fn product_is_found_by_slug() {
    let app = TestApp::new().await;
    let created = create_product(
        &app,
        "stoneware-mug",
        json!([{ "url": "https://cdn.example.com/p/mug-front.jpg" }]),
    )
    .await;

    let (status, body) = app
        .request_json(Method::GET, "/api/v1/products/slug/stoneware-mug", None)
        .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["data"]["id"], created["id"]);
    assert_eq!(
        image_urls(&body["data"]["images"]),
        vec!["https://cdn.example.com/p/mug-front.jpg"]
    );

    let (status, _) = app
        .request_json(Method::GET, "/api/v1/products/slug/no-such-mug", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expected_generation_without_images_is_rejected() {
    let app = TestApp::new().await;
    let created = create_product(&app, "mug", json!([])).await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = app
        .request_json(
            Method::PUT,
            &format!("/api/v1/products/{id}"),
            Some(json!({ "name": "Renamed", "expected_image_generation": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("expected_image_generation"),
        "body: {body}"
    );

    let (_, product) = app
        .request_json(Method::GET, &format!("/api/v1/products/{id}"), None)
        .await;
    assert_eq!(product["data"]["name"], "Stoneware mug");

    // The camelCase spelling of the image fragment is accepted too.
    let (status, body) = app
        .request_json(
            Method::PUT,
            &format!("/api/v1/products/{id}"),
            Some(json!({
                "images": [{ "url": "https://cdn.example.com/a.jpg" }],
                "expectedImageGeneration": 1
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["data"]["image_generation"], 2);
}

#[tokio::test]
async fn duplicate_slug_is_rejected() {
    let app = TestApp::new().await;
    create_product(&app, "mug", json!([])).await;

    let (status, _) = app
        .request_json(
            Method::POST,
            "/api/v1/products",
            Some(json!({ "name": "Other", "slug": "mug", "price": "1.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_and_delete_products() {
    let app = TestApp::new().await;
    let first = create_product(
        &app,
        "first",
        json!([{ "url": "https://cdn.example.com/first.jpg" }]),
    )
    .await;
    create_product(&app, "second", json!([])).await;

    let (status, body) = app
        .request_json(Method::GET, "/api/v1/products?page=1&per_page=1", None)
        .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["data"]["pagination"]["total"], 2);
    assert_eq!(body["data"]["pagination"]["total_pages"], 2);
    assert_eq!(body["data"]["data"].as_array().unwrap().len(), 1);

    let id = first["id"].as_str().unwrap();
    let response = app
        .request(Method::DELETE, &format!("/api/v1/products/{id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (status, _) = app
        .request_json(Method::GET, &format!("/api/v1/products/{id}/images"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app
        .request_json(Method::GET, "/api/v1/products", None)
        .await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
}

#[tokio::test]
async fn address_routes_enforce_ownership_and_default() {
    let app = TestApp::new().await;
    let customer = uuid::Uuid::new_v4();
    let base = format!("/api/v1/customers/{customer}/addresses");
    let payload = json!({
        "full_name": "Nguyen Van A",
        "phone": "0901234567",
        "address_line": "1 Le Loi",
        "province": "Ho Chi Minh",
        "district": "District 1",
        "ward": "Ben Thanh",
        "country": "VN"
    });

    let (status, created) = app
        .request_json(Method::POST, &base, Some(payload.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "body: {created}");
    assert_eq!(created["data"]["is_default"], true);
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request_json(
            Method::PUT,
            &format!("{base}/{id}"),
            Some(json!({ "is_default": false })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let other = uuid::Uuid::new_v4();
    let (status, _) = app
        .request_json(
            Method::GET,
            &format!("/api/v1/customers/{other}/addresses/{id}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, listed) = app.request_json(Method::GET, &base, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let response = app
        .request(Method::DELETE, &format!("{base}/{id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;
    let (status, body) = app
        .request_json(Method::GET, "/api-docs/openapi.json", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/products/{id}/images"].is_object());
}
