//! Catalog endpoint tests.

mod common;

use axum::http::StatusCode;
use common::{json_request, TestContext, BASIC_PLAN_ID, SERVICE_ID};

#[tokio::test]
async fn catalog_lists_services_with_plans() {
    let ctx = TestContext::new();

    let (status, body) = json_request(&ctx.router, "GET", "/v2/catalog", None).await;
    assert_eq!(status, StatusCode::OK);

    let services = body["services"].as_array().unwrap();
    assert_eq!(services.len(), 1);
    let service = &services[0];
    assert_eq!(service["id"], SERVICE_ID);
    assert_eq!(service["name"], "basin-s3");
    assert_eq!(service["bindable"], true);
    assert_eq!(service["tags"][0], "Data Stores");

    let plans = service["plans"].as_array().unwrap();
    assert_eq!(plans.len(), 3);
    // Ordered by plan name.
    assert_eq!(plans[0]["name"], "basic");
    assert_eq!(plans[0]["id"], BASIC_PLAN_ID);
    assert_eq!(plans[1]["name"], "foreign");
    assert_eq!(plans[2]["name"], "versioned");
}

#[tokio::test]
async fn catalog_plan_metadata_is_complete() {
    let ctx = TestContext::new();

    let (_, body) = json_request(&ctx.router, "GET", "/v2/catalog", None).await;
    let plan = &body["services"][0]["plans"][0];

    assert_eq!(plan["free"], false);
    let metadata = &plan["metadata"];
    assert_eq!(metadata["human_name"], "AWS S3 - basic");
    assert_eq!(metadata["price"]["cents"], 5000);
    assert_eq!(metadata["price"]["unit"], "month");
    assert_eq!(metadata["state"], "ga");
    assert_eq!(metadata["key"], "basin-s3:basic");
    assert_eq!(metadata["engine"]["type"], "s3");
    assert_eq!(metadata["engine"]["version"], "v1");
    assert_eq!(metadata["addon_service"]["name"], "basin-s3");
}

#[tokio::test]
async fn catalog_never_leaks_provider_private_details() {
    let ctx = TestContext::new();

    let (status, body) = json_request(&ctx.router, "GET", "/v2/catalog", None).await;
    assert_eq!(status, StatusCode::OK);

    // The fixture plants a marker inside provider_private_details; it must
    // not appear anywhere in the catalog response.
    let encoded = serde_json::to_string(&body).unwrap();
    assert!(!encoded.contains("private-details-marker"));
    assert!(!encoded.contains("provider_private_details"));
}
