use campus_infra::AppConfig;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod (in-memory stores), bound to an ephemeral port.
        let config = AppConfig {
            poll_interval: std::time::Duration::from_millis(10),
            ..AppConfig::default()
        };
        let app = campus_api::app::build_app(&config).await.expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn header<'a>(res: &'a reqwest::Response, name: &str) -> &'a str {
    res.headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}

async fn create(client: &reqwest::Client, srv: &TestServer, collection: &str, body: serde_json::Value) -> serde_json::Value {
    let res = client
        .post(srv.url(&format!("/api/{collection}")))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn search_eventually(
    client: &reqwest::Client,
    srv: &TestServer,
    collection: &str,
    query: &str,
    expected: usize,
) -> reqwest::Response {
    // Search is eventually consistent (primary write vs background index task).
    // Poll briefly until the index catches up.
    for _ in 0..100 {
        let res = client
            .get(srv.url(&format!("/api/_search/{collection}")))
            .query(&[("query", query)])
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        if header(&res, "x-total-count") == expected.to_string() {
            return res;
        }

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    panic!("search for {query:?} did not reach {expected} hits within timeout");
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn info_definition_lifecycle_create_get_delete() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/info-definitions"))
        .json(&json!({ "label": "Hall A" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(header(&res, "x-campusapp-alert"), "campusApp.infoDefinition.created");
    let id = header(&res, "x-campusapp-params").to_string();
    assert_eq!(header(&res, "location"), format!("/api/info-definitions/{id}"));
    let created: serde_json::Value = res.json().await.unwrap();
    assert_eq!(created["id"].as_i64().unwrap().to_string(), id);
    assert_eq!(created["label"], "Hall A");

    let res = client
        .get(srv.url(&format!("/api/info-definitions/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let fetched: serde_json::Value = res.json().await.unwrap();
    assert_eq!(fetched["label"], "Hall A");

    let res = client
        .delete(srv.url(&format!("/api/info-definitions/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "x-campusapp-alert"), "campusApp.infoDefinition.deleted");
    assert_eq!(header(&res, "x-campusapp-params"), id);

    let res = client
        .get(srv.url(&format!("/api/info-definitions/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.bytes().await.unwrap().is_empty());

    // Deleting again still succeeds.
    let res = client
        .delete(srv.url(&format!("/api/info-definitions/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_with_id_is_rejected_without_writes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/buildings"))
        .json(&json!({ "id": 7, "name": "Annex" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&res, "content-type"), "application/problem+json");
    assert_eq!(header(&res, "x-campusapp-error"), "error.idexists");
    assert_eq!(header(&res, "x-campusapp-params"), "building");
    let problem: serde_json::Value = res.json().await.unwrap();
    assert_eq!(problem["status"], 400);
    assert_eq!(problem["entityName"], "building");
    assert_eq!(problem["errorKey"], "idexists");
    assert_eq!(problem["message"], "error.idexists");

    let res = client.get(srv.url("/api/buildings")).send().await.unwrap();
    assert_eq!(header(&res, "x-total-count"), "0");
    let res = client.get(srv.url("/api/buildings/7")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn validation_failures_are_problems() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/buildings"))
        .json(&json!({ "name": "  ", "latitude": 10.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&res, "x-campusapp-error"), "error.namerequired");

    let res = client
        .post(srv.url("/api/buildings"))
        .json(&json!({ "name": "Tower", "latitude": 123.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&res, "x-campusapp-error"), "error.badlatitude");

    let res = client
        .post(srv.url("/api/buildings"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&res, "x-campusapp-error"), "error.badrequest");

    let res = client.get(srv.url("/api/buildings/abc")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&res, "x-campusapp-error"), "error.badid");
}

#[tokio::test]
async fn put_without_id_creates_and_with_id_updates() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .put(srv.url("/api/infos"))
        .json(&json!({ "value": "21.5" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(header(&res, "x-campusapp-alert"), "campusApp.info.created");
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_i64().unwrap();

    let res = client
        .put(srv.url("/api/infos"))
        .json(&json!({ "id": id, "value": "22.0" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "x-campusapp-alert"), "campusApp.info.updated");
    assert_eq!(header(&res, "x-campusapp-params"), id.to_string());

    let fetched: serde_json::Value = client
        .get(srv.url(&format!("/api/infos/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["value"], "22.0");

    let res = client.get(srv.url("/api/infos")).send().await.unwrap();
    assert_eq!(header(&res, "x-total-count"), "1");
}

#[tokio::test]
async fn create_after_max_identity_is_rejected_without_overwriting() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .put(srv.url("/api/infos"))
        .json(&json!({ "id": i64::MAX, "value": "last" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/api/infos"))
        .json(&json!({ "value": "next" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&res, "x-campusapp-error"), "error.idexhausted");

    let kept: serde_json::Value = client
        .get(srv.url(&format!("/api/infos/{}", i64::MAX)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(kept["value"], "last");

    let res = client.get(srv.url("/api/infos")).send().await.unwrap();
    assert_eq!(header(&res, "x-total-count"), "1");
}

#[tokio::test]
async fn list_is_paginated_through_headers() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for name in ["Alpha", "Bravo", "Charlie", "Delta", "Echo"] {
        create(&client, &srv, "buildings", json!({ "name": name })).await;
    }

    let res = client
        .get(srv.url("/api/buildings?page=1&size=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "x-total-count"), "5");
    let link = header(&res, "link").to_string();
    assert!(link.contains("</api/buildings?page=2&size=2>; rel=\"next\""));
    assert!(link.contains("</api/buildings?page=0&size=2>; rel=\"prev\""));
    assert!(link.contains("</api/buildings?page=2&size=2>; rel=\"last\""));
    assert!(link.contains("</api/buildings?page=0&size=2>; rel=\"first\""));
    let page: Vec<serde_json::Value> = res.json().await.unwrap();
    let names: Vec<_> = page.iter().map(|b| b["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Charlie", "Delta"]);

    let res = client
        .get(srv.url("/api/buildings?sort=name,desc&size=3"))
        .send()
        .await
        .unwrap();
    let page: Vec<serde_json::Value> = res.json().await.unwrap();
    let names: Vec<_> = page.iter().map(|b| b["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Echo", "Delta", "Charlie"]);

    let res = client
        .get(srv.url("/api/buildings?sort=plan"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&res, "x-campusapp-error"), "error.badsort");

    let res = client
        .get(srv.url("/api/buildings?page=minus-one"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&res, "x-campusapp-error"), "error.badpage");
}

#[tokio::test]
async fn mapping_view_keeps_only_map_fields() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let created = create(
        &client,
        &srv,
        "buildings",
        json!({
            "name": "Observatory",
            "description": "Dome on the hill",
            "latitude": 48.1,
            "longitude": 11.5,
            "floors": 2
        }),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let res = client
        .get(srv.url(&format!("/api/buildings/{id}/mapping")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let view: serde_json::Value = res.json().await.unwrap();
    let view = view.as_object().unwrap();
    assert_eq!(view["name"], "Observatory");
    assert_eq!(view["latitude"], 48.1);
    assert!(!view.contains_key("description"));
    assert!(!view.contains_key("floors"));

    let res = client
        .get(srv.url("/api/buildings/999/mapping"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_catches_up_with_writes_and_deletes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let lab = create(&client, &srv, "buildings", json!({ "name": "Physics Lab" })).await;
    create(&client, &srv, "buildings", json!({ "name": "Chemistry Lab" })).await;
    create(&client, &srv, "buildings", json!({ "name": "Cafeteria" })).await;

    let res = search_eventually(&client, &srv, "buildings", "lab", 2).await;
    assert!(header(&res, "link").contains("</api/_search/buildings?query=lab&page=0&size=20>; rel=\"first\""));
    let hits: Vec<serde_json::Value> = res.json().await.unwrap();
    assert!(hits.iter().all(|b| b["name"].as_str().unwrap().ends_with("Lab")));

    let res = search_eventually(&client, &srv, "buildings", "name:physics AND lab", 1).await;
    let hits: Vec<serde_json::Value> = res.json().await.unwrap();
    assert_eq!(hits[0]["id"], lab["id"]);

    let res = client
        .delete(srv.url(&format!("/api/buildings/{}", lab["id"])))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    search_eventually(&client, &srv, "buildings", "lab", 1).await;

    let res = search_eventually(&client, &srv, "buildings", "gymnasium", 0).await;
    let hits: Vec<serde_json::Value> = res.json().await.unwrap();
    assert!(hits.is_empty());

    let res = client
        .get(srv.url("/api/_search/buildings"))
        .query(&[("query", "name:(lab")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&res, "x-campusapp-error"), "error.badquery");

    let nested = "(".repeat(5_000);
    let res = client
        .get(srv.url("/api/_search/buildings"))
        .query(&[("query", nested.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&res, "x-campusapp-error"), "error.badquery");

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn notifications_round_trip_their_wire_names() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let created = create(
        &client,
        &srv,
        "notifications",
        json!({
            "date": "2024-03-01T10:00:00Z",
            "type": "CHECK",
            "title": "Fire drill",
            "infos": [1, 2]
        }),
    )
    .await;
    assert_eq!(created["type"], "CHECK");
    assert_eq!(created["infos"], json!([1, 2]));

    let view: serde_json::Value = client
        .get(srv.url(&format!("/api/notifications/{}/mapping", created["id"])))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view, json!({ "id": created["id"], "type": "CHECK", "title": "Fire drill" }));
}

#[tokio::test]
async fn admin_endpoints_report_and_reindex() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    create(&client, &srv, "info-definitions", json!({ "label": "Temperature" })).await;
    create(&client, &srv, "info-definitions", json!({ "label": "Humidity" })).await;
    search_eventually(&client, &srv, "info-definitions", "*", 2).await;

    // A hit can be visible a moment before its task is marked completed.
    let mut stats = serde_json::Value::Null;
    for _ in 0..50 {
        let res = client
            .get(srv.url("/api/admin/index-tasks/stats"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        stats = res.json().await.unwrap();
        if stats["queue"]["completed"].as_u64().unwrap() >= 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(stats["queue"]["completed"], 2);
    assert_eq!(stats["queue"]["dead_lettered"], 0);
    assert!(stats["worker"]["tasks_succeeded"].as_u64().unwrap() >= 2);

    let res = client
        .post(srv.url("/api/admin/reindex/info-definitions"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "entity": "infoDefinition", "enqueued": 2 }));

    let res = client
        .post(srv.url("/api/admin/reindex/widgets"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/api/admin/index-tasks/dead-letters?limit=10"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let entries: Vec<serde_json::Value> = res.json().await.unwrap();
    assert!(entries.is_empty());

    let res = client
        .post(srv.url("/api/admin/index-tasks/dead-letters/0190b2a4-7d3e-7c1a-9f00-000000000000/retry"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(srv.url("/api/admin/index-tasks/dead-letters/not-a-task/retry"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
