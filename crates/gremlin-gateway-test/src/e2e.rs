//! End-to-end tests over real WebSocket and HTTP sockets.
//!
//! Run with: `cargo test -p gremlin-gateway-test`

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use gremlin_gateway::protocol::GsonResponse;
use gremlin_gateway::{translate, Credentials, GatewayError, Health, QueryGateway};

use crate::{Reply, StubEngine, TestGateway};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CLOSE_WAIT: Duration = Duration::from_secs(5);

fn gateway_for(url: &str) -> QueryGateway {
    QueryGateway::new(Arc::new(TestGateway::config(url)))
}

/// Ids named in `g.V('a','b').elementMap()`.
fn ids_in(query: &str) -> Vec<String> {
    let (Some(start), Some(end)) = (query.find('('), query.find(')')) else {
        return vec![];
    };
    query[start + 1..end]
        .split(',')
        .map(|s| s.trim_matches('\'').to_string())
        .collect()
}

/// Answers a lookup with one `{"id": ..}` map per requested id.
fn echo(query: &str) -> Reply {
    Reply::list(ids_in(query).into_iter().map(|id| json!({"id": id})).collect())
}

fn merged_ids(result: &GsonResponse) -> Vec<String> {
    result
        .value
        .iter()
        .map(|raw| {
            let v: Value = serde_json::from_str(raw.get()).unwrap();
            v["id"].as_str().unwrap().to_string()
        })
        .collect()
}

/// A `ws://` URL nothing listens on.
async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}/gremlin", addr)
}

// ---------------------------------------------------------------------------
// Wire protocol and connection lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_submit_merges_partial_frames() {
    let engine = StubEngine::start(|_| Reply::Data {
        r#type: "g:List".into(),
        chunks: vec![vec![json!(1), json!(2)], vec![json!(3)], vec![json!(4)]],
    })
    .await
    .unwrap();

    let result = gateway_for(&engine.url())
        .submit(None, "g.V().values('age')")
        .await
        .unwrap();

    assert_eq!(result.r#type, "g:List");
    assert_eq!(result.len(), 4);
    assert_eq!(engine.queries(), vec!["g.V().values('age')".to_string()]);
    assert_eq!(engine.opened(), 1);
    assert!(engine.wait_all_closed(CLOSE_WAIT).await);
}

#[tokio::test]
async fn test_request_carries_default_alias_and_language() {
    let engine = StubEngine::start(|_| Reply::Empty).await.unwrap();
    gateway_for(&engine.url()).submit(None, "g.E()").await.unwrap();

    let request = &engine.requests()[0];
    assert_eq!(request.op, "eval");
    assert_eq!(request.args["aliases"], json!({"g": "g"}));
    assert_eq!(request.args["language"], json!("gremlin-groovy"));
}

#[tokio::test]
async fn test_every_submission_uses_its_own_connection() {
    let engine = StubEngine::start(|_| Reply::list(vec![json!(1)])).await.unwrap();
    let gateway = gateway_for(&engine.url());
    for _ in 0..3 {
        gateway.submit(None, "1").await.unwrap();
    }
    assert_eq!(engine.opened(), 3);
    assert!(engine.wait_all_closed(CLOSE_WAIT).await);
}

#[tokio::test]
async fn test_dropped_connection_is_transport_error() {
    let engine = StubEngine::start(|_| Reply::Close).await.unwrap();
    let err = gateway_for(&engine.url())
        .submit(None, "g.V()")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_engine_error_is_translated() {
    let engine = StubEngine::start(|_| Reply::Error {
        code: 597,
        message: "No such property: nmae for class: Vertex".into(),
        attributes: [("stackTrace".to_string(), json!("groovy.lang.MissingPropertyException"))]
            .into_iter()
            .collect(),
    })
    .await
    .unwrap();

    let err = gateway_for(&engine.url())
        .submit(None, "g.V().nmae")
        .await
        .unwrap_err();
    let translated = translate(&err);
    assert_eq!(translated.message, "No such property: nmae for class: Vertex");
    assert_eq!(translated.diagnostic, "groovy.lang.MissingPropertyException");
    assert!(engine.wait_all_closed(CLOSE_WAIT).await);
}

#[tokio::test]
async fn test_request_deadline() {
    let engine = StubEngine::start(|_| Reply::Empty.after(Duration::from_secs(30)))
        .await
        .unwrap();
    let mut config = TestGateway::config(&engine.url());
    config.engine.request_timeout = Some(Duration::from_millis(200));

    let err = QueryGateway::new(Arc::new(config))
        .submit(None, "g.V()")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(_)));
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_healthcheck_tri_state() {
    let healthy = StubEngine::start(|_| Reply::list(vec![json!("v1"), json!("v2")]))
        .await
        .unwrap();
    assert!(matches!(
        gateway_for(&healthy.url()).healthcheck(None).await,
        Health::Healthy
    ));
    assert_eq!(healthy.queries(), vec!["g.V().id().limit(10)".to_string()]);

    let empty = StubEngine::start(|_| Reply::Empty).await.unwrap();
    assert!(matches!(
        gateway_for(&empty.url()).healthcheck(None).await,
        Health::Empty
    ));

    let down = gateway_for(&dead_url().await).healthcheck(None).await;
    assert_eq!(down.as_status_str(), "Error");
    assert!(matches!(
        down.into_pair(),
        (false, Some(GatewayError::Connection(_)))
    ));
}

// ---------------------------------------------------------------------------
// SASL authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sasl_challenge_is_answered() {
    let engine = StubEngine::start_with_auth("stephen", "password", |_| Reply::list(vec![json!(1)]))
        .await
        .unwrap();
    let gateway = gateway_for(&engine.url());

    gateway.auth_check("stephen", "password").await.unwrap();

    let requests = engine.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].op, "authentication");
    assert_eq!(requests[1].id, requests[0].id);
    assert_eq!(requests[1].args["saslMechanism"], json!("PLAIN"));
}

#[tokio::test]
async fn test_sasl_rejects_wrong_password() {
    let engine = StubEngine::start_with_auth("stephen", "password", |_| Reply::list(vec![json!(1)]))
        .await
        .unwrap();
    let err = gateway_for(&engine.url())
        .auth_check("stephen", "guess")
        .await
        .unwrap_err();
    match err {
        GatewayError::EngineQuery { status } => assert_eq!(status.code, 401),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_sasl_without_credentials() {
    let engine = StubEngine::start_with_auth("stephen", "password", |_| Reply::Empty)
        .await
        .unwrap();
    let err = gateway_for(&engine.url())
        .submit(None, "g.V()")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Authentication(_)));
}

// ---------------------------------------------------------------------------
// Batched lookups
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_eight_batch_stress() {
    // Later batches answer first, so completion order is the reverse of
    // input order.
    let engine = StubEngine::start(|query| {
        let ids = ids_in(query);
        let first: u64 = ids[0][1..].parse().unwrap_or(0);
        echo(query).after(Duration::from_millis(80u64.saturating_sub(first)))
    })
    .await
    .unwrap();
    let gateway = gateway_for(&engine.url());
    let ids: Vec<String> = (0..80).map(|i| format!("v{}", i)).collect();

    for round in 1..=5 {
        let result = gateway.fetch_elements(None, "V", &ids).await.unwrap();
        assert_eq!(result.r#type, "g:List");
        assert_eq!(merged_ids(&result), ids);
        assert_eq!(engine.opened(), round * 8);
    }
    assert!(engine.max_concurrent() > 1);
    assert!(engine.wait_all_closed(CLOSE_WAIT).await);
}

#[tokio::test]
async fn test_batch_failure_closes_every_connection() {
    let engine = StubEngine::start(|query| {
        if ids_in(query).contains(&"v25".to_string()) {
            Reply::error(597, "boom")
        } else {
            echo(query).after(Duration::from_millis(500))
        }
    })
    .await
    .unwrap();
    let ids: Vec<String> = (0..40).map(|i| format!("v{}", i)).collect();

    let err = gateway_for(&engine.url())
        .fetch_elements(None, "V", &ids)
        .await
        .unwrap_err();
    match &err {
        GatewayError::PartialBatchFailure { index, .. } => assert_eq!(*index, 2),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(translate(&err).message, "boom");
    assert!(engine.wait_all_closed(CLOSE_WAIT).await);
}

#[tokio::test]
async fn test_lookup_with_credentials() {
    let engine = StubEngine::start_with_auth("stephen", "password", echo)
        .await
        .unwrap();
    let ids: Vec<String> = (0..25).map(|i| format!("v{}", i)).collect();
    let result = gateway_for(&engine.url())
        .fetch_elements(Some(Credentials::new("stephen", "password")), "E", &ids)
        .await
        .unwrap();
    assert_eq!(merged_ids(&result), ids);
    assert!(engine.queries().iter().all(|q| q.starts_with("g.E(")));
}

// ---------------------------------------------------------------------------
// HTTP gateway
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_http_session_and_queries() {
    let engine = StubEngine::start(|query| {
        if query.contains("elementMap") {
            echo(query)
        } else {
            Reply::list(vec![json!("v1")])
        }
    })
    .await
    .unwrap();
    let gateway = TestGateway::start(TestGateway::config(&engine.url()))
        .await
        .unwrap();

    let resp = gateway.get("/status", None).await.unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    assert!(matches!(
        gateway.login("admin", "wrong").await,
        Err(crate::TestError::Login(401))
    ));
    let token = gateway.login("admin", "admin").await.unwrap();

    let status: Value = gateway
        .get("/status", Some(&token))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["GremlinHealthy"], "OK");
    assert_eq!(status["GremlinServer"], json!(engine.url()));
    assert_eq!(status["PrefetchPageSize"], 80);

    let resp = gateway
        .post("/submit", Some(&token), &json!({"query": "g.V().limit(1)"}))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"@type": "g:List", "@value": ["v1"]}));

    let ids: Vec<String> = (0..15).map(|i| format!("e{}", i)).collect();
    let resp = gateway
        .post("/ui-api/props", Some(&token), &json!({"type": "E", "ids": ids}))
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["@value"].as_array().unwrap().len(), 15);
    assert_eq!(body["@value"][14]["id"], "e14");

    let resp = gateway
        .post("/ui-api/props", Some(&token), &json!({"type": "X", "ids": ["1"]}))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!("Invalid element type: X"));

    assert!(engine.wait_all_closed(CLOSE_WAIT).await);
}

#[tokio::test]
async fn test_http_gremlin_login_and_error_text() {
    let engine = StubEngine::start_with_auth("stephen", "password", |query| {
        if query == "1" {
            Reply::list(vec![json!(1)])
        } else {
            Reply::error(597, "Division by zero")
        }
    })
    .await
    .unwrap();
    let mut config = TestGateway::config(&engine.url());
    config.auth.gremlin_auth = true;
    let gateway = TestGateway::start(config).await.unwrap();

    assert!(gateway.login("stephen", "nope").await.is_err());
    let token = gateway.login("stephen", "password").await.unwrap();

    let resp = gateway
        .post("/submit", Some(&token), &json!({"query": "1/0"}))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!("gremlin query error: Division by zero")
    );
}

#[tokio::test]
async fn test_http_status_with_engine_down() {
    let gateway = TestGateway::start(TestGateway::config(&dead_url().await))
        .await
        .unwrap();
    let token = gateway.login("admin", "admin").await.unwrap();
    let status: Value = gateway
        .get("/status", Some(&token))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["GremlinHealthy"], "Error");
}

#[tokio::test]
async fn test_http_serves_static_ui() {
    let gateway = TestGateway::start(TestGateway::config("ws://127.0.0.1:1/gremlin"))
        .await
        .unwrap();
    let resp = gateway.get("/", None).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(
        resp.headers()["cache-control"],
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(resp.text().await.unwrap(), crate::gateway::INDEX_HTML);
}
