use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use readclearly_annotate::UnmatchedExtractor;
use readclearly_glossary::{GlossaryStore, StoreConfig};
use readclearly_types::CounterCategory;
use tempfile::TempDir;
use tower::util::ServiceExt;

use readclearly_server::{
    AppState, CounterStore, MemoryCounterStore, UsageAggregator, UsageConfig, current_period,
    router,
};

const DEFAULT_TABLE: &str = "Word,Explanation,Spanish,Spanish word\n\
lien,a legal claim on property,un reclamo legal sobre una propiedad,gravamen\n\
notice of default,a formal warning that a loan payment is late,,\n\
notice,a written announcement,,\n";

const HOUSING_TABLE: &str = "Word,Explanation\n\
tenant,a person who rents a home\n";

struct Harness {
    // Keeps the glossary directory alive for lazy loads.
    _dir: TempDir,
    state: AppState,
    counters: Arc<MemoryCounterStore>,
}

fn make_state() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("glossary_list.csv"),
        "default,General legal terms\nhousing,Housing\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("default.csv"), DEFAULT_TABLE).unwrap();
    std::fs::write(dir.path().join("housing.csv"), HOUSING_TABLE).unwrap();
    harness(dir)
}

fn harness(dir: TempDir) -> Harness {
    let glossaries = Arc::new(GlossaryStore::new(
        StoreConfig {
            glossary_dir: dir.path().to_path_buf(),
            cache_dir: None,
            ..StoreConfig::default()
        },
        None,
    ));
    let counters = Arc::new(MemoryCounterStore::new());
    let shared: Arc<dyn CounterStore> = counters.clone();
    let usage = Arc::new(UsageAggregator::new(shared, UsageConfig::default()));
    let state = AppState::new(glossaries, usage, UnmatchedExtractor::default());
    Harness {
        _dir: dir,
        state,
        counters,
    }
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn healthz_ok() {
    let h = make_state();
    let app = router(h.state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn annotates_content_and_records_usage() {
    let h = make_state();
    let app = router(h.state);
    let mut request = post(
        "/",
        r#"{"content":"<p>The bank filed a lien on the house. Foreclosure follows.</p>"}"#,
    );
    request.headers_mut().insert(
        header::REFERER,
        "https://Example.org/Eviction".parse().unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"), "{content_type}");

    let body = body_text(response).await;
    assert!(body.contains(
        "<span class=\"oarc-word\" data-glossary=\"a legal claim on property\" \
         data-glossary-es-desc=\"un reclamo legal sobre una propiedad\" \
         data-glossary-es=\"gravamen\">lien<span class=\"oarc-marker\"></span></span>"
    ));
    assert!(body.ends_with("</p><!-- ReadClearly glossary: default.csv -->"));

    let period = current_period();
    let matched = |term: &str| h.counters.count(CounterCategory::Matched, "default.csv", period, term);
    let unmatched = |term: &str| h.counters.count(CounterCategory::Unmatched, "default.csv", period, term);
    assert_eq!(matched("lien"), 1);
    assert_eq!(unmatched("foreclosure"), 1);
    assert_eq!(unmatched("follows"), 1);
    assert_eq!(unmatched("house"), 0);
    assert_eq!(h.counters.runs(period, "https://example.org/eviction"), 1);
}

#[tokio::test]
async fn legacy_path_and_named_glossary() {
    let h = make_state();
    let app = router(h.state);
    let response = app
        .oneshot(post(
            "/oarc/service.php",
            r#"{"content":"The tenant received a notice.","glossary":"housing"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(">tenant<span class=\"oarc-marker\"></span></span>"));
    assert!(!body.contains(">notice<span"));
    assert!(body.ends_with("<!-- ReadClearly glossary: housing.csv -->"));

    let period = current_period();
    assert_eq!(
        h.counters.count(CounterCategory::Matched, "housing.csv", period, "tenant"),
        1
    );
    assert_eq!(h.counters.runs(period, "unknown"), 1);
}

#[tokio::test]
async fn unknown_glossary_falls_back_to_default() {
    let h = make_state();
    let app = router(h.state);
    let response = app
        .oneshot(post("/", r#"{"content":"A lien.","glossary":"../etc/passwd"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.ends_with("<!-- ReadClearly glossary: default.csv -->"));
}

#[tokio::test]
async fn telemetry_updates_counters_with_empty_body() {
    let h = make_state();
    let app = router(h.state.clone());
    let period = current_period();

    for payload in [
        r#"{"hovered":"Lien"}"#,
        r#"{"hovered":"lien","content":"ignored"}"#,
        r#"{"translated":"lien"}"#,
        r#"{"voted":"lien","value":"yes"}"#,
        r#"{"voted":"lien","value":"no"}"#,
        r#"{"voted":"lien","value":"maybe"}"#,
    ] {
        let response = app.clone().oneshot(post("/", payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{payload}");
        assert!(body_text(response).await.is_empty(), "{payload}");
    }

    assert_eq!(
        h.counters.count(CounterCategory::Viewed, "default.csv", period, "lien"),
        2
    );
    assert_eq!(
        h.counters.count(CounterCategory::Translated, "default.csv", period, "lien"),
        1
    );
    assert_eq!(h.counters.votes("default.csv", period, "lien"), (1, 1));
    assert_eq!(
        h.counters.count(CounterCategory::Matched, "default.csv", period, "lien"),
        0
    );
}

#[tokio::test]
async fn incomplete_requests_are_rejected() {
    let h = make_state();
    let app = router(h.state);
    for payload in ["", "not json", "{}", r#"{"content":""}"#, r#"{"voted":"lien"}"#] {
        let response = app.clone().oneshot(post("/", payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{payload:?}");
        assert_eq!(body_text(response).await, "Incomplete request.");
    }
}

#[tokio::test]
async fn missing_glossary_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir);
    let app = router(h.state);
    let response = app
        .oneshot(post("/", r#"{"content":"<p>A lien.</p>"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_text(response).await, "Unable to load glossary.");
}

#[tokio::test]
async fn only_post_is_routed() {
    let h = make_state();
    let app = router(h.state);
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
