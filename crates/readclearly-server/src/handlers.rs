use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use dashmap::DashMap;
use readclearly_annotate::{Annotator, UnmatchedExtractor};
use readclearly_glossary::GlossaryStore;
use readclearly_types::{CounterCategory, Glossary, TermCounts, VoteValue};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::usage::UsageAggregator;

/// Path the widget has always posted to.
pub const LEGACY_SERVICE_PATH: &str = "/oarc/service.php";

#[derive(Clone)]
pub struct AppState {
    pub glossaries: Arc<GlossaryStore>,
    pub usage: Arc<UsageAggregator>,
    pub extractor: Arc<UnmatchedExtractor>,
    annotators: Arc<DashMap<String, Arc<Annotator>>>,
}

impl AppState {
    pub fn new(
        glossaries: Arc<GlossaryStore>,
        usage: Arc<UsageAggregator>,
        extractor: UnmatchedExtractor,
    ) -> Self {
        Self {
            glossaries,
            usage,
            extractor: Arc::new(extractor),
            annotators: Arc::new(DashMap::new()),
        }
    }

    /// Compiled matcher for `glossary`, rebuilt whenever the store hands out
    /// a freshly loaded glossary under the same name.
    fn annotator(&self, glossary: &Arc<Glossary>) -> Result<Arc<Annotator>, ApiError> {
        if let Some(cached) = self.annotators.get(glossary.name()) {
            if Arc::ptr_eq(cached.glossary(), glossary) {
                return Ok(Arc::clone(&cached));
            }
        }
        let annotator = Annotator::new(Arc::clone(glossary)).map_err(|err| {
            error!(glossary = glossary.name(), "failed to build annotator: {err}");
            ApiError::Internal
        })?;
        let annotator = Arc::new(annotator);
        self.annotators
            .insert(glossary.name().to_string(), Arc::clone(&annotator));
        Ok(annotator)
    }
}

/// JSON body posted by the widget. Exactly one of the action fields is
/// expected; empty strings count as absent.
#[derive(Debug, Default, Deserialize)]
pub struct ServiceRequest {
    pub content: Option<String>,
    pub glossary: Option<String>,
    pub hovered: Option<String>,
    pub translated: Option<String>,
    pub voted: Option<String>,
    pub value: Option<String>,
}

enum Action<'a> {
    Viewed(&'a str),
    Translated(&'a str),
    Vote(&'a str, &'a str),
    Annotate(&'a str),
}

impl ServiceRequest {
    fn parse(body: &[u8]) -> Result<Self, ApiError> {
        if body.is_empty() {
            return Err(ApiError::MalformedRequest);
        }
        serde_json::from_slice(body).map_err(|err| {
            debug!("rejecting request body: {err}");
            ApiError::MalformedRequest
        })
    }

    fn glossary(&self) -> Option<&str> {
        present(&self.glossary)
    }

    fn action(&self) -> Option<Action<'_>> {
        if let Some(term) = present(&self.hovered) {
            return Some(Action::Viewed(term));
        }
        if let Some(term) = present(&self.translated) {
            return Some(Action::Translated(term));
        }
        if let (Some(term), Some(value)) = (present(&self.voted), present(&self.value)) {
            return Some(Action::Vote(term, value));
        }
        present(&self.content).map(Action::Annotate)
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(service))
        .route(LEGACY_SERVICE_PATH, post(service))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn service(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = ServiceRequest::parse(&body)?;

    let glossary = state
        .glossaries
        .load(request.glossary())
        .await
        .map_err(|err| {
            warn!("{err}");
            ApiError::GlossaryUnavailable
        })?;
    let glossary_id = glossary.source_token().to_lowercase();

    match request.action().ok_or(ApiError::MalformedRequest)? {
        Action::Viewed(term) => {
            state
                .usage
                .merge(CounterCategory::Viewed, &glossary_id, &single(term))
                .await;
            Ok(StatusCode::OK.into_response())
        }
        Action::Translated(term) => {
            state
                .usage
                .merge(CounterCategory::Translated, &glossary_id, &single(term))
                .await;
            Ok(StatusCode::OK.into_response())
        }
        Action::Vote(term, value) => {
            match VoteValue::parse(value) {
                Some(vote) => state.usage.record_vote(term, vote, &glossary_id).await,
                None => debug!(value, "ignoring vote with unknown value"),
            }
            Ok(StatusCode::OK.into_response())
        }
        Action::Annotate(content) => {
            let annotator = state.annotator(&glossary)?;
            let annotation = annotator.annotate(content);
            let candidates = state
                .extractor
                .extract(&annotation.html, annotation.matches.keys());

            let referer = headers
                .get(header::REFERER)
                .and_then(|value| value.to_str().ok());
            state.usage.record_run(referer).await;
            state
                .usage
                .merge(CounterCategory::Matched, &glossary_id, &annotation.matches)
                .await;
            state
                .usage
                .merge(CounterCategory::Unmatched, &glossary_id, &candidates)
                .await;

            let mut html = annotation.html;
            html.push_str(&format!(
                "<!-- ReadClearly glossary: {} -->",
                glossary.source_token()
            ));
            Ok(Html(html).into_response())
        }
    }
}

fn single(term: &str) -> TermCounts {
    TermCounts::from([(term.to_string(), 1)])
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Incomplete request.")]
    MalformedRequest,
    #[error("Unable to load glossary.")]
    GlossaryUnavailable,
    #[error("internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::MalformedRequest => StatusCode::BAD_REQUEST,
            ApiError::GlossaryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
