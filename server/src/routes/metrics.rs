use crate::state::ApiState;
use axum::extract::{MatchedPath, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use facesrec_metrics::FaceMetrics;
use std::time::Instant;

pub fn router() -> Router<ApiState> {
    Router::new().route("/metrics", get(render))
}

async fn render(State(metrics): State<FaceMetrics>) -> Response {
    Response::builder()
        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(metrics.render().into())
        .unwrap_or_default()
}

/// Per-request HTTP metrics, applied as a `Router::layer` over the whole
/// surface in `lib.rs` (not just this module's own route) so `/metrics`
/// itself gets counted too.
pub async fn track_http_metrics(
    State(metrics): State<ApiState>,
    path: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = path.map(|p| p.as_str().to_string()).unwrap_or_else(|| request.uri().path().to_string());
    let started = Instant::now();
    let response = next.run(request).await;
    metrics
        .metrics
        .record_http_request(&method, &route, response.status().as_u16(), started.elapsed());
    response
}
