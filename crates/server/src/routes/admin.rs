//! `/admin` — the sole non-JSON response in this API: a small static HTML
//! page for operators, still gated behind the same auth middleware as
//! everything but `/health`.

use std::sync::Arc;

use axum::response::Html;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

const ADMIN_PAGE: &str = include_str!("../../assets/admin.html");

async fn admin_page() -> Html<&'static str> {
    Html(ADMIN_PAGE)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/admin", get(admin_page))
}
