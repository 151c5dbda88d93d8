pub mod items;
pub mod matches;
pub mod messages;
pub mod profile;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(profile::router())
        .merge(items::router())
        .merge(matches::router())
        .merge(messages::router())
}

/// Full application with tracing, ready to serve
pub fn app(state: AppState) -> Router {
    router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
