use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use minijinja::context;
use std::sync::Arc;

use crate::web::state::AppState;
use crate::web::templates::render_template;

// Main UI entry point
pub async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let page = render_template(
        &state.template_env,
        "index.html",
        context! {
            title => state.config.web.title,
            table => state.schema.short_name(),
            backend => state.config.llm.backend,
        },
    );
    Html(page)
}
