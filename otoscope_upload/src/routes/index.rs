use crate::page::render_index;
use axum::response::Html;

pub async fn index() -> Html<String> {
    Html(render_index())
}
