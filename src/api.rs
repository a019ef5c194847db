use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Greeting {
    pub message: String,
}

impl Greeting {
    pub fn for_user(username: &str) -> Self {
        Self {
            message: format!("Hello, {username}!"),
        }
    }
}

/// Routes served under `/api`. Anything unmatched, including other methods
/// on known paths, is a 404.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/hello/:username", get(greet).fallback(not_found))
        .route("/hello/", get(greet_nobody).fallback(not_found))
        .fallback(not_found)
}

async fn greet(Path(username): Path<String>) -> Json<Greeting> {
    Json(Greeting::for_user(&username))
}

async fn greet_nobody() -> Json<Greeting> {
    Json(Greeting::for_user(""))
}

pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
