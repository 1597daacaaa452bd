//! Default admin handler.
//!
//! Served on admin listeners unless the builder is given another router.
//! Any path answers `200 OK`; `/status` adds the build version.

pub mod handlers;

use axum::{routing::get, Router};

use self::handlers::*;

pub fn default_router() -> Router {
    Router::new()
        .route("/status", get(get_status))
        .fallback(ok)
}
