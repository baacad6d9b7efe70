//! Route configuration
//!
//! Each service instance serves one task:
//!
//!   summarization    GET /api/health           POST /api/summarize
//!   text-generation  GET /api/generate/health  POST /api/generate
//!
//! plus the demo page at `/`.

use actix_web::web;

use super::handlers;
use crate::domain::task::Task;

pub fn configure_routes(cfg: &mut web::ServiceConfig, task: Task) {
    match task {
        Task::Summarization => {
            cfg.route("/api/health", web::get().to(handlers::health))
                .route("/api/summarize", web::post().to(handlers::summarize));
        }
        Task::TextGeneration => {
            cfg.route("/api/generate/health", web::get().to(handlers::health))
                .route("/api/generate", web::post().to(handlers::generate));
        }
    }
    cfg.route("/", web::get().to(handlers::index));
}
