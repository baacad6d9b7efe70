//! Request logging middleware
//!
//! One structured `tracing` event per request, tagged with the task the
//! service runs and whether its model is loaded, so 503s can be told
//! apart from real failures in the logs.

use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    http::StatusCode,
    middleware::Next,
    web, Error,
};
use std::time::Instant;
use tracing::{error, info, warn, Level};

use super::ServiceContext;

/// Log level for a finished request.
pub fn level_for(status: StatusCode) -> Level {
    if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
        Level::ERROR
    } else if status.is_client_error() || status == StatusCode::SERVICE_UNAVAILABLE {
        Level::WARN
    } else {
        Level::INFO
    }
}

/// Wrap with `actix_web::middleware::from_fn(log_request)`.
pub async fn log_request<B: MessageBody>(
    req:  ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<B>, Error> {
    let start  = Instant::now();
    let method = req.method().clone();
    let path   = req.path().to_string();
    let (task, loaded) = req
        .app_data::<web::Data<ServiceContext>>()
        .map(|ctx| (ctx.task.slug(), ctx.is_loaded()))
        .unwrap_or(("unknown", false));

    let response = next.call(req).await;
    let ms       = start.elapsed().as_millis() as u64;

    match &response {
        Ok(res) => {
            let status = res.status();
            let level  = level_for(status);
            if level == Level::ERROR {
                error!(task, %method, %path, %status, ms, model_loaded = loaded, "request failed");
            } else if status == StatusCode::SERVICE_UNAVAILABLE {
                warn!(task, %method, %path, %status, ms, "request rejected, model not loaded");
            } else if level == Level::WARN {
                warn!(task, %method, %path, %status, ms, "request rejected");
            } else {
                info!(task, %method, %path, %status, ms, "request served");
            }
        }
        Err(e) => error!(task, %method, %path, ms, error = %e, "request errored"),
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_app;
    use crate::config::Config;
    use crate::domain::task::Task;
    use actix_web::{middleware::from_fn, test, App};

    #[::core::prelude::v1::test]
    fn test_levels_by_status() {
        assert_eq!(level_for(StatusCode::OK), Level::INFO);
        assert_eq!(level_for(StatusCode::UNPROCESSABLE_ENTITY), Level::WARN);
        assert_eq!(level_for(StatusCode::SERVICE_UNAVAILABLE), Level::WARN);
        assert_eq!(level_for(StatusCode::INTERNAL_SERVER_ERROR), Level::ERROR);
    }

    #[actix_web::test]
    async fn test_logged_app_passes_responses_through() {
        let ctx = ServiceContext::new(&Config::for_task(Task::Summarization), None);
        let app = test::init_service(
            App::new()
                .wrap(from_fn(log_request))
                .configure(move |c| configure_app(c, ctx)),
        )
        .await;

        let req  = test::TestRequest::get().uri("/api/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/summarize")
            .set_json(serde_json::json!({ "text": "long enough to summarize" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
