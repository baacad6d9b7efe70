// ============================================================
// Layer 1 — HTTP Service (actix-web)
// ============================================================
// Serves one task's model over HTTP:
//
//   handlers.rs   — health, generation and demo page handlers
//   routes.rs     — per-task route table
//   types.rs      — request/response bodies + validation
//   error.rs      — ApiError → status code + {"detail": ...}
//   middleware.rs — structured request logging
//   ui.rs         — the single-page demo
//
// The model is loaded once before the server starts and lives in
// an immutable `ServiceContext` shared by every worker. A failed
// load leaves `generator` empty: the service still starts, health
// reports `model_loaded: false` and generation answers 503.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod types;
pub mod ui;

use actix_cors::Cors;
use actix_web::{middleware::from_fn, web, App, HttpServer};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::domain::task::Task;
use crate::domain::traits::TextGenerator;
use error::ApiError;

/// Shared, read-only state of a running service.
#[derive(Clone)]
pub struct ServiceContext {
    pub task:       Task,
    pub generator:  Option<Arc<dyn TextGenerator>>,
    /// Name reported by the health endpoint.
    pub model_name: String,
}

impl ServiceContext {
    pub fn new(config: &Config, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self {
            task: config.task,
            generator,
            model_name: health_model_name(config),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.generator.is_some()
    }
}

/// Summarization reports the base checkpoint it was tuned from, text
/// generation the name of its fine-tuned model directory.
fn health_model_name(config: &Config) -> String {
    match config.task {
        Task::Summarization => config.model.model_name.clone(),
        Task::TextGeneration => Path::new(&config.paths.model_dir)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| config.paths.model_dir.clone()),
    }
}

/// Malformed or mistyped JSON bodies become 422s, like failed
/// field validation.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::malformed_body(err.to_string()).into())
}

/// Register state, body config and routes for `ctx`.
pub fn configure_app(cfg: &mut web::ServiceConfig, ctx: ServiceContext) {
    let task = ctx.task;
    cfg.app_data(web::Data::new(ctx))
        .app_data(json_config());
    routes::configure_routes(cfg, task);
}

/// Start the API server
pub async fn start_server(ctx: ServiceContext, bind_address: String) -> std::io::Result<()> {
    tracing::info!(
        "Starting {} API on {} (model loaded: {})",
        ctx.task.slug(),
        bind_address,
        ctx.is_loaded()
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let ctx = ctx.clone();
        App::new()
            .wrap(cors)
            .wrap(from_fn(middleware::log_request))
            .configure(move |c| configure_app(c, ctx))
    })
    .bind(&bind_address)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traits::{GenerationOutput, GenerationParams};
    use actix_web::{http::StatusCode, test};
    use serde_json::{json, Value};

    /// Returns the first `max_length` words of the input.
    struct FirstWords;

    impl TextGenerator for FirstWords {
        fn generate(&self, input: &str, params: &GenerationParams) -> anyhow::Result<GenerationOutput> {
            let n    = params.max_length.unwrap_or(5).min(5);
            let text = input.split_whitespace().take(n).collect::<Vec<_>>().join(" ");
            Ok(GenerationOutput::new(input, text))
        }
        fn model_name(&self) -> &str {
            "first-words"
        }
    }

    struct Broken;

    impl TextGenerator for Broken {
        fn generate(&self, _: &str, _: &GenerationParams) -> anyhow::Result<GenerationOutput> {
            anyhow::bail!("CUDA out of memory")
        }
        fn model_name(&self) -> &str {
            "broken"
        }
    }

    /// Reports the parameters it was called with.
    struct ParamsEcho;

    impl TextGenerator for ParamsEcho {
        fn generate(&self, input: &str, p: &GenerationParams) -> anyhow::Result<GenerationOutput> {
            let text = format!("beams {:?} length {:?}", p.num_beams, p.max_length);
            Ok(GenerationOutput::new(input, text))
        }
        fn model_name(&self) -> &str {
            "params-echo"
        }
    }

    fn ctx(task: Task, generator: Option<Arc<dyn TextGenerator>>) -> ServiceContext {
        ServiceContext::new(&Config::for_task(task), generator)
    }

    macro_rules! app {
        ($ctx:expr) => {{
            let ctx = $ctx;
            test::init_service(App::new().configure(move |c| configure_app(c, ctx))).await
        }};
    }

    #[actix_web::test]
    async fn test_health_reports_loaded_model() {
        let app = app!(ctx(Task::Summarization, Some(Arc::new(FirstWords))));
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["model_name"], "t5-small");
    }

    #[actix_web::test]
    async fn test_generate_health_without_model() {
        let app = app!(ctx(Task::TextGeneration, None));
        let req = test::TestRequest::get().uri("/api/generate/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["model_loaded"], false);
        assert_eq!(body["model_name"], "gpt2-finetuned");
    }

    #[actix_web::test]
    async fn test_summarize_valid_request() {
        let app = app!(ctx(Task::Summarization, Some(Arc::new(FirstWords))));
        let req = test::TestRequest::post()
            .uri("/api/summarize")
            .set_json(json!({ "text": "The quick brown fox jumps over the lazy dog." }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert!(!body["summary"].as_str().unwrap().is_empty());
        assert_eq!(body["input_length"], 9);
        assert!(body["output_length"].as_u64().is_some());
        assert!(body["processing_time"].as_f64().unwrap() >= 0.0);
    }

    #[actix_web::test]
    async fn test_summarize_request_params_reach_generator() {
        let app = app!(ctx(Task::Summarization, Some(Arc::new(ParamsEcho))));
        let req = test::TestRequest::post()
            .uri("/api/summarize")
            .set_json(json!({ "text": "some text to summarize", "max_length": 42, "num_beams": 2 }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["summary"], "beams Some(2) length Some(42)");
    }

    #[actix_web::test]
    async fn test_summarize_short_text_is_422() {
        let app = app!(ctx(Task::Summarization, Some(Arc::new(FirstWords))));
        let req = test::TestRequest::post()
            .uri("/api/summarize")
            .set_json(json!({ "text": "too short" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"][0]["loc"], json!(["body", "text"]));
    }

    #[actix_web::test]
    async fn test_validation_runs_before_model_check() {
        let app = app!(ctx(Task::Summarization, None));
        let req = test::TestRequest::post()
            .uri("/api/summarize")
            .set_json(json!({ "text": "long enough text here", "num_beams": 0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn test_malformed_json_is_422() {
        let app = app!(ctx(Task::TextGeneration, Some(Arc::new(FirstWords))));
        let req = test::TestRequest::post()
            .uri("/api/generate")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"summary\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn test_unloaded_model_is_503() {
        let app = app!(ctx(Task::TextGeneration, None));
        let req = test::TestRequest::post()
            .uri("/api/generate")
            .set_json(json!({ "summary": "A fox jumps." }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Model not loaded. Please try again later.");
    }

    #[actix_web::test]
    async fn test_generation_failure_is_500() {
        let app = app!(ctx(Task::TextGeneration, Some(Arc::new(Broken))));
        let req = test::TestRequest::post()
            .uri("/api/generate")
            .set_json(json!({ "summary": "A fox jumps.", "max_length": 60 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Text generation failed: CUDA out of memory");
    }

    #[actix_web::test]
    async fn test_generate_valid_request() {
        let app = app!(ctx(Task::TextGeneration, Some(Arc::new(FirstWords))));
        let req = test::TestRequest::post()
            .uri("/api/generate")
            .set_json(json!({ "summary": "A quick fox jumps over dogs." }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["generated_text"], "A quick fox jumps over");
        assert_eq!(body["input_length"], 6);
        assert_eq!(body["output_length"], 5);
    }

    #[actix_web::test]
    async fn test_other_task_routes_absent() {
        let app = app!(ctx(Task::TextGeneration, Some(Arc::new(FirstWords))));
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_index_serves_html() {
        let app = app!(ctx(Task::Summarization, None));
        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert!(std::str::from_utf8(&body).unwrap().contains("/api/summarize"));
    }
}
