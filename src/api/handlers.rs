//! HTTP request handlers
//!
//! Order of checks on a generation request: body validation (422),
//! model presence (503), then generation on the blocking pool (500 on
//! failure).

use actix_web::{web, HttpResponse};
use std::time::Instant;

use super::error::ApiError;
use super::types::*;
use super::ui;
use super::ServiceContext;
use crate::domain::traits::{GenerationOutput, GenerationParams};

/// GET /api/health, GET /api/generate/health
pub async fn health(ctx: web::Data<ServiceContext>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status:       "healthy".to_string(),
        model_loaded: ctx.is_loaded(),
        model_name:   ctx.model_name.clone(),
    })
}

/// POST /api/summarize
pub async fn summarize(
    ctx:     web::Data<ServiceContext>,
    request: web::Json<SummarizeRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = request.into_inner();
    request.validate().map_err(ApiError::Validation)?;

    let params = request.params();
    let (out, processing_time) = run_generation(&ctx, request.text, params).await?;
    Ok(HttpResponse::Ok().json(SummarizeResponse {
        summary:       out.text,
        input_length:  out.input_length,
        output_length: out.output_length,
        processing_time,
    }))
}

/// POST /api/generate
pub async fn generate(
    ctx:     web::Data<ServiceContext>,
    request: web::Json<GenerateRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = request.into_inner();
    request.validate().map_err(ApiError::Validation)?;

    let params = request.params();
    let (out, processing_time) = run_generation(&ctx, request.summary, params).await?;
    Ok(HttpResponse::Ok().json(GenerateResponse {
        generated_text: out.text,
        input_length:   out.input_length,
        output_length:  out.output_length,
        processing_time,
    }))
}

/// GET /
pub async fn index(ctx: web::Data<ServiceContext>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(ui::page(ctx.task))
}

/// Run the model off the async workers and time it.
async fn run_generation(
    ctx:    &ServiceContext,
    input:  String,
    params: GenerationParams,
) -> Result<(GenerationOutput, f64), ApiError> {
    let generator = ctx.generator.clone().ok_or(ApiError::ModelNotLoaded)?;
    let task      = ctx.task;
    let start     = Instant::now();

    let out = web::block(move || generator.generate(&input, &params))
        .await
        .map_err(|e| ApiError::generation(task, e.to_string()))?
        .map_err(|e| {
            tracing::error!("{} failed: {e:#}", task.label());
            ApiError::generation(task, format!("{e:#}"))
        })?;

    Ok((out, round_millis(start.elapsed().as_secs_f64())))
}

/// Seconds rounded to three decimals.
fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}
