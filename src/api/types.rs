//! Request and response bodies for the HTTP endpoints
//!
//! Request fields carry serde defaults so clients may omit any optional
//! parameter; `validate` then enforces the documented ranges.

use serde::{Deserialize, Serialize};

use crate::domain::traits::GenerationParams;

// ─── Validation ──────────────────────────────────────────────────────────────

/// One failed field check, reported in the 422 `detail` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub loc:  Vec<String>,
    pub msg:  String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    fn body(field: &str, msg: String, kind: &str) -> Self {
        Self {
            loc:  vec!["body".to_string(), field.to_string()],
            msg,
            kind: kind.to_string(),
        }
    }
}

fn check_min_chars(errors: &mut Vec<FieldError>, field: &str, value: &str, min: usize) {
    if value.chars().count() < min {
        errors.push(FieldError::body(
            field,
            format!("String should have at least {min} characters"),
            "string_too_short",
        ));
    }
}

fn check_range<T>(errors: &mut Vec<FieldError>, field: &str, value: T, min: T, max: T)
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min {
        errors.push(FieldError::body(
            field,
            format!("Input should be greater than or equal to {min}"),
            "greater_than_equal",
        ));
    } else if value > max {
        errors.push(FieldError::body(
            field,
            format!("Input should be less than or equal to {max}"),
            "less_than_equal",
        ));
    }
}

fn finish(errors: Vec<FieldError>) -> Result<(), Vec<FieldError>> {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

// ─── Summarization ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeRequest {
    pub text:       String,
    #[serde(default = "default_summary_length")]
    pub max_length: usize,
    #[serde(default = "default_num_beams")]
    pub num_beams:  usize,
}

fn default_summary_length() -> usize { 128 }
fn default_num_beams() -> usize { 4 }

impl SummarizeRequest {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check_min_chars(&mut errors, "text", &self.text, 10);
        check_range(&mut errors, "max_length", self.max_length, 10, 512);
        check_range(&mut errors, "num_beams", self.num_beams, 1, 10);
        finish(errors)
    }

    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_length: Some(self.max_length),
            num_beams:  Some(self.num_beams),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub summary:         String,
    pub input_length:    usize,
    pub output_length:   usize,
    pub processing_time: f64,
}

// ─── Text Generation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub summary:     String,
    #[serde(default = "default_generate_length")]
    pub max_length:  usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_k")]
    pub top_k:       usize,
    #[serde(default = "default_top_p")]
    pub top_p:       f64,
}

fn default_generate_length() -> usize { 200 }
fn default_temperature() -> f64 { 0.7 }
fn default_top_k() -> usize { 40 }
fn default_top_p() -> f64 { 0.90 }

impl GenerateRequest {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check_min_chars(&mut errors, "summary", &self.summary, 5);
        check_range(&mut errors, "max_length", self.max_length, 50, 512);
        check_range(&mut errors, "temperature", self.temperature, 0.1, 2.0);
        check_range(&mut errors, "top_k", self.top_k, 1, 100);
        check_range(&mut errors, "top_p", self.top_p, 0.1, 1.0);
        finish(errors)
    }

    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_length:  Some(self.max_length),
            temperature: Some(self.temperature),
            top_k:       Some(self.top_k),
            top_p:       Some(self.top_p),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub generated_text:  String,
    pub input_length:    usize,
    pub output_length:   usize,
    pub processing_time: f64,
}

// ─── Health ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status:       String,
    pub model_loaded: bool,
    pub model_name:   String,
}
