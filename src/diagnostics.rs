//! Connection tests for the services behind the backend.
//!
//! These exist for inspection, so results are shown raw: pretty-printed JSON
//! on success and the full error detail on failure.

use serde_json::Value;

use crate::api::ApiClient;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticTarget {
    OpenAI,
    Gemini,
    Supabase,
}

impl DiagnosticTarget {
    pub fn all() -> [DiagnosticTarget; 3] {
        [
            DiagnosticTarget::OpenAI,
            DiagnosticTarget::Gemini,
            DiagnosticTarget::Supabase,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            DiagnosticTarget::OpenAI => "OpenAI",
            DiagnosticTarget::Gemini => "Gemini",
            DiagnosticTarget::Supabase => "Supabase",
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            DiagnosticTarget::OpenAI => "/test-openai",
            DiagnosticTarget::Gemini => "/test-gemini",
            DiagnosticTarget::Supabase => "/test-supabase",
        }
    }

    pub fn pending_text(&self) -> String {
        format!("Testing {} connection...", self.label())
    }

    pub async fn run(&self, client: &ApiClient) -> Result<Value, ApiError> {
        client.get(self.endpoint()).await
    }
}

/// Render a test outcome for display
pub fn format_result(result: &Result<Value, ApiError>) -> String {
    match result {
        Ok(value) => format_success(value),
        Err(err) => format_failure(err),
    }
}

pub fn format_success(value: &Value) -> String {
    pretty(value)
}

/// `Details` is the backend's JSON error body, or `{}` when there was none
pub fn format_failure(err: &ApiError) -> String {
    format!("Error: {}\n\nDetails: {}", err, pretty(&err.details()))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
