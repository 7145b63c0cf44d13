//! JSON response envelope.
//!
//! `IntoResponse` for `AppError` lives in expensa-api (orphan rule); this module only holds
//! the wire shapes so every binary renders the same envelope.

use serde::Serialize;
use utoipa::ToSchema;

/// `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// `{"success": false, "error": ..., "code": ..., "recoverable": ..., "suggested_action": ...}`
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>, recoverable: bool) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.into(),
            recoverable,
            suggested_action: None,
            details: None,
        }
    }

    pub fn with_suggested_action(mut self, action: Option<String>) -> Self {
        self.suggested_action = action;
        self
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_envelope_shape() {
        let body = ErrorResponse::new("Expense not found", "NOT_FOUND", false)
            .with_suggested_action(Some("Check the expense id".to_string()));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "success": false,
                "error": "Expense not found",
                "code": "NOT_FOUND",
                "recoverable": false,
                "suggested_action": "Check the expense id",
            })
        );
    }

    #[test]
    fn success_envelope_shape() {
        let body = SuccessResponse::new(json!({"id": 1}));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"success": true, "data": {"id": 1}})
        );
    }
}
