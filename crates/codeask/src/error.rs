//! Error taxonomy shared by the library and the CLI.
//!
//! Only errors from the primary model call propagate out of the ask loop.
//! Tool failures become `"Tool error: ..."` transcript text at the dispatch
//! site, and planner/summarizer/critic failures degrade to defaults.

use thiserror::Error;

/// Errors produced by `codeask`.
#[derive(Debug, Error)]
pub enum Error {
    /// The model requested a tool outside the vocabulary.
    #[error("unknown tool: {name}")]
    ToolNotFound { name: String },

    /// A tool ran (or tried to run) and failed.
    #[error("{tool}: {reason}")]
    ToolExec { tool: String, reason: String },

    /// A write-capable tool was blocked by policy.
    #[error("{tool} denied: {reason}")]
    ToolDenied { tool: String, reason: String },

    /// Transport failure or 5xx from the model endpoint.
    #[error("provider unavailable: {reason}")]
    ProviderUnavailable { reason: String },

    #[error("provider rejected credentials (HTTP {status}): {body}")]
    ProviderAuthFailed { status: u16, body: String },

    #[error("provider rate limited: {body}")]
    ProviderRateLimited { body: String },

    /// The response body or an SSE frame could not be decoded.
    #[error("provider stream error: {reason}")]
    ProviderStream { reason: String },

    #[error("model not found: {model}")]
    ProviderModelNotFound { model: String },

    #[error("missing input: {what}")]
    InputMissing { what: String },

    #[error("invalid config: {reason}")]
    ConfigInvalid { reason: String },
}

impl Error {
    /// Stable taxonomy name, suitable for logs and machine-readable output.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ToolNotFound { .. } => "TOOL_NOT_FOUND",
            Error::ToolExec { .. } => "TOOL_EXEC_ERROR",
            Error::ToolDenied { .. } => "TOOL_DENIED",
            Error::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            Error::ProviderAuthFailed { .. } => "PROVIDER_AUTH_FAILED",
            Error::ProviderRateLimited { .. } => "PROVIDER_RATE_LIMITED",
            Error::ProviderStream { .. } => "PROVIDER_STREAM_ERROR",
            Error::ProviderModelNotFound { .. } => "PROVIDER_MODEL_NOT_FOUND",
            Error::InputMissing { .. } => "INPUT_MISSING",
            Error::ConfigInvalid { .. } => "CONFIG_INVALID",
        }
    }

    /// Transient availability and rate-limit failures may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ProviderUnavailable { .. } | Error::ProviderRateLimited { .. }
        )
    }

    /// Classify a non-2xx HTTP response from the model endpoint.
    pub fn from_status(status: u16, body: String, model: &str) -> Self {
        match status {
            401 | 403 => Error::ProviderAuthFailed { status, body },
            404 => Error::ProviderModelNotFound {
                model: model.to_string(),
            },
            429 => Error::ProviderRateLimited { body },
            500..=599 => Error::ProviderUnavailable {
                reason: format!("HTTP {status}: {body}"),
            },
            _ => Error::ProviderStream {
                reason: format!("HTTP {status}: {body}"),
            },
        }
    }

    pub(crate) fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ToolExec {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::ConfigInvalid {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::ProviderStream {
                reason: e.to_string(),
            }
        } else if let Some(status) = e.status() {
            Error::from_status(status.as_u16(), e.to_string(), "")
        } else {
            Error::ProviderUnavailable {
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(Error::from_status(401, "no".into(), "m").code(), "PROVIDER_AUTH_FAILED");
        assert_eq!(Error::from_status(403, "no".into(), "m").code(), "PROVIDER_AUTH_FAILED");
        assert_eq!(
            Error::from_status(404, "gone".into(), "m").code(),
            "PROVIDER_MODEL_NOT_FOUND"
        );
        assert_eq!(
            Error::from_status(429, "slow down".into(), "m").code(),
            "PROVIDER_RATE_LIMITED"
        );
        assert_eq!(
            Error::from_status(503, "busy".into(), "m").code(),
            "PROVIDER_UNAVAILABLE"
        );
        assert_eq!(
            Error::from_status(400, "bad".into(), "m").code(),
            "PROVIDER_STREAM_ERROR"
        );
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(Error::from_status(429, String::new(), "m").is_retryable());
        assert!(Error::from_status(502, String::new(), "m").is_retryable());
        assert!(!Error::from_status(401, String::new(), "m").is_retryable());
        assert!(!Error::from_status(404, String::new(), "m").is_retryable());
        assert!(!Error::tool("read_file", "missing").is_retryable());
    }

    #[test]
    fn model_not_found_names_model() {
        let err = Error::from_status(404, String::new(), "acme/foo");
        assert_eq!(err.to_string(), "model not found: acme/foo");
    }

    #[test]
    fn tool_exec_display() {
        let err = Error::tool("read_file", "file not found: a.rs");
        assert_eq!(err.to_string(), "read_file: file not found: a.rs");
    }
}
