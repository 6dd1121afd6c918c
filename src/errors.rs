// Stable error model with machine-readable IDs and categorization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error categories used across the control loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCategory {
    /// CandidateSelector could not find a compatible, priced candidate.
    Selection,
    /// Transient cloud-API failure (throttling, 5xx); the tick is abandoned.
    Throttled,
    /// Candidate launch rejected by the cloud (capacity, bid too low).
    CapacityUnavailable,
    /// Every on-demand member of the ASG is protected from termination.
    Protected,
    /// Invalid or contradictory configuration.
    Config,
    /// Anything else; always a bug or an unmodeled cloud response.
    Internal,
}

/// A stable, loggable error: machine ID, category, message, optional hint.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("[{id}] {message}{}", hint.as_deref().map(|h| format!(" (hint: {h})")).unwrap_or_default())]
pub struct AutospottingError {
    pub id: String,
    pub category: ErrorCategory,
    pub message: String,
    pub hint: Option<String>,
}

impl AutospottingError {
    pub fn new(id: impl Into<String>, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn unknown_type(type_id: impl Into<String>) -> Self {
        let type_id = type_id.into();
        Self::new(
            "E_UNKNOWN_TYPE",
            ErrorCategory::Internal,
            format!("instance type '{type_id}' is not in the catalog"),
        )
    }

    pub fn no_candidate(asg: impl Into<String>) -> Self {
        Self::new(
            "E_NO_CANDIDATE",
            ErrorCategory::Selection,
            format!("no compatible spot candidate found for ASG '{}'", asg.into()),
        )
        .with_hint("widen allowed_instance_types or relax the bidding policy")
    }

    pub fn price_unavailable(type_id: impl Into<String>) -> Self {
        Self::new(
            "E_PRICE_UNAVAILABLE",
            ErrorCategory::Selection,
            format!("no spot price sample for type '{}' in any AZ", type_id.into()),
        )
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new("E_API_THROTTLED", ErrorCategory::Throttled, message)
    }

    pub fn api_transient(message: impl Into<String>) -> Self {
        Self::new("E_API_TRANSIENT", ErrorCategory::Throttled, message)
    }

    pub fn capacity_unavailable(type_id: impl Into<String>) -> Self {
        Self::new(
            "E_CAPACITY_UNAVAILABLE",
            ErrorCategory::CapacityUnavailable,
            format!("insufficient capacity for type '{}'", type_id.into()),
        )
    }

    pub fn bid_too_low(type_id: impl Into<String>) -> Self {
        Self::new(
            "E_BID_TOO_LOW",
            ErrorCategory::CapacityUnavailable,
            format!("spot max price rejected for type '{}'", type_id.into()),
        )
    }

    pub fn protected(asg: impl Into<String>) -> Self {
        Self::new(
            "E_PROTECTED",
            ErrorCategory::Protected,
            format!("all on-demand members of ASG '{}' are protected", asg.into()),
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new("E_CONFIG", ErrorCategory::Config, message)
            .with_hint("check command-line flags, environment variables, and ASG tag overrides")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("E_INTERNAL", ErrorCategory::Internal, message)
    }
}

pub type Result<T> = std::result::Result<T, AutospottingError>;
