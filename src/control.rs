//! Control surface for per-application subscriptions
//!
//! Thin request validation in front of [`SubscriptionManager`]: a missing or
//! empty application name is a client error, never a crash.

use crate::error::BridgeError;
use crate::manager::SubscriptionManager;
use serde::Serialize;

/// Response returned by control operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ControlResponse {
    /// Operation succeeded (204)
    NoContent,
    /// Invalid request arguments (400)
    BadRequest { error: String, message: String },
    /// Module not active or host refused the request (503)
    Unavailable { message: String },
}

impl ControlResponse {
    /// HTTP-style status code
    pub fn status(&self) -> u16 {
        match self {
            ControlResponse::NoContent => 204,
            ControlResponse::BadRequest { .. } => 400,
            ControlResponse::Unavailable { .. } => 503,
        }
    }

    fn bad_request(message: &str) -> Self {
        ControlResponse::BadRequest {
            error: "Invalid argument".to_string(),
            message: message.to_string(),
        }
    }
}

impl From<BridgeError> for ControlResponse {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::InvalidInput(message) => ControlResponse::bad_request(&message),
            other => ControlResponse::Unavailable {
                message: other.to_string(),
            },
        }
    }
}

/// Control operations exposed to external controllers
#[derive(Clone)]
pub struct ControlApi {
    manager: SubscriptionManager,
}

impl ControlApi {
    pub fn new(manager: SubscriptionManager) -> Self {
        Self { manager }
    }

    /// Start forwarding events for `application_name`
    pub async fn subscribe_application(&self, application_name: Option<&str>) -> ControlResponse {
        let Some(app) = application_name.filter(|name| !name.is_empty()) else {
            return ControlResponse::bad_request("No application specified");
        };

        match self.manager.subscribe_application(app).await {
            Ok(()) => ControlResponse::NoContent,
            Err(e) => {
                tracing::warn!(application = %app, error = %e, "Subscribe request failed");
                e.into()
            }
        }
    }

    /// Stop forwarding events for `application_name`
    pub async fn unsubscribe_application(&self, application_name: Option<&str>) -> ControlResponse {
        let Some(app) = application_name.filter(|name| !name.is_empty()) else {
            return ControlResponse::bad_request("No application specified");
        };

        match self.manager.unsubscribe_application(app).await {
            Ok(()) => ControlResponse::NoContent,
            Err(e) => {
                tracing::warn!(application = %app, error = %e, "Unsubscribe request failed");
                e.into()
            }
        }
    }
}
