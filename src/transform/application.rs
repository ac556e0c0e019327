//! Per-application events

use super::{
    check_filter, event_type, log_drop, DropReason, EventClass, EventTransformer, Outcome,
    CATEGORY_STASIS,
};
use crate::error::{BridgeError, Result};
use crate::headers::Headers;
use crate::routing::{RoutingKey, RoutingPrefix};
use crate::types::{BusMessage, Envelope};
use serde_json::Value;

impl EventTransformer {
    /// Handle one event delivered to a registered application
    ///
    /// The document is owned for the duration of this call; the `application`
    /// field is injected into it before it is wrapped.
    pub async fn handle_application(&self, application: &str, message: BusMessage) -> Result<Outcome> {
        let message = match message {
            BusMessage::Stasis(message) => message,
            BusMessage::SubscriptionEnd => return Ok(Outcome::Dropped(DropReason::SubscriptionEnd)),
        };

        let mut data = message.document.ok_or_else(|| {
            BridgeError::MalformedEvent(format!(
                "event for application '{}' has no JSON representation",
                application
            ))
        })?;
        let name = event_type(&data)?;

        let config = self.publisher.config().snapshot();
        if let Some(reason) = check_filter(&config.filter, &name, &data) {
            log_drop(&EventClass::Application(application.to_string()), &name, reason);
            return Ok(Outcome::Dropped(reason));
        }

        let routing_key = RoutingKey::for_source(RoutingPrefix::Application, application)?;
        tracing::debug!(
            application = %application,
            routing_key = %routing_key,
            "Publishing application event"
        );

        match data.as_object_mut() {
            Some(fields) => {
                fields.insert(
                    "application".to_string(),
                    Value::String(application.to_string()),
                );
            }
            None => tracing::error!(
                application = %application,
                "Unable to set application item in event document"
            ),
        }

        let headers = Headers::build(&name, CATEGORY_STASIS, Some(application));
        let envelope = Envelope::for_application(name, data, application);

        self.emit(&config, envelope, headers, routing_key).await
    }
}
