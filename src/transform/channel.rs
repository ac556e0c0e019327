//! Bus-wide channel events

use super::{
    check_filter, event_type, log_drop, DropReason, EventClass, EventTransformer, Outcome,
    CATEGORY_STASIS,
};
use crate::error::{BridgeError, Result};
use crate::headers::Headers;
use crate::routing::{RoutingKey, RoutingPrefix};
use crate::types::{BusMessage, Envelope};

impl EventTransformer {
    /// Handle one message from the all-channel topic
    pub async fn handle_channel(&self, message: BusMessage) -> Result<Outcome> {
        let message = match message {
            BusMessage::Stasis(message) => message,
            BusMessage::SubscriptionEnd => return Ok(Outcome::Dropped(DropReason::SubscriptionEnd)),
        };

        let data = message.document.ok_or_else(|| {
            BridgeError::MalformedEvent("channel message has no JSON representation".to_string())
        })?;
        let name = event_type(&data)?;

        let config = self.publisher.config().snapshot();
        if let Some(reason) = check_filter(&config.filter, &name, &data) {
            log_drop(&EventClass::Channel, &name, reason);
            return Ok(Outcome::Dropped(reason));
        }

        let routing_key = RoutingKey::for_source(RoutingPrefix::Channel, &name)?;
        let headers = Headers::build(&name, CATEGORY_STASIS, None);
        let envelope = Envelope::new(name, data);

        self.emit(&config, envelope, headers, routing_key).await
    }
}
