//! Management-protocol (AMI) events

use super::{
    check_filter, log_drop, DropReason, EventClass, EventTransformer, Outcome, CATEGORY_AMI,
};
use crate::error::Result;
use crate::headers::Headers;
use crate::routing::{RoutingKey, RoutingPrefix};
use crate::types::{BusMessage, Envelope};
use serde_json::{Map, Value};

impl EventTransformer {
    /// Handle one message from the management-event topic
    ///
    /// Messages without an AMI representation are skipped.
    pub async fn handle_manager(&self, message: BusMessage) -> Result<Outcome> {
        let blob = match message {
            BusMessage::Stasis(message) => match message.manager_event {
                Some(blob) => blob,
                None => return Ok(Outcome::Dropped(DropReason::NoManagerRepresentation)),
            },
            BusMessage::SubscriptionEnd => return Ok(Outcome::Dropped(DropReason::SubscriptionEnd)),
        };

        let name = blob.manager_event;
        let data = parse_manager_fields(&name, &blob.extra_fields);

        let config = self.publisher.config().snapshot();
        if let Some(reason) = check_filter(&config.filter, &name, &data) {
            log_drop(&EventClass::Manager, &name, reason);
            return Ok(Outcome::Dropped(reason));
        }

        let routing_key = RoutingKey::for_source(RoutingPrefix::Ami, &name)?;
        let headers = Headers::build(&name, CATEGORY_AMI, None);
        let envelope = Envelope::new(name, data);

        self.emit(&config, envelope, headers, routing_key).await
    }
}

/// Parse an AMI field blob into a JSON object with an explicit `Event` key
///
/// Lines are split on `\r`/`\n`; each line is split at its first `:` (or, if
/// there is none, its first space). A colon anywhere in the line wins over an
/// earlier space, so `Foo Bar: baz` keeps `Foo Bar` as the key. Lines with no
/// separator or an empty key are skipped. Values are trimmed and may be empty.
pub fn parse_manager_fields(event_name: &str, fields: &str) -> Value {
    let mut object = Map::new();

    for line in fields.split(['\r', '\n']) {
        if line.trim().is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once(':').or_else(|| line.split_once(' ')) else {
            tracing::debug!(line = %line, "Skipping AMI field without value");
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        object.insert(key.to_string(), Value::String(value.trim().to_string()));
    }

    object.insert("Event".to_string(), Value::String(event_name.to_string()));
    Value::Object(object)
}
