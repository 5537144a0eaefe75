//! MQTT status reporter
//!
//! Upsert maps onto a retained publish per device topic: the broker keeps
//! only the last message of each topic. Append publishes non-retained
//! documents on a shared log topic.

use super::StatusReporter;
use crate::error::ReportError;
use crate::model::{PresenceReport, StatusDocument, WriteMode};
use futures::future::{BoxFuture, FutureExt};
use rumqttc::{AsyncClient, QoS};
use tracing::debug;

/// Minimal publishing surface, so tests can stand in for `AsyncClient`
pub trait MqttPublish: Send + Sync {
    fn publish_status(
        &self,
        topic: String,
        retain: bool,
        payload: Vec<u8>,
    ) -> BoxFuture<'_, Result<(), ReportError>>;
}

impl MqttPublish for AsyncClient {
    fn publish_status(
        &self,
        topic: String,
        retain: bool,
        payload: Vec<u8>,
    ) -> BoxFuture<'_, Result<(), ReportError>> {
        async move {
            self.publish(topic, QoS::AtLeastOnce, retain, payload)
                .await
                .map_err(ReportError::from)
        }
        .boxed()
    }
}

pub struct MqttReporter<P = AsyncClient> {
    publisher: P,
    topic_prefix: String,
    collection: String,
    mode: WriteMode,
}

impl<P: MqttPublish> MqttReporter<P> {
    pub fn new(publisher: P, topic_prefix: impl Into<String>, collection: impl Into<String>, mode: WriteMode) -> Self {
        Self {
            publisher,
            topic_prefix: topic_prefix.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            mode,
        }
    }

    /// Topic a document with `key` is published on
    pub fn topic_for(&self, key: &str) -> String {
        match self.mode {
            WriteMode::Upsert => format!("{}/{}/{}", self.topic_prefix, self.collection, key),
            WriteMode::Append => format!("{}/{}/log", self.topic_prefix, self.collection),
        }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

impl<P: MqttPublish> StatusReporter for MqttReporter<P> {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn record(&self, report: PresenceReport) -> BoxFuture<'_, Result<(), ReportError>> {
        async move {
            let (key, document) = StatusDocument::prepare(&report, self.mode);
            let topic = self.topic_for(&key);
            let payload = serde_json::to_vec(&document)?;
            let retain = self.mode == WriteMode::Upsert;

            self.publisher.publish_status(topic.clone(), retain, payload).await?;
            debug!("Published status to {} (retain: {})", topic, retain);
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullPublisher;

    impl MqttPublish for NullPublisher {
        fn publish_status(&self, _: String, _: bool, _: Vec<u8>) -> BoxFuture<'_, Result<(), ReportError>> {
            async { Ok(()) }.boxed()
        }
    }

    #[test]
    fn test_topics() {
        let upsert = MqttReporter::new(NullPublisher, "officetrack/", "userStatus", WriteMode::Upsert);
        assert_eq!(upsert.topic_for("a1b2"), "officetrack/userStatus/a1b2");

        let append = MqttReporter::new(NullPublisher, "officetrack", "userStatus", WriteMode::Append);
        assert_eq!(append.topic_for("any-id"), "officetrack/userStatus/log");
    }
}
