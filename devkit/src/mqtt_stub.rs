/*!
Mock MQTT client for reporter tests without a broker

Records every published status message and can be switched into a failing
mode to exercise the outbox error path.
*/

use futures::future::{BoxFuture, FutureExt};
use officetrack_core::reporter::MqttPublish;
use officetrack_core::ReportError;
use std::sync::{Arc, Mutex};
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// Stands in for `rumqttc::AsyncClient` behind `MqttReporter`
#[derive(Clone, Default)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following publish fails with `reason`
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock().unwrap() = Some(reason.into());
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub async fn publish<S, V>(&self, topic: S, retain: bool, payload: V) -> Result<(), ReportError>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        if let Some(reason) = self.failure.lock().unwrap().clone() {
            return Err(ReportError::Transport(reason));
        }

        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        };

        log::info!("[MOCK] Published to {}: {} bytes (retain: {})", message.topic, message.payload.len(), retain);
        self.published_messages.lock().unwrap().push(message);
        Ok(())
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parses the last message of a topic as JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let messages = self.find_messages_by_topic(topic);
        if let Some(last_msg) = messages.last() {
            let parsed: T = serde_json::from_slice(&last_msg.payload)?;
            Ok(Some(parsed))
        } else {
            Ok(None)
        }
    }

    /// Topic -> last payload, the view a broker keeps for retained messages
    pub fn retained_view(&self) -> std::collections::HashMap<String, Vec<u8>> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.retain)
            .map(|msg| (msg.topic.clone(), msg.payload.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.published_messages.lock().unwrap().clear();
    }
}

impl MqttPublish for MockMqttClient {
    fn publish_status(
        &self,
        topic: String,
        retain: bool,
        payload: Vec<u8>,
    ) -> BoxFuture<'_, Result<(), ReportError>> {
        async move { self.publish(topic, retain, payload).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_publish() {
        let client = MockMqttClient::new();

        client.publish("test/topic", true, b"test message".to_vec()).await.unwrap();

        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "test/topic");
        assert_eq!(messages[0].payload, b"test message");
        assert!(messages[0].retain);
    }

    #[tokio::test]
    async fn test_retained_view_keeps_last_payload() {
        let client = MockMqttClient::new();
        client.publish("status/dev1", true, b"first".to_vec()).await.unwrap();
        client.publish("status/dev1", true, b"second".to_vec()).await.unwrap();
        client.publish("status/log", false, b"entry".to_vec()).await.unwrap();

        let retained = client.retained_view();
        assert_eq!(retained.len(), 1);
        assert_eq!(retained["status/dev1"], b"second");
    }

    #[tokio::test]
    async fn test_failure_mode() {
        let client = MockMqttClient::new();
        client.fail_with("broker down");
        assert!(client.publish("t", false, Vec::new()).await.is_err());

        client.recover();
        assert!(client.publish("t", false, Vec::new()).await.is_ok());
        assert_eq!(client.get_published_messages().len(), 1);
    }
}
