use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::{debug, error, info};

use crate::commands::{keyboard_rows, ActivityButton, Command};
use crate::platform::{ContentType, IncomingEvent, Reply};

pub const WELCOME_TEXT: &str = "Привет! Добро пожаловать в мониторинг активностей самоеда Зои!";
pub const ACK_TEXT: &str = "Принято!";
pub const FALLBACK_TEXT: &str = "Я тебя не понял :( воспользуйся кнопками";
pub const FAILURE_TEXT: &str = "Не получилось записать, попробуй ещё раз";

/// A single logged button press.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub recorded_at: DateTime<Local>,
    pub label: String,
}

impl ActivityRecord {
    pub fn now(button: ActivityButton) -> Self {
        Self {
            recorded_at: Local::now(),
            label: button.label().to_string(),
        }
    }

    /// ISO-8601 local time, second precision.
    pub fn timestamp(&self) -> String {
        self.recorded_at.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    /// Row cells in column order.
    pub fn values(&self) -> Vec<String> {
        vec![self.timestamp(), self.label.clone()]
    }
}

/// Destination for activity records. Appends are not idempotent.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn append(&self, record: &ActivityRecord) -> Result<()>;
}

/// Routes each incoming event to exactly one handler.
pub struct Router {
    sink: Arc<dyn ActivitySink>,
}

impl Router {
    pub fn new(sink: Arc<dyn ActivitySink>) -> Self {
        Self { sink }
    }

    /// Handles one event and returns the single reply to send, or `None` for
    /// non-text content. A failed append yields the failure reply, never the
    /// acknowledgment.
    pub async fn handle(&self, event: &IncomingEvent) -> Option<Reply> {
        let text = match (event.content_type, event.text.as_deref()) {
            (ContentType::Text, Some(text)) => text,
            _ => {
                debug!("Ignoring {:?} message in chat {}", event.content_type, event.chat_id);
                return None;
            }
        };

        let reply = match Command::classify(text) {
            Command::Start => self.greet(event.chat_id),
            Command::Activity(button) => match self.record(event.chat_id, button).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!("Failed to record activity: {:#}", e);
                    Reply::text(event.chat_id, FAILURE_TEXT)
                }
            },
            Command::Unrecognized => Reply::text(event.chat_id, FALLBACK_TEXT),
        };
        Some(reply)
    }

    fn greet(&self, chat_id: i64) -> Reply {
        Reply::text(chat_id, WELCOME_TEXT).with_keyboard(keyboard_rows())
    }

    async fn record(&self, chat_id: i64, button: ActivityButton) -> Result<Reply> {
        let record = ActivityRecord::now(button);
        self.sink.append(&record).await?;
        info!("Recorded '{}' at {}", record.label, record.timestamp());
        Ok(Reply::text(chat_id, ACK_TEXT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<ActivityRecord>>,
        fail: bool,
    }

    #[async_trait]
    impl ActivitySink for RecordingSink {
        async fn append(&self, record: &ActivityRecord) -> Result<()> {
            if self.fail {
                anyhow::bail!("Sheets API error (503 Service Unavailable)");
            }
            self.records.lock().await.push(record.clone());
            Ok(())
        }
    }

    fn router() -> (Router, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (Router::new(sink.clone()), sink)
    }

    #[tokio::test]
    async fn test_activity_button_appends_one_row() {
        let (router, sink) = router();

        let reply = router
            .handle(&IncomingEvent::text(42, "🏠 пописала дома"))
            .await;

        assert_eq!(reply, Some(Reply::text(42, ACK_TEXT)));
        let records = sink.records.lock().await;
        assert_eq!(records.len(), 1);

        let values = records[0].values();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1], "🏠 пописала дома");
        let stamp = NaiveDateTime::parse_from_str(&values[0], "%Y-%m-%dT%H:%M:%S").unwrap();
        assert!(stamp <= Local::now().naive_local());
    }

    #[tokio::test]
    async fn test_each_button_is_recorded_with_its_label() {
        let (router, sink) = router();
        for button in ActivityButton::ALL {
            router.handle(&IncomingEvent::text(1, button.label())).await;
        }

        let labels: Vec<String> = sink
            .records
            .lock()
            .await
            .iter()
            .map(|r| r.label.clone())
            .collect();
        let expected: Vec<String> = ActivityButton::ALL
            .iter()
            .map(|b| b.label().to_string())
            .collect();
        assert_eq!(labels, expected);
    }

    #[tokio::test]
    async fn test_repeated_press_is_not_deduplicated() {
        let (router, sink) = router();
        let event = IncomingEvent::text(1, "🌳 покакала на улице");
        router.handle(&event).await;
        router.handle(&event).await;
        assert_eq!(sink.records.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_start_sends_keyboard_without_mutation() {
        let (router, sink) = router();

        let reply = router
            .handle(&IncomingEvent::text(7, "/start"))
            .await
            .unwrap();

        assert_eq!(reply.text, WELCOME_TEXT);
        let keyboard = reply.keyboard.unwrap();
        assert_eq!(keyboard.iter().map(Vec::len).sum::<usize>(), 4);
        assert!(sink.records.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_text_gets_fallback_only() {
        let (router, sink) = router();

        for text in ["blah", "/stop", "🏠", "Принято!"] {
            let reply = router.handle(&IncomingEvent::text(3, text)).await;
            assert_eq!(reply, Some(Reply::text(3, FALLBACK_TEXT)));
        }
        assert!(sink.records.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_text_content_is_ignored() {
        let (router, sink) = router();
        let event = IncomingEvent {
            chat_id: 5,
            text: None,
            content_type: ContentType::Sticker,
        };

        assert_eq!(router.handle(&event).await, None);
        assert!(sink.records.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_append_replies_with_failure_only() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let router = Router::new(sink.clone());

        let reply = router
            .handle(&IncomingEvent::text(9, "🏠 покакала дома"))
            .await;

        assert_eq!(reply, Some(Reply::text(9, FAILURE_TEXT)));
        assert!(sink.records.lock().await.is_empty());
    }

    #[test]
    fn test_record_values_order() {
        let record = ActivityRecord::now(ActivityButton::ALL[2]);
        let values = record.values();
        assert_eq!(values[0], record.timestamp());
        assert_eq!(values[1], "🌳 пописала на улице");
    }
}
