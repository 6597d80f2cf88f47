pub mod telegram;

/// Kind of content carried by an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Text,
    Photo,
    Sticker,
    Voice,
    Other,
}

/// A message received from the chat platform
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    /// Platform-specific chat ID
    pub chat_id: i64,
    /// The message text, if any
    pub text: Option<String>,
    pub content_type: ContentType,
}

impl IncomingEvent {
    #[cfg(test)]
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: Some(text.into()),
            content_type: ContentType::Text,
        }
    }
}

/// A message to send back to the chat
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub chat_id: i64,
    pub text: String,
    /// Reply keyboard, one inner vec per row of button labels
    pub keyboard: Option<Vec<Vec<String>>>,
}

impl Reply {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, rows: Vec<Vec<String>>) -> Self {
        self.keyboard = Some(rows);
        self
    }
}
