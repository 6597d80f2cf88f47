use std::sync::Arc;

use anyhow::Result;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup};
use tracing::{info, warn};

use crate::platform::{ContentType, IncomingEvent, Reply};
use crate::router::Router;

/// Run the Telegram bot platform
pub async fn run(router: Arc<Router>, bot: Bot) -> Result<()> {
    info!("Starting Telegram platform...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router])
        // One key for every update: events are handled strictly one at a time.
        .distribution_function(|_| Some(()))
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn content_type(msg: &Message) -> ContentType {
    if msg.text().is_some() {
        ContentType::Text
    } else if msg.photo().is_some() {
        ContentType::Photo
    } else if msg.sticker().is_some() {
        ContentType::Sticker
    } else if msg.voice().is_some() {
        ContentType::Voice
    } else {
        ContentType::Other
    }
}

fn to_event(msg: &Message) -> IncomingEvent {
    IncomingEvent {
        chat_id: msg.chat.id.0,
        text: msg.text().map(str::to_string),
        content_type: content_type(msg),
    }
}

fn keyboard(rows: Vec<Vec<String>>) -> KeyboardMarkup {
    KeyboardMarkup::new(
        rows.into_iter()
            .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>()),
    )
}

async fn send_reply(bot: &Bot, reply: Reply) -> ResponseResult<()> {
    let request = bot.send_message(ChatId(reply.chat_id), reply.text);
    match reply.keyboard {
        Some(rows) => request.reply_markup(keyboard(rows)).await?,
        None => request.await?,
    };
    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, router: Arc<Router>) -> ResponseResult<()> {
    let event = to_event(&msg);

    info!(
        "Telegram message in chat {} ({:?}): {}",
        event.chat_id,
        event.content_type,
        event.text.as_deref().unwrap_or("")
    );

    if let Some(reply) = router.handle(&event).await {
        send_reply(&bot, reply).await?;
    }

    Ok(())
}
