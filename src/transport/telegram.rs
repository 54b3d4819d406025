use crate::error::{Error, Result};
use crate::transport::{Button, MessageRef, Transport};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};

/// [`Transport`] backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramTransport {
    client: Client,
    base_url: String,
}

impl TelegramTransport {
    pub fn new(bot_token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: format!("https://api.telegram.org/bot{}", bot_token),
        }
    }

    fn keyboard(buttons: &[Button]) -> JsonValue {
        let row: Vec<JsonValue> = buttons
            .iter()
            .map(|b| json!({ "text": b.label, "callback_data": b.callback }))
            .collect();
        json!({ "inline_keyboard": [row] })
    }

    async fn call(&self, method: &str, payload: &JsonValue) -> Result<JsonValue> {
        let resp = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(payload)
            .send()
            .await?;
        let body: JsonValue = resp.json().await?;
        if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let description = body
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown Telegram error");
            return Err(Error::Internal(format!(
                "Telegram {} failed: {}",
                method, description
            )));
        }
        Ok(body)
    }

    fn message_ref(chat_id: i64, body: &JsonValue) -> Result<MessageRef> {
        let message_id = body
            .pointer("/result/message_id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::Internal("Telegram response missing message_id".to_string()))?;
        Ok(MessageRef {
            chat_id,
            message_id,
        })
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<MessageRef> {
        let body = self
            .call(
                "sendMessage",
                &json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" }),
            )
            .await?;
        Self::message_ref(chat_id, &body)
    }

    async fn send_with_buttons(
        &self,
        chat_id: i64,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageRef> {
        let body = self
            .call(
                "sendMessage",
                &json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "HTML",
                    "reply_markup": Self::keyboard(buttons),
                }),
            )
            .await?;
        Self::message_ref(chat_id, &body)
    }

    async fn edit_message(&self, msg: MessageRef, text: &str, buttons: &[Button]) -> Result<()> {
        self.call(
            "editMessageText",
            &json!({
                "chat_id": msg.chat_id,
                "message_id": msg.message_id,
                "text": text,
                "parse_mode": "HTML",
                "reply_markup": Self::keyboard(buttons),
            }),
        )
        .await?;
        Ok(())
    }

    async fn pin(&self, msg: MessageRef) -> Result<()> {
        self.call(
            "pinChatMessage",
            &json!({
                "chat_id": msg.chat_id,
                "message_id": msg.message_id,
                "disable_notification": true,
            }),
        )
        .await?;
        Ok(())
    }

    async fn unpin(&self, msg: MessageRef) -> Result<()> {
        self.call(
            "unpinChatMessage",
            &json!({
                "chat_id": msg.chat_id,
                "message_id": msg.message_id,
            }),
        )
        .await?;
        Ok(())
    }

    async fn ack_callback(&self, callback_id: &str, text: Option<String>) -> Result<()> {
        let mut payload = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }
        self.call("answerCallbackQuery", &payload).await?;
        Ok(())
    }
}
