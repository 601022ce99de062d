// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram delivery of terminal task notifications.
//!
//! Implements [`Notifier`] over the Bot API `sendMessage` method. Users are
//! mapped to chats by the `telegram.chats` table; users without a chat are
//! skipped.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use railsnipe_config::model::TelegramConfig;
use railsnipe_core::{
    AdapterType, HealthStatus, NotificationKind, Notifier, PluginAdapter, RailsnipeError, UserRef,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Bot API limit on the length of one message, in characters.
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends notifications through a Telegram bot.
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chats: BTreeMap<String, String>,
}

impl TelegramNotifier {
    /// Creates a new notifier.
    ///
    /// Requires `config.bot_token` to be set.
    pub fn new(config: &TelegramConfig) -> Result<Self, RailsnipeError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            RailsnipeError::Config("telegram.bot_token is required for Telegram notifications".into())
        })?;
        if token.is_empty() {
            return Err(RailsnipeError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| RailsnipeError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/bot{token}", config.api_base.trim_end_matches('/')),
            chats: config.chats.clone(),
        })
    }

    async fn call<T: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &T,
    ) -> Result<(), RailsnipeError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.endpoint))
            .json(body)
            .send()
            .await
            .map_err(|e| notify_error(format!("telegram {method} failed: {}", e.without_url())))?;

        let status = response.status();
        let parsed: Option<ApiResponse> = response.json().await.ok();
        match parsed {
            Some(api) if api.ok => Ok(()),
            Some(api) => Err(notify_error(format!(
                "telegram {method} rejected: {}",
                api.description.unwrap_or_else(|| status.to_string())
            ))),
            None => Err(notify_error(format!("telegram {method} returned {status}"))),
        }
    }
}

fn notify_error(message: String) -> RailsnipeError {
    RailsnipeError::Notify {
        message,
        source: None,
    }
}

/// Splits text into pieces Telegram accepts, preferring line boundaries.
pub fn split_message(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for line in text.split_inclusive('\n') {
        let line_chars = line.chars().count();
        if current_chars + line_chars > MAX_MESSAGE_CHARS && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if line_chars > MAX_MESSAGE_CHARS {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(MAX_MESSAGE_CHARS) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_chars += line_chars;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl PluginAdapter for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Notifier
    }

    async fn health_check(&self) -> Result<HealthStatus, RailsnipeError> {
        match self.call("getMe", &serde_json::json!({})).await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), RailsnipeError> {
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(
        &self,
        user: &UserRef,
        kind: NotificationKind,
        message: &str,
    ) -> Result<(), RailsnipeError> {
        let Some(chat_id) = self.chats.get(&user.0) else {
            debug!(user = %user, "no telegram chat mapped, skipping notification");
            return Ok(());
        };

        for chunk in split_message(message) {
            let body = SendMessage {
                chat_id,
                text: &chunk,
                disable_web_page_preview: true,
            };
            if let Err(e) = self.call("sendMessage", &body).await {
                warn!(user = %user, kind = %kind, error = %e, "telegram delivery failed");
                return Err(e);
            }
        }
        metrics::counter!("railsnipe_notifications_sent_total", "kind" => kind.to_string())
            .increment(1);
        debug!(user = %user, kind = %kind, "telegram notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api_base: &str) -> TelegramConfig {
        TelegramConfig {
            enabled: true,
            bot_token: Some("123:abc".into()),
            api_base: api_base.to_string(),
            chats: BTreeMap::from([("alice".to_string(), "4242".to_string())]),
        }
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let mut cfg = config("http://localhost");
        cfg.bot_token = None;
        assert!(matches!(
            TelegramNotifier::new(&cfg),
            Err(RailsnipeError::Config(_))
        ));
        cfg.bot_token = Some(String::new());
        assert!(TelegramNotifier::new(&cfg).is_err());
    }

    #[tokio::test]
    async fn sends_to_the_mapped_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({"chat_id": "4242", "text": "❌ 예약 실패\n\nboom"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(&config(&server.uri())).unwrap();
        notifier
            .notify(
                &UserRef("alice".into()),
                NotificationKind::Failure,
                "❌ 예약 실패\n\nboom",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unmapped_users_are_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(0)
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(&config(&server.uri())).unwrap();
        notifier
            .notify(&UserRef("bob".into()), NotificationKind::Success, "hi")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn api_rejection_is_a_notify_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(&config(&server.uri())).unwrap();
        let err = notifier
            .notify(&UserRef("alice".into()), NotificationKind::Success, "hi")
            .await
            .unwrap_err();
        match err {
            RailsnipeError::Notify { message, .. } => assert!(message.contains("chat not found")),
            other => panic!("expected a notify error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_check_calls_get_me() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(&config(&server.uri())).unwrap();
        assert_eq!(notifier.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[test]
    fn short_messages_are_sent_whole() {
        assert_eq!(split_message("a\nb"), vec!["a\nb".to_string()]);
        assert!(split_message("").is_empty());
    }

    #[test]
    fn long_messages_split_on_lines_within_the_limit() {
        let line = format!("{}\n", "가".repeat(3000));
        let text = line.repeat(3);
        let chunks = split_message(&text);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_MESSAGE_CHARS));
        assert_eq!(chunks.concat(), text);

        let single = "x".repeat(MAX_MESSAGE_CHARS * 2 + 1);
        let pieces = split_message(&single);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces.concat(), single);
    }
}
