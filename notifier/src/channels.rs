// Notification Channels
// Telegram Bot API push (primary) and SMTP email (fallback)

use crate::error::DeliveryError;
use crate::format::{email_subject, format_message};
use async_trait::async_trait;
use common::{EmailConfig, Signal, TelegramConfig};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// A place a signal can be delivered to
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, signal: &Signal) -> Result<(), DeliveryError>;
}

const TELEGRAM: &str = "telegram";
const EMAIL: &str = "email";

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API `sendMessage`
pub struct TelegramChannel {
    client: Client,
    endpoint: String,
    chat_id: String,
    timeout: Duration,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::transport(TELEGRAM, e))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
            timeout,
        })
    }

    /// Push `message` to `chat_id`
    pub async fn send(&self, chat_id: &str, message: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "chat_id": chat_id, "text": message }))
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_reqwest(e))?;
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                channel: TELEGRAM,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TelegramResponse =
            serde_json::from_str(&body).map_err(|e| DeliveryError::transport(TELEGRAM, e))?;
        if !parsed.ok {
            return Err(DeliveryError::Rejected {
                channel: TELEGRAM,
                status: status.as_u16(),
                body: parsed.description.unwrap_or(body),
            });
        }

        debug!(chat_id, "telegram message accepted");
        Ok(())
    }

    /// The endpoint embeds the bot token, so errors are stripped of their URL.
    fn map_reqwest(&self, err: reqwest::Error) -> DeliveryError {
        let err = err.without_url();
        if err.is_timeout() {
            DeliveryError::Timeout {
                channel: TELEGRAM,
                after: self.timeout,
            }
        } else {
            DeliveryError::transport(TELEGRAM, err)
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        TELEGRAM
    }

    async fn deliver(&self, signal: &Signal) -> Result<(), DeliveryError> {
        self.send(&self.chat_id, &format_message(signal)).await
    }
}

/// SMTP relay. The blocking transport runs on the blocking pool.
pub struct EmailChannel {
    transport: SmtpTransport,
    from: Mailbox,
    to: String,
    timeout: Duration,
}

impl EmailChannel {
    /// `timeout` bounds each SMTP connect and command, so a send that the
    /// dispatcher has given up on does not linger on the blocking pool.
    pub fn new(config: &EmailConfig, timeout: Duration) -> Result<Self, DeliveryError> {
        let not_configured = |reason: String| DeliveryError::NotConfigured {
            channel: EMAIL,
            reason,
        };

        let transport = SmtpTransport::relay(&config.smtp_host)
            .map_err(|e| not_configured(format!("smtp relay {}: {e}", config.smtp_host)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(timeout))
            .build();
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| not_configured(format!("from address: {e}")))?;

        Ok(Self {
            transport,
            from,
            to: config.to.clone(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn send_email(&self, address: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let to = address
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError::transport(EMAIL, format!("to address: {e}")))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| DeliveryError::transport(EMAIL, e))?;

        let transport = self.transport.clone();
        let response = tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| DeliveryError::transport(EMAIL, e))?
            .map_err(|e| DeliveryError::transport(EMAIL, e))?;

        debug!(code = %response.code(), "email accepted by relay");
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        EMAIL
    }

    async fn deliver(&self, signal: &Signal) -> Result<(), DeliveryError> {
        self.send_email(&self.to, &email_subject(signal), &format_message(signal))
            .await
    }
}
