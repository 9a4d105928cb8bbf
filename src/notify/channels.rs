use std::io::{IsTerminal, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;

use super::{PUSH_TAG, PushMessage};

pub trait SoundPlayer: Send {
    /// Whether playback can happen right now.
    fn is_ready(&self) -> bool;
    fn play(&mut self) -> Result<()>;
}

/// Rings the terminal bell on stderr. Only ready when stderr is attached to a terminal.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn is_ready(&self) -> bool { std::io::stderr().is_terminal() }

    fn play(&mut self) -> Result<()> {
        let mut err = std::io::stderr();
        err.write_all(b"\x07")?;
        err.flush()?;
        Ok(())
    }
}

#[async_trait]
pub trait PushNotifier: Send + Sync {
    /// Capability check; unavailable channels are skipped, never retried.
    fn is_available(&self) -> bool;
    async fn deliver(&self, msg: &PushMessage) -> Result<()>;
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    title: &'a str,
    body: &'a str,
    tag: &'a str,
    timestamp: i64,
}

/// Posts push notifications to a webhook. Without a URL the channel reports unavailable.
#[derive(Clone)]
pub struct WebhookPush {
    http: HttpClient,
    url: Option<String>,
}

impl WebhookPush {
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder().timeout(timeout).build().context("build push client")?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl PushNotifier for WebhookPush {
    fn is_available(&self) -> bool { self.url.is_some() }

    async fn deliver(&self, msg: &PushMessage) -> Result<()> {
        let Some(url) = self.url.as_deref() else { return Ok(()) };
        let body = WebhookBody {
            title: &msg.title,
            body: &msg.body,
            tag: PUSH_TAG,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.http
            .post(url)
            .json(&body)
            .send()
            .await
            .context("push webhook request")?
            .error_for_status()
            .context("push webhook status")?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_without_url_is_unavailable() {
        let push = WebhookPush::new(None, Duration::from_secs(1)).unwrap();
        assert!(!push.is_available());
        let push = WebhookPush::new(Some("http://127.0.0.1:9/hook".into()), Duration::from_secs(1)).unwrap();
        assert!(push.is_available());
    }

    #[tokio::test]
    async fn unavailable_webhook_delivery_is_a_no_op() {
        let push = WebhookPush::new(None, Duration::from_secs(1)).unwrap();
        let msg = PushMessage { title: "t".into(), body: "b".into() };
        assert!(push.deliver(&msg).await.is_ok());
    }
}
