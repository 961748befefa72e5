// Gmail alert mail - an RFC-822 message with an HTML body, base64url
// encoded and posted to the signed-in user's send endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::auth::AccessTokenProvider;
use crate::session::TrackPoint;

use super::{check_status, maps_link, AlertMailer, NotifyError};

const GMAIL_SEND_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";
const ALERT_SUBJECT: &str = "Emergency alert";

pub struct GmailMailer {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl GmailMailer {
    pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self::with_endpoint(GMAIL_SEND_ENDPOINT.to_string(), tokens)
    }

    pub fn with_endpoint(endpoint: String, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            tokens,
        }
    }
}

#[async_trait]
impl AlertMailer for GmailMailer {
    async fn send_alert(
        &self,
        to: &str,
        location: Option<&TrackPoint>,
    ) -> Result<(), NotifyError> {
        let raw = build_rfc822(to, ALERT_SUBJECT, &alert_html(location));
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&serde_json::json!({ "raw": URL_SAFE_NO_PAD.encode(raw) }))
            .send()
            .await?;
        check_status(response).await?;

        crate::info!("alert email sent to {to}");
        Ok(())
    }
}

fn build_rfc822(to: &str, subject: &str, html_body: &str) -> String {
    format!(
        "To: {to}\r\n\
         Subject: {subject}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/html; charset=\"UTF-8\"\r\n\
         \r\n\
         {html_body}"
    )
}

/// HTML body with a map link when a position is known.
fn alert_html(location: Option<&TrackPoint>) -> String {
    match location {
        Some(point) => format!(
            "<h2>Emergency alert</h2>\
             <p>I need help. This message was sent automatically by my safety app.</p>\
             <p>Last known location: <a href=\"{}\">{:.6}, {:.6}</a></p>",
            maps_link(point),
            point.latitude,
            point.longitude
        ),
        None => "<h2>Emergency alert</h2>\
                 <p>I need help. This message was sent automatically by my safety app.</p>\
                 <p>My location is currently unavailable.</p>"
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> TrackPoint {
        TrackPoint {
            latitude: 37.421998,
            longitude: -122.084,
            altitude: 5.0,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_rfc822_layout() {
        let raw = build_rfc822("ally@example.com", "Emergency alert", "<p>hi</p>");
        assert!(raw.starts_with("To: ally@example.com\r\n"));
        assert!(raw.contains("Subject: Emergency alert\r\n"));
        assert!(raw.contains("Content-Type: text/html"));
        // Blank line separates headers from the body
        assert!(raw.contains("\r\n\r\n<p>hi</p>"));
    }

    #[test]
    fn test_alert_html_links_to_location() {
        let html = alert_html(Some(&point()));
        assert!(html.contains("https://maps.google.com/?q=37.421998,-122.084000"));
        assert!(html.contains("37.421998, -122.084000"));
    }

    #[test]
    fn test_alert_html_without_location() {
        let html = alert_html(None);
        assert!(html.contains("location is currently unavailable"));
        assert!(!html.contains("maps.google.com"));
    }
}
