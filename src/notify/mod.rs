//! Trusted-contact notification and evidence fan-out.
//!
//! The platform SMS send stays behind a trait; email, Drive upload, and
//! transcript summarization are HTTP clients against the Google endpoints.
//! Fan-out is per-recipient best-effort: one failed send is logged and
//! counted, never allowed to abort the remaining recipients.

mod drive;
mod email;
mod summarize;

pub use drive::DriveUploader;
pub use email::GmailMailer;
pub use summarize::TranscriptClient;

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::AuthError;
use crate::session::{RecordingSession, TrackPoint};
use crate::settings::{ContactsRepository, SettingsRepository};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("remote service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("sms gateway error: {0}")]
    Sms(String),
    #[error("failed to decode summary response: {0}")]
    Decode(String),
    #[error("audio blob unreadable: {0}")]
    Blob(#[from] std::io::Error),
}

/// Result of a contact fan-out. Partial success is still success; the
/// caller learns how many recipients were reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyOutcome {
    pub sent: usize,
    pub failed: usize,
}

/// Platform SMS send.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, number: &str, body: &str) -> Result<(), NotifyError>;
}

/// Email alert send, one recipient per call.
#[async_trait]
pub trait AlertMailer: Send + Sync {
    async fn send_alert(&self, to: &str, location: Option<&TrackPoint>)
        -> Result<(), NotifyError>;
}

/// Fan-out to all registered contacts.
#[async_trait]
pub trait ContactNotifier: Send + Sync {
    async fn notify_contacts(
        &self,
        location: Option<&TrackPoint>,
    ) -> Result<NotifyOutcome, NotifyError>;
}

/// Evidence upload for a committed session.
#[async_trait]
pub trait SessionUploader: Send + Sync {
    async fn upload(&self, session: &RecordingSession) -> Result<(), NotifyError>;
}

/// SMS body shared by every recipient.
pub fn emergency_message(location: Option<&TrackPoint>) -> String {
    match location {
        Some(point) => format!(
            "EMERGENCY - I need help. My last known location: {}",
            maps_link(point)
        ),
        None => "EMERGENCY - I need help. My location is currently unavailable.".to_string(),
    }
}

pub(crate) fn maps_link(point: &TrackPoint) -> String {
    format!(
        "https://maps.google.com/?q={:.6},{:.6}",
        point.latitude, point.longitude
    )
}

/// Map a non-success response to a `Status` error, keeping the body for
/// the log line.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, NotifyError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(NotifyError::Status { status, body })
}

/// Production contact fan-out over the settings toggles and the stored
/// contact lists.
pub struct EmergencyNotifier {
    settings: SettingsRepository,
    contacts: ContactsRepository,
    sms: Arc<dyn SmsGateway>,
    mailer: Arc<dyn AlertMailer>,
}

impl EmergencyNotifier {
    pub fn new(
        settings: SettingsRepository,
        contacts: ContactsRepository,
        sms: Arc<dyn SmsGateway>,
        mailer: Arc<dyn AlertMailer>,
    ) -> Self {
        Self {
            settings,
            contacts,
            sms,
            mailer,
        }
    }
}

#[async_trait]
impl ContactNotifier for EmergencyNotifier {
    async fn notify_contacts(
        &self,
        location: Option<&TrackPoint>,
    ) -> Result<NotifyOutcome, NotifyError> {
        let settings = self.settings.read().await;
        let contacts = self.contacts.read().await;
        let mut outcome = NotifyOutcome::default();

        if settings.enable_sms_on_emergency {
            let body = emergency_message(location);
            for number in &contacts.sms_numbers {
                match self.sms.send(number, &body).await {
                    Ok(()) => outcome.sent += 1,
                    Err(e) => {
                        outcome.failed += 1;
                        crate::error!("sms to {number} failed: {e}");
                    }
                }
            }
        }

        if settings.enable_email_on_emergency {
            for address in &contacts.email_addresses {
                match self.mailer.send_alert(address, location).await {
                    Ok(()) => outcome.sent += 1,
                    Err(e) => {
                        outcome.failed += 1;
                        crate::error!("email to {address} failed: {e}");
                    }
                }
            }
        }

        if outcome.sent == 0 && outcome.failed == 0 {
            crate::warn!("contact fan-out reached nobody: no channel enabled or no recipients");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
