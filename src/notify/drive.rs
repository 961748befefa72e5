// Drive evidence upload.
//
// Layout on Drive: one app folder, one subfolder per recording (named by
// the recording file stem, which embeds the capture start timestamp), and
// the audio blob inside it. The upload itself is a single
// multipart/related request: JSON metadata part, then the media part.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AccessTokenProvider;
use crate::session::RecordingSession;

use super::{check_status, NotifyError, SessionUploader};

const DRIVE_FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_ENDPOINT: &str =
    "https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart";
const APP_FOLDER: &str = "Haven Recordings";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const AUDIO_MIME: &str = "audio/mp4";

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

pub struct DriveUploader {
    http: reqwest::Client,
    files_endpoint: String,
    upload_endpoint: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl DriveUploader {
    pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self::with_endpoints(
            DRIVE_FILES_ENDPOINT.to_string(),
            DRIVE_UPLOAD_ENDPOINT.to_string(),
            tokens,
        )
    }

    pub fn with_endpoints(
        files_endpoint: String,
        upload_endpoint: String,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            files_endpoint,
            upload_endpoint,
            tokens,
        }
    }

    /// Resolve a folder by name (optionally under a parent), creating it
    /// when absent. Returns the folder id.
    async fn find_or_create_folder(
        &self,
        token: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, NotifyError> {
        let mut query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            name.replace('\'', "\\'"),
            FOLDER_MIME
        );
        if let Some(parent) = parent {
            query.push_str(&format!(" and '{parent}' in parents"));
        }

        let response = self
            .http
            .get(&self.files_endpoint)
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("fields", "files(id)")])
            .send()
            .await?;
        let listing: FileList = check_status(response).await?.json().await?;

        if let Some(found) = listing.files.into_iter().next() {
            return Ok(found.id);
        }

        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
        });
        if let Some(parent) = parent {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let response = self
            .http
            .post(&self.files_endpoint)
            .bearer_auth(token)
            .json(&metadata)
            .send()
            .await?;
        let created: DriveFile = check_status(response).await?.json().await?;
        crate::debug!("created Drive folder '{name}' ({})", created.id);
        Ok(created.id)
    }
}

#[async_trait]
impl SessionUploader for DriveUploader {
    async fn upload(&self, session: &RecordingSession) -> Result<(), NotifyError> {
        let token = self.tokens.access_token().await?;
        let audio = tokio::fs::read(&session.audio_file_reference).await?;

        let file_name = blob_file_name(&session.audio_file_reference);
        let subfolder = file_name
            .strip_suffix(".m4a")
            .unwrap_or(&file_name)
            .to_string();

        let app_folder = self.find_or_create_folder(&token, APP_FOLDER, None).await?;
        let session_folder = self
            .find_or_create_folder(&token, &subfolder, Some(&app_folder))
            .await?;

        let metadata = serde_json::json!({
            "name": file_name,
            "parents": [session_folder],
        });
        let boundary = format!("haven-{}", Uuid::new_v4());
        let body = multipart_related(&boundary, &metadata, AUDIO_MIME, &audio);

        let response = self
            .http
            .post(&self.upload_endpoint)
            .bearer_auth(&token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await?;
        check_status(response).await?;

        crate::info!("session {} uploaded to Drive", session.id);
        Ok(())
    }
}

fn blob_file_name(reference: &str) -> String {
    std::path::Path::new(reference)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| reference.to_string())
}

/// Assemble the two-part multipart/related body: metadata, then media.
fn multipart_related(
    boundary: &str,
    metadata: &serde_json::Value,
    media_mime: &str,
    media: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(media.len() + 512);
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: {media_mime}\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
