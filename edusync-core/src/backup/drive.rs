//! Cloud file storage for backups (Google Drive v3 REST).

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::RwLock;

use super::BACKUP_FILE_PREFIX;

pub const DEFAULT_DRIVE_API_BASE: &str = "https://www.googleapis.com";

const BACKUP_MIME_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriveError {
    /// No token, or the server rejected it
    #[error("Cloud storage needs authorization. Set drive.access_token or EDUSYNC_DRIVE_TOKEN.")]
    AuthorizationRequired,
    #[error("Cloud storage request failed: {0}")]
    Transport(String),
    #[error("Cloud storage returned status {0}")]
    Status(u16),
    #[error("Unexpected response from cloud storage: {0}")]
    Decode(String),
}

/// A backup file held by a target.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBackup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_time: Option<String>,
}

/// Somewhere backups can be uploaded to, listed and downloaded from.
#[async_trait]
pub trait BackupTarget: Send + Sync {
    async fn upload(&self, name: &str, contents: Vec<u8>) -> Result<RemoteBackup, DriveError>;

    /// Backups, newest first.
    async fn list(&self) -> Result<Vec<RemoteBackup>, DriveError>;

    async fn download(&self, id: &str) -> Result<Vec<u8>, DriveError>;
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteBackup>,
}

/// Drive client using a bearer token supplied by configuration.
///
/// The token is dropped as soon as the server rejects it; every later call
/// fails with [`DriveError::AuthorizationRequired`] until a new one is set.
#[derive(Debug)]
pub struct DriveClient {
    client: reqwest::Client,
    api_base: String,
    token: RwLock<Option<String>>,
}

impl DriveClient {
    pub fn new(access_token: Option<String>, api_base: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base
                .unwrap_or(DEFAULT_DRIVE_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            token: RwLock::new(access_token.filter(|t| !t.trim().is_empty())),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.into());
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.read().map(|t| t.is_some()).unwrap_or(false)
    }

    fn bearer(&self) -> Result<String, DriveError> {
        self.token
            .read()
            .ok()
            .and_then(|t| t.clone())
            .ok_or(DriveError::AuthorizationRequired)
    }

    fn drop_token(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/drive/v3/files?uploadType=multipart&fields=id,name,createdTime",
            self.api_base
        )
    }

    fn list_url(&self) -> String {
        let query = format!(
            "mimeType='{BACKUP_MIME_TYPE}' and trashed=false and name contains '{BACKUP_FILE_PREFIX}'"
        );
        format!(
            "{}/drive/v3/files?q={}&orderBy={}&fields={}",
            self.api_base,
            urlencoding::encode(&query),
            urlencoding::encode("createdTime desc"),
            urlencoding::encode("files(id,name,createdTime)"),
        )
    }

    fn download_url(&self, id: &str) -> String {
        format!(
            "{}/drive/v3/files/{}?alt=media",
            self.api_base,
            urlencoding::encode(id)
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, DriveError> {
        let token = self.bearer()?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| DriveError::Transport(e.to_string()))?;
        match check_status(response.status()) {
            Ok(()) => Ok(response),
            Err(DriveError::AuthorizationRequired) => {
                tracing::warn!("Cloud storage rejected the access token");
                self.drop_token();
                Err(DriveError::AuthorizationRequired)
            }
            Err(e) => Err(e),
        }
    }
}

fn check_status(status: StatusCode) -> Result<(), DriveError> {
    if status.is_success() {
        Ok(())
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        Err(DriveError::AuthorizationRequired)
    } else {
        Err(DriveError::Status(status.as_u16()))
    }
}

#[async_trait]
impl BackupTarget for DriveClient {
    async fn upload(&self, name: &str, contents: Vec<u8>) -> Result<RemoteBackup, DriveError> {
        let metadata = json!({ "name": name, "mimeType": BACKUP_MIME_TYPE }).to_string();
        let form = Form::new()
            .part(
                "metadata",
                Part::text(metadata)
                    .mime_str("application/json; charset=UTF-8")
                    .map_err(|e| DriveError::Transport(e.to_string()))?,
            )
            .part(
                "file",
                Part::bytes(contents)
                    .file_name(name.to_string())
                    .mime_str(BACKUP_MIME_TYPE)
                    .map_err(|e| DriveError::Transport(e.to_string()))?,
            );
        let response = self
            .send(self.client.post(self.upload_url()).multipart(form))
            .await?;
        let file: RemoteBackup = response
            .json()
            .await
            .map_err(|e| DriveError::Decode(e.to_string()))?;
        tracing::info!("Uploaded backup {} ({})", file.name, file.id);
        Ok(file)
    }

    async fn list(&self) -> Result<Vec<RemoteBackup>, DriveError> {
        let response = self.send(self.client.get(self.list_url())).await?;
        let list: FileList = response
            .json()
            .await
            .map_err(|e| DriveError::Decode(e.to_string()))?;
        Ok(list.files)
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>, DriveError> {
        let response = self.send(self.client.get(self.download_url(id))).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DriveError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
