//! Google Drive application-data folder backend
//!
//! Blobs live in the `appDataFolder` space, which other applications cannot
//! see. Drive lets clients set `modifiedTime`, so each put requests the
//! profile's `updated_at`; the value Drive reports back is what is returned.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::sync::RwLock;

use super::{
    blob_name, credentials, decode_blob, encode_blob, id_from_blob_name, record_from_blob,
    AccessToken, CredentialProvider, RemoteRecord, RemoteStore,
};
use crate::error::{Error, Result};
use crate::profile::Profile;

/// Default Drive REST endpoint
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";

const APP_DATA_SPACE: &str = "appDataFolder";
const PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    modified_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct About {
    user: Option<AboutUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutUser {
    email_address: Option<String>,
    display_name: Option<String>,
}

/// Remote store backed by Drive's application-data folder
pub struct DriveRemote {
    http: reqwest::Client,
    api_base: String,
    session: RwLock<Option<AccessToken>>,
}

impl DriveRemote {
    /// A client with no session; call [`DriveRemote::connect`] before use.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            session: RwLock::new(None),
        }
    }

    /// Acquire a session from `provider`, waiting at most [`credentials::AUTH_TIMEOUT`].
    pub async fn connect(&self, provider: &dyn CredentialProvider) -> Result<()> {
        let token = credentials::authorize(provider, credentials::AUTH_TIMEOUT).await?;
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = Some(token);
        tracing::info!("Connected to Drive application data");
        Ok(())
    }

    /// Drop the current session
    pub fn disconnect(&self) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn token(&self) -> Result<AccessToken> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| Error::RemoteUnavailable("no authorized session".to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                "session expired or not authorized".to_string()
            }
            _ => format!(
                "Drive returned {}: {}",
                status,
                response.text().await.unwrap_or_default()
            ),
        };
        Err(Error::RemoteUnavailable(message))
    }

    async fn list_files(&self, token: &AccessToken) -> Result<Vec<DriveFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("spaces", APP_DATA_SPACE.to_string()),
                ("fields", "nextPageToken,files(id,name,modifiedTime)".to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ];
            if let Some(ref page) = page_token {
                query.push(("pageToken", page.clone()));
            }

            let response = self
                .http
                .get(self.url("/drive/v3/files"))
                .bearer_auth(token.secret())
                .query(&query)
                .send()
                .await?;
            let page: FileList = Self::check(response).await?.json().await?;

            files.extend(
                page.files
                    .into_iter()
                    .filter(|f| id_from_blob_name(&f.name).is_some()),
            );

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(files)
    }

    async fn find_file(&self, token: &AccessToken, id: &str) -> Result<Option<DriveFile>> {
        let name = blob_name(id);
        Ok(self
            .list_files(token)
            .await?
            .into_iter()
            .find(|f| f.name == name))
    }

    async fn download(&self, token: &AccessToken, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(self.url(&format!("/drive/v3/files/{}", file_id)))
            .bearer_auth(token.secret())
            .query(&[("alt", "media")])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(file_id.to_string()));
        }
        Ok(Self::check(response).await?.bytes().await?.to_vec())
    }

    async fn upload_content(&self, token: &AccessToken, file_id: &str, body: Vec<u8>) -> Result<()> {
        let response = self
            .http
            .patch(self.url(&format!("/upload/drive/v3/files/{}", file_id)))
            .bearer_auth(token.secret())
            .query(&[("uploadType", "media")])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn set_modified_time(
        &self,
        token: &AccessToken,
        file_id: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let response = self
            .http
            .patch(self.url(&format!("/drive/v3/files/{}", file_id)))
            .bearer_auth(token.secret())
            .query(&[("fields", "id,name,modifiedTime")])
            .json(&serde_json::json!({ "modifiedTime": modified_time.to_rfc3339() }))
            .send()
            .await?;
        let file: DriveFile = Self::check(response).await?.json().await?;
        Ok(file.modified_time)
    }

    async fn create_file(&self, token: &AccessToken, id: &str) -> Result<String> {
        let response = self
            .http
            .post(self.url("/drive/v3/files"))
            .bearer_auth(token.secret())
            .query(&[("fields", "id,name,modifiedTime")])
            .json(&serde_json::json!({
                "name": blob_name(id),
                "parents": [APP_DATA_SPACE],
                "mimeType": "application/json",
            }))
            .send()
            .await?;
        let file: DriveFile = Self::check(response).await?.json().await?;
        Ok(file.id)
    }
}

#[async_trait]
impl RemoteStore for DriveRemote {
    async fn list_all(&self) -> Result<Vec<RemoteRecord>> {
        let token = self.token()?;
        let files = self.list_files(&token).await?;

        let mut records = Vec::with_capacity(files.len());
        for file in files {
            let body = match self.download(&token, &file.id).await {
                Ok(body) => body,
                // removed between listing and download
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            match record_from_blob(file.id.clone(), &file.name, file.modified_time, &body) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping remote blob {}: {}", file.name, e),
            }
        }

        tracing::debug!("Listed {} remote profiles", records.len());
        Ok(records)
    }

    async fn get(&self, key: &str) -> Result<Profile> {
        let token = self.token()?;
        let body = self.download(&token, key).await?;
        decode_blob(key, &body)
    }

    async fn put(&self, profile: &Profile) -> Result<DateTime<Utc>> {
        let token = self.token()?;
        let body = encode_blob(profile)?;

        let file_id = match self.find_file(&token, &profile.id).await? {
            Some(existing) => existing.id,
            None => self.create_file(&token, &profile.id).await?,
        };

        self.upload_content(&token, &file_id, body).await?;
        let modified_time = self
            .set_modified_time(&token, &file_id, profile.updated_at)
            .await?;

        tracing::debug!("Uploaded {} as {}", profile.name, file_id);
        Ok(modified_time)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let token = self.token()?;
        let Some(file) = self.find_file(&token, id).await? else {
            return Ok(());
        };

        let response = self
            .http
            .delete(self.url(&format!("/drive/v3/files/{}", file.id)))
            .bearer_auth(token.secret())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session
            .read()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    async fn identity(&self) -> Result<Option<String>> {
        let token = self.token()?;
        let response = self
            .http
            .get(self.url("/drive/v3/about"))
            .bearer_auth(token.secret())
            .query(&[("fields", "user(emailAddress,displayName)")])
            .send()
            .await?;
        let about: About = Self::check(response).await?.json().await?;
        Ok(about
            .user
            .and_then(|u| u.email_address.or(u.display_name)))
    }
}
