//! Drive v3 REST client, limited to the calls the folder map needs.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::credentials::AccessToken;
use crate::folder_map::FolderEntry;

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const MAP_MIME_TYPE: &str = "text/plain";
const PAGE_SIZE: &str = "1000";
const MULTIPART_BOUNDARY: &str = "folder_map_part_boundary";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriveError {
    #[error("drive request failed: {0}")]
    Http(String),
    #[error("drive api returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid drive response: {0}")]
    Decode(String),
    #[error("failed to encode folder map: {0}")]
    Encode(String),
}

impl From<reqwest::Error> for DriveError {
    fn from(error: reqwest::Error) -> Self {
        DriveError::Http(error.to_string())
    }
}

#[async_trait]
pub trait FolderStore: Send + Sync {
    async fn list_folders(&self, drive_id: &str) -> Result<Vec<FolderEntry>, DriveError>;
    async fn find_file(&self, folder_id: &str, name: &str) -> Result<Option<String>, DriveError>;
    async fn create_file(&self, folder_id: &str, name: &str, content: String) -> Result<String, DriveError>;
    async fn update_file(&self, file_id: &str, content: String) -> Result<String, DriveError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList<T> {
    #[serde(default = "Vec::new")]
    files: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct FileId {
    id: String,
}

/// Drive client bound to one access token for the length of an invocation.
pub struct DriveClient {
    http: reqwest::Client,
    base_url: String,
    token: AccessToken,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: AccessToken) -> Self {
        Self { http, base_url: base_url.into().trim_end_matches('/').to_string(), token }
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.base_url)
    }

    fn upload_url(&self, file_id: Option<&str>) -> String {
        match file_id {
            Some(id) => format!("{}/upload/drive/v3/files/{id}", self.base_url),
            None => format!("{}/upload/drive/v3/files", self.base_url),
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, DriveError> {
        let response = request.bearer_auth(&self.token.token).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, DriveError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DriveError::Api { status: status.as_u16(), body });
    }
    response
        .json::<T>()
        .await
        .map_err(|error| DriveError::Decode(error.to_string()))
}

// Drive query literals are single-quoted; quotes and backslashes must be escaped
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

fn multipart_body(metadata: &serde_json::Value, content: &str) -> String {
    format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
         --{b}\r\nContent-Type: {MAP_MIME_TYPE}\r\n\r\n{content}\r\n--{b}--",
        b = MULTIPART_BOUNDARY,
    )
}

#[async_trait]
impl FolderStore for DriveClient {
    async fn list_folders(&self, drive_id: &str) -> Result<Vec<FolderEntry>, DriveError> {
        let query = format!("mimeType={} and trashed=false", quote(FOLDER_MIME_TYPE));
        let mut folders = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http.get(self.files_url()).query(&[
                ("q", query.as_str()),
                ("corpora", "drive"),
                ("driveId", drive_id),
                ("includeItemsFromAllDrives", "true"),
                ("supportsAllDrives", "true"),
                ("fields", "nextPageToken, files(id, name, parents)"),
                ("pageSize", PAGE_SIZE),
            ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: FileList<FolderEntry> = self.send(request).await?;
            debug!(count = page.files.len(), "listed folder page");
            folders.extend(page.files);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(folders)
    }

    async fn find_file(&self, folder_id: &str, name: &str) -> Result<Option<String>, DriveError> {
        let query = format!("name = {} and {} in parents and trashed = false", quote(name), quote(folder_id));
        let request = self.http.get(self.files_url()).query(&[
            ("q", query.as_str()),
            ("fields", "files(id)"),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);

        let list: FileList<FileId> = self.send(request).await?;
        Ok(list.files.into_iter().next().map(|file| file.id))
    }

    async fn create_file(&self, folder_id: &str, name: &str, content: String) -> Result<String, DriveError> {
        let metadata = json!({
            "name": name,
            "parents": [folder_id],
            "mimeType": MAP_MIME_TYPE,
        });
        let request = self
            .http
            .post(self.upload_url(None))
            .query(&[("uploadType", "multipart"), ("supportsAllDrives", "true"), ("fields", "id")])
            .header(CONTENT_TYPE, format!("multipart/related; boundary={MULTIPART_BOUNDARY}"))
            .body(multipart_body(&metadata, &content));

        let created: FileId = self.send(request).await?;
        Ok(created.id)
    }

    async fn update_file(&self, file_id: &str, content: String) -> Result<String, DriveError> {
        let request = self
            .http
            .patch(self.upload_url(Some(file_id)))
            .query(&[("uploadType", "media"), ("supportsAllDrives", "true"), ("fields", "id")])
            .header(CONTENT_TYPE, MAP_MIME_TYPE)
            .body(content);

        let updated: FileId = self.send(request).await?;
        Ok(updated.id)
    }
}
