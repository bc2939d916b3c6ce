use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::credentials::AccessToken;
use crate::drive::{DriveClient, DriveError};
use crate::folder_map::{sync_folder_map, MapSettings};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum JobError {
    #[error(transparent)]
    Drive(#[from] DriveError),
}

/// What a successful run did; logged by the handler, never sent to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Skipped,
    MapWritten { file_id: String },
}

/// The optional work done with the invocation's credentials.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self, token: &AccessToken) -> Result<JobOutcome, JobError>;
}

pub struct NoopJob;

#[async_trait]
impl Job for NoopJob {
    async fn run(&self, _token: &AccessToken) -> Result<JobOutcome, JobError> {
        Ok(JobOutcome::Skipped)
    }
}

pub struct FolderMapJob {
    http: reqwest::Client,
    drive_api_url: String,
    settings: MapSettings,
}

impl FolderMapJob {
    pub fn new(http: reqwest::Client, drive_api_url: impl Into<String>, settings: MapSettings) -> Self {
        Self { http, drive_api_url: drive_api_url.into(), settings }
    }
}

#[async_trait]
impl Job for FolderMapJob {
    async fn run(&self, token: &AccessToken) -> Result<JobOutcome, JobError> {
        let client = DriveClient::new(self.http.clone(), self.drive_api_url.clone(), token.clone());
        let file_id = sync_folder_map(&client, &self.settings).await?;
        Ok(JobOutcome::MapWritten { file_id })
    }
}

// `Config` rejects a half-set drive pair, so anything but both set means no remote work
pub fn job_from_config(config: &Config, http: reqwest::Client) -> Box<dyn Job> {
    match (&config.shared_drive_id, &config.shared_drive_folder) {
        (Some(drive_id), Some(target_folder)) => Box::new(FolderMapJob::new(
            http,
            config.drive_api_url.clone(),
            MapSettings {
                drive_id: drive_id.clone(),
                target_folder: target_folder.clone(),
                filename: config.map_filename.clone(),
            },
        )),
        _ => {
            warn!("SHARED_DRIVE_ID and SHARED_DRIVE_FOLDER not set; running without remote work");
            Box::new(NoopJob)
        }
    }
}
