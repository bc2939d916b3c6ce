use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::credentials::{CredentialError, CredentialSource};
use crate::job::{Job, JobError, JobOutcome};

pub const SUCCESS_MESSAGE: &str = "Function executed successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub status: InvocationStatus,
    pub message: String,
}

impl InvocationResult {
    pub fn success() -> Self {
        Self { status: InvocationStatus::Success, message: SUCCESS_MESSAGE.to_string() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: InvocationStatus::Error, message: message.into() }
    }

    // Derived from the status so the two can never disagree
    pub fn status_code(&self) -> u16 {
        match self.status {
            InvocationStatus::Success => 200,
            InvocationStatus::Error => 500,
        }
    }

    pub fn into_response(self) -> ApiGatewayResponse {
        ApiGatewayResponse {
            status_code: self.status_code(),
            headers: json!({"Content-Type": "application/json"}),
            body: serde_json::to_string(&self).expect("invocation result should serialize"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
enum InvocationError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error(transparent)]
    Job(#[from] JobError),
}

// Works with both payload versions of API Gateway and function URL events
fn request_method(event: &Value) -> &str {
    event
        .pointer("/requestContext/http/method")
        .or_else(|| event.get("httpMethod"))
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN")
}

async fn invoke(credentials: &dyn CredentialSource, job: &dyn Job) -> Result<JobOutcome, InvocationError> {
    let token = credentials.access_token().await?;
    info!("resolved ambient credentials");
    Ok(job.run(&token).await?)
}

// Main handler - every failure becomes the error shape, nothing is returned to the runtime as Err
pub async fn function_handler(
    request: &Value,
    credentials: &dyn CredentialSource,
    job: &dyn Job,
) -> ApiGatewayResponse {
    info!(method = request_method(request), "function execution started");

    let result = match invoke(credentials, job).await {
        Ok(JobOutcome::MapWritten { file_id }) => {
            info!(%file_id, "folder map written");
            InvocationResult::success()
        }
        Ok(JobOutcome::Skipped) => {
            info!("no remote work configured");
            InvocationResult::success()
        }
        Err(failure) => {
            error!(error = %failure, "error executing function");
            InvocationResult::error(failure.to_string())
        }
    };

    result.into_response()
}
