use std::sync::Arc;

use drive_folder_map_lambda::config::{get_worker_count, Config};
use drive_folder_map_lambda::credentials::{credential_source_from_config, CredentialSource};
use drive_folder_map_lambda::folder_map::init_thread_pool;
use drive_folder_map_lambda::handler::function_handler;
use drive_folder_map_lambda::job::{job_from_config, Job};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::tracing::init_default_subscriber();

    // Cold start: pool, config and clients live for the container lifecycle
    init_thread_pool(get_worker_count());
    let config = Config::from_env()?;
    let http = config.http_client()?;
    let credentials: Arc<dyn CredentialSource> = Arc::from(credential_source_from_config(&config, http.clone()));
    let job: Arc<dyn Job> = Arc::from(job_from_config(&config, http));

    run(service_fn(move |event: LambdaEvent<Value>| {
        let credentials = Arc::clone(&credentials);
        let job = Arc::clone(&job);
        async move { Ok::<_, Error>(function_handler(&event.payload, credentials.as_ref(), job.as_ref()).await) }
    }))
    .await
}
