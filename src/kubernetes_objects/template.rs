use std::path::Path;

use k8s_openapi::api::batch::v1::Job;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info, instrument};

const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
const GITHUB_RAW_ACCEPT: &str = "application/vnd.github.v3.raw";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template file '{0}': {1}")]
    Read(String, std::io::Error),

    #[error("Failed to download template from '{0}': {1}")]
    Download(String, reqwest::Error),

    #[error("Could not read template file from '{0}' (status {1})")]
    DownloadStatus(String, StatusCode),

    #[error("Template '{0}' is not a valid batch/v1 Job: {1}")]
    Parse(String, serde_yaml::Error),

    #[error("Template '{0}' has no metadata.name")]
    MissingName(String),

    #[error("Template '{0}' has no pod template spec")]
    MissingPodSpec(String),
}

/// Loads a Job template from a local path or an `https://` URL.
#[instrument("load_template", level = "debug")]
pub async fn load_template(source: &str) -> Result<Job, TemplateError> {
    let bytes = if source.starts_with("https://") {
        download(source).await?
    } else {
        tokio::fs::read(Path::new(source))
            .await
            .map_err(|e| TemplateError::Read(source.to_string(), e))?
    };
    parse_template(source, &bytes)
}

async fn download(url: &str) -> Result<Vec<u8>, TemplateError> {
    let token = std::env::var(GITHUB_TOKEN_ENV)
        .ok()
        .filter(|token| !token.is_empty());
    if token.is_some() {
        debug!("Using {GITHUB_TOKEN_ENV} to download the template.");
    }

    let response = template_request(&reqwest::Client::new(), url, token.as_deref())
        .send()
        .await
        .map_err(|e| TemplateError::Download(url.to_string(), e))?;
    check_status(url, response.status())?;
    let body = response
        .bytes()
        .await
        .map_err(|e| TemplateError::Download(url.to_string(), e))?;
    info!("Downloaded template from '{url}' ({} bytes).", body.len());
    Ok(body.to_vec())
}

fn template_request(
    client: &reqwest::Client,
    url: &str,
    token: Option<&str>,
) -> reqwest::RequestBuilder {
    let request = client.get(url);
    match token {
        Some(token) => request
            .header(reqwest::header::AUTHORIZATION, format!("token {token}"))
            .header(reqwest::header::ACCEPT, GITHUB_RAW_ACCEPT),
        None => request,
    }
}

fn check_status(url: &str, status: StatusCode) -> Result<(), TemplateError> {
    if status != StatusCode::OK {
        return Err(TemplateError::DownloadStatus(url.to_string(), status));
    }
    Ok(())
}

pub(crate) fn parse_template(source: &str, bytes: &[u8]) -> Result<Job, TemplateError> {
    let job: Job =
        serde_yaml::from_slice(bytes).map_err(|e| TemplateError::Parse(source.to_string(), e))?;
    if job.metadata.name.as_deref().is_none_or(str::is_empty) {
        return Err(TemplateError::MissingName(source.to_string()));
    }
    if job
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .is_none()
    {
        return Err(TemplateError::MissingPodSpec(source.to_string()));
    }
    Ok(job)
}

/// Appends a 128-bit random hex suffix so repeated runs of one template never collide.
pub fn generate_random_name(name: &str) -> String {
    format!("{name}-{:032x}", rand::random::<u128>())
}
