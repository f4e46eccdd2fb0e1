use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};

use crate::core::errors::ApiError;

/// How a remote endpoint expects its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// EPAM DIAL proxy: `Api-Key` header, deployment-scoped URLs.
    Dial,
    /// OpenAI-compatible: bearer token.
    OpenAi,
}

pub fn build_client(timeout_secs: u64) -> Result<Client, ApiError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(ApiError::internal)
}

pub fn authorize(builder: RequestBuilder, flavor: ApiFlavor, api_key: Option<&str>) -> RequestBuilder {
    match (flavor, api_key) {
        (ApiFlavor::Dial, Some(key)) => builder.header("Api-Key", key),
        (ApiFlavor::OpenAi, Some(key)) => builder.bearer_auth(key),
        (_, None) => builder,
    }
}

/// Turns a non-2xx response into `ApiError::Upstream("<label>: <status> - <body>")`.
pub async fn error_for_status(res: Response, label: &str) -> Result<Response, ApiError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let text = res.text().await.unwrap_or_default();
    Err(ApiError::Upstream(format!(
        "{}: {} - {}",
        label,
        status.as_u16(),
        text.trim()
    )))
}

pub fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
