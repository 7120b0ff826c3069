use crate::error::ApiError;
use crate::model::ApiRoom;
use log::{error, info};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Thin JSON client for the meeting backend REST API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http_client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http_client: Client, base_url: &str) -> Result<Self, ApiError> {
        // Url::join drops the last segment unless the base ends with a slash.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url =
            Url::parse(&normalized).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;

        Ok(ApiClient {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_of(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
    }

    pub async fn fetch_room(&self, slug: &str) -> Result<ApiRoom, ApiError> {
        self.get_json(&format!("rooms/{slug}/")).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url_of(path)?;
        info!("GET {}", url);

        let resp = self.http_client.get(url).send().await?;
        let resp = check_status(path, resp).await?;
        Ok(resp.json::<T>().await?)
    }

    /// POSTs `body` as JSON. The response body, if any, is ignored.
    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let url = self.url_of(path)?;
        info!("POST {}", url);

        let resp = self.http_client.post(url).json(body).send().await?;
        check_status(path, resp).await?;
        Ok(())
    }
}

/// POSTs `body` to an absolute `url` with a bearer token.
pub async fn post_json_with_token<B: Serialize + ?Sized>(
    http_client: &Client,
    url: Url,
    token: &str,
    body: &B,
) -> Result<(), ApiError> {
    let path = url.path().to_string();
    info!("POST {}", url);

    let resp = http_client
        .post(url)
        .bearer_auth(token)
        .json(body)
        .send()
        .await?;
    check_status(&path, resp).await?;
    Ok(())
}

async fn check_status(path: &str, resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let is_empty = status == StatusCode::NO_CONTENT
        || resp
            .headers()
            .get(CONTENT_LENGTH)
            .is_some_and(|len| len.as_bytes() == b"0");
    let message = if is_empty {
        String::new()
    } else {
        resp.text().await.unwrap_or_default()
    };

    error!("Request to {} failed. HTTP Error: {} {}", path, status, message);

    Err(ApiError::Status {
        path: path.to_string(),
        status,
        message,
    })
}
