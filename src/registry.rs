use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};

use crate::config::{Config, Credentials, RetryPolicy};
use crate::error::ArchiveError;
use crate::sample::{SampleCreate, SampleUpdate, StructuredDataPayload};

/// Bearer token obtained once per run and reused for every call. A token
/// expiring mid-batch fails the remaining rows; there is no refresh.
#[derive(Debug, Clone)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Status and decoded body of one registry call. Error bodies are wrapped as
/// `{"error": <text>}` so they can be persisted as audit artifacts directly.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_created(&self) -> bool {
        self.status == 201
    }

    pub fn accession(&self) -> Option<&str> {
        self.body.get("accession").and_then(|value| value.as_str())
    }
}

pub trait RegistryClient: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken, ArchiveError>;
    fn create_sample(
        &self,
        token: &AuthToken,
        payload: &SampleCreate,
    ) -> Result<ApiResponse, ArchiveError>;
    fn update_sample(
        &self,
        token: &AuthToken,
        accession: &str,
        payload: &SampleUpdate,
    ) -> Result<ApiResponse, ArchiveError>;
    fn put_structured_data(
        &self,
        token: &AuthToken,
        accession: &str,
        payload: &StructuredDataPayload,
    ) -> Result<ApiResponse, ArchiveError>;
}

#[derive(Clone)]
pub struct RegistryHttpClient {
    client: Client,
    auth_url: String,
    samples_url: String,
    auth_realms: Vec<String>,
    retry: RetryPolicy,
}

impl RegistryHttpClient {
    pub fn new(config: &Config) -> Result<Self, ArchiveError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("bioarc/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ArchiveError::RegistryHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|err| ArchiveError::RegistryHttp(err.to_string()))?;

        Ok(Self {
            client,
            auth_url: config.endpoints.auth_url.clone(),
            samples_url: config.endpoints.samples_url.clone(),
            auth_realms: config.auth_realms.clone(),
            retry: config.retry,
        })
    }

    fn sample_url(&self, accession: &str) -> String {
        format!("{}/{accession}", self.samples_url)
    }

    fn structured_data_url(&self, accession: &str) -> String {
        format!("{}/{accession}/structureddata", self.samples_url)
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, ArchiveError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.retry.max_retries && is_retryable_status(status) {
                        let delay = self.retry.base_delay_ms * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.retry.max_retries && is_retryable_error(&err) {
                        let delay = self.retry.base_delay_ms * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(ArchiveError::RegistryHttp(err.to_string()));
                }
            }
        }
    }

    fn decode(response: reqwest::blocking::Response) -> Result<ApiResponse, ArchiveError> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|err| ArchiveError::RegistryHttp(err.to_string()))?;
        let body = if (200..300).contains(&status) {
            serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }))
        } else {
            json!({ "error": text })
        };
        Ok(ApiResponse { status, body })
    }
}

impl RegistryClient for RegistryHttpClient {
    fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken, ArchiveError> {
        let payload = json!({
            "authRealms": self.auth_realms,
            "username": credentials.username,
            "password": credentials.password,
        });
        let response = self
            .client
            .post(&self.auth_url)
            .json(&payload)
            .send()
            .map_err(|err| ArchiveError::AuthHttp(err.to_string()))?;

        if response.status().as_u16() != 200 {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "authentication failed".to_string());
            return Err(ArchiveError::AuthStatus { status, message });
        }
        let token = response
            .text()
            .map_err(|err| ArchiveError::AuthHttp(err.to_string()))?;
        Ok(AuthToken::new(token.trim().to_string()))
    }

    fn create_sample(
        &self,
        token: &AuthToken,
        payload: &SampleCreate,
    ) -> Result<ApiResponse, ArchiveError> {
        let response = self.send_with_retries(|| {
            self.client
                .post(&self.samples_url)
                .bearer_auth(token.as_str())
                .json(payload)
        })?;
        Self::decode(response)
    }

    fn update_sample(
        &self,
        token: &AuthToken,
        accession: &str,
        payload: &SampleUpdate,
    ) -> Result<ApiResponse, ArchiveError> {
        let url = self.sample_url(accession);
        let response = self.send_with_retries(|| {
            self.client
                .put(&url)
                .bearer_auth(token.as_str())
                .json(payload)
        })?;
        Self::decode(response)
    }

    fn put_structured_data(
        &self,
        token: &AuthToken,
        accession: &str,
        payload: &StructuredDataPayload,
    ) -> Result<ApiResponse, ArchiveError> {
        let url = self.structured_data_url(accession);
        let response = self.send_with_retries(|| {
            self.client
                .put(&url)
                .bearer_auth(token.as_str())
                .json(payload)
        })?;
        Self::decode(response)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
