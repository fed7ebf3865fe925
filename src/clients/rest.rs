//! REST client for the on-device RestSDK, nasAdmin and cloud APIs
//!
//! Thin reqwest wrapper with bearer-token auth and JSON helpers.

use anyhow::{Context, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::{UserToken, UutConfig};

/// REST client errors
#[derive(Error, Debug)]
pub enum RestError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Connection refused to {0}")]
    ConnectionRefused(String),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Invalid JSON from {url}: {reason}")]
    InvalidJson { url: String, reason: String },
}

/// REST client bound to one base URL and (optionally) one user
#[derive(Clone, Debug)]
pub struct RestClient {
    client: Client,
    base_url: Option<String>,
    default_headers: HeaderMap,
    timeout_secs: u64,
    user: Option<String>,
}

impl RestClient {
    /// Create client with custom timeout
    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: None,
            default_headers: HeaderMap::new(),
            timeout_secs,
            user: None,
        })
    }

    /// RestSDK client for the device, acting as `user` when given
    pub fn for_uut(uut: &UutConfig, user: Option<&UserToken>) -> Result<Self> {
        let client = Self::with_timeout(uut.rest.timeout_secs)?.base_url(uut.rest_base_url());
        match user {
            Some(user) => client.bearer(user),
            None => Ok(client),
        }
    }

    /// Set base URL for requests
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Authenticate every request as `user`
    pub fn bearer(mut self, user: &UserToken) -> Result<Self> {
        let value = HeaderValue::from_str(&format!("Bearer {}", user.token))
            .context("Invalid access token")?;
        self.default_headers.insert(AUTHORIZATION, value);
        self.user = Some(user.user.clone());
        Ok(self)
    }

    /// User this client acts as
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn build_url(&self, path: &str) -> String {
        match &self.base_url {
            Some(base) => {
                if path.starts_with("http://") || path.starts_with("https://") {
                    path.to_string()
                } else {
                    format!("{}{}", base.trim_end_matches('/'), path)
                }
            }
            None => path.to_string(),
        }
    }

    /// Send a request; any HTTP status is returned as a response
    pub async fn send(&self, request: RestRequest) -> Result<RestResponse> {
        let url = self.build_url(&request.url);
        debug!("Sending {} request to {}", request.method, url);

        let method =
            Method::from_bytes(request.method.as_bytes()).context("Invalid HTTP method")?;

        let mut req_builder = self.client.request(method, &url);

        for (key, value) in &self.default_headers {
            req_builder = req_builder.header(key, value);
        }

        if let Some(body) = &request.json {
            req_builder = req_builder.json(body);
        }

        let start = std::time::Instant::now();

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow::anyhow!(RestError::Timeout(self.timeout_secs))
            } else if e.is_connect() {
                anyhow::anyhow!(RestError::ConnectionRefused(url.clone()))
            } else {
                anyhow::anyhow!(RestError::RequestFailed(e.to_string()))
            }
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        debug!(
            "Response: {} {} in {}ms",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            duration_ms
        );

        Ok(RestResponse {
            method: request.method,
            url,
            status_code: status.as_u16(),
            body,
            duration_ms,
        })
    }

    pub async fn get(&self, path: &str) -> Result<RestResponse> {
        self.send(RestRequest::get(path)).await
    }

    pub async fn put(&self, path: &str) -> Result<RestResponse> {
        self.send(RestRequest::put(path)).await
    }

    pub async fn delete(&self, path: &str) -> Result<RestResponse> {
        self.send(RestRequest::delete(path)).await
    }

    /// GET and decode a 2xx JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get(path).await?.error_for_status()?.json()
    }

    /// POST a JSON body; non-2xx is an error
    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<RestResponse> {
        Ok(self
            .send(RestRequest::post(path).json(body.clone()))
            .await?
            .error_for_status()?)
    }

    /// RestSDK device information
    pub async fn device_info(&self) -> Result<serde_json::Value> {
        self.get_json("/sdk/v1/device").await
    }

    /// Ask RestSDK to install an app
    pub async fn install_app(&self, app_id: &str) -> Result<RestResponse> {
        Ok(self
            .put(&format!("/sdk/v1/apps/{app_id}"))
            .await?
            .error_for_status()?)
    }

    /// Ask RestSDK to uninstall an app; a missing app is not an error
    pub async fn uninstall_app(&self, app_id: &str) -> Result<()> {
        let response = self.delete(&format!("/sdk/v1/apps/{app_id}")).await?;
        if response.status_code == 404 {
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }

    /// Install state of an app, `None` when RestSDK does not know it
    pub async fn app_status(&self, app_id: &str) -> Result<Option<AppStatus>> {
        let response = self.get(&format!("/sdk/v1/apps/{app_id}")).await?;
        if response.status_code == 404 {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json()?))
    }

    /// nasAdmin system information; expects a client built on the nasAdmin URL
    pub async fn nas_admin_system_info(&self) -> Result<serde_json::Value> {
        self.get_json("/nas/v1/system").await
    }
}

/// RestSDK app record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    pub id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl AppStatus {
    pub fn is_installed(&self) -> bool {
        self.state.eq_ignore_ascii_case("installed") || self.state.eq_ignore_ascii_case("running")
    }
}

/// HTTP request builder
#[derive(Clone, Debug)]
pub struct RestRequest {
    pub method: String,
    pub url: String,
    pub json: Option<serde_json::Value>,
}

impl RestRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            json: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new("PUT", url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new("DELETE", url)
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }
}

/// HTTP response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RestResponse {
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub body: String,
    pub duration_ms: u64,
}

impl RestResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Turn a non-2xx response into `RestError::Status`
    pub fn error_for_status(self) -> Result<Self, RestError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RestError::Status {
                method: self.method,
                url: self.url,
                status: self.status_code,
                body: self.body,
            })
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            anyhow::anyhow!(RestError::InvalidJson {
                url: self.url.clone(),
                reason: e.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductLine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn response(status: u16, body: &str) -> RestResponse {
        RestResponse {
            method: "GET".to_string(),
            url: "http://10.0.0.5/sdk/v1/apps/plex".to_string(),
            status_code: status,
            body: body.to_string(),
            duration_ms: 5,
        }
    }

    /// Serves one canned HTTP response and hands back the raw request
    async fn one_shot_server(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let reply = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        (base, handle)
    }

    #[test]
    fn test_request_builder() {
        let req = RestRequest::post("/sdk/v1/apps").json(serde_json::json!({"id": "plex"}));

        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "/sdk/v1/apps");
        assert!(req.json.is_some());
    }

    #[test]
    fn test_build_url() {
        let uut = UutConfig::new("10.0.0.5", ProductLine::Kamino);
        let client = RestClient::for_uut(&uut, None).unwrap();
        assert_eq!(
            client.build_url("/sdk/v1/device"),
            "http://10.0.0.5:80/sdk/v1/device"
        );
        assert_eq!(
            client.build_url("https://cloud.example.com/x"),
            "https://cloud.example.com/x"
        );
    }

    #[test]
    fn test_bearer_sets_user() {
        let client = RestClient::with_timeout(5)
            .unwrap()
            .bearer(&UserToken::new("owner", "abc123"))
            .unwrap();
        assert_eq!(client.user(), Some("owner"));
        assert_eq!(
            client.default_headers.get(AUTHORIZATION).unwrap(),
            "Bearer abc123"
        );
    }

    #[test]
    fn test_error_for_status() {
        assert!(response(200, "{}").error_for_status().is_ok());

        match response(403, "forbidden").error_for_status() {
            Err(RestError::Status { status, body, .. }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn test_app_status_json() {
        let status: AppStatus = response(200, r#"{"id":"plex","state":"INSTALLED"}"#)
            .json()
            .unwrap();
        assert!(status.is_installed());
        assert!(response(200, "not json").json::<AppStatus>().is_err());
    }

    #[tokio::test]
    async fn test_install_app_sends_bearer_put() {
        let (base, server) = one_shot_server("200 OK", "{}").await;
        let client = RestClient::with_timeout(5)
            .unwrap()
            .base_url(base)
            .bearer(&UserToken::new("owner", "tok-1"))
            .unwrap();

        let response = client.install_app("plex").await.unwrap();
        assert_eq!(response.status_code, 200);

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /sdk/v1/apps/plex HTTP/1.1"));
        assert!(request.to_lowercase().contains("authorization: bearer tok-1"));
    }

    #[tokio::test]
    async fn test_app_status_not_found() {
        let (base, _server) = one_shot_server("404 Not Found", "{}").await;
        let client = RestClient::with_timeout(5).unwrap().base_url(base);

        assert_eq!(client.app_status("ghost").await.unwrap(), None);
    }
}
