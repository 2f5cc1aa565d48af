//! Outbound HTTP seam shared by the HTTP-based sinks.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::Client;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, MAX_ERROR_BODY_LEN, USER_AGENT,
};
use crate::error::{NotifyError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Backend name used in error and log context
    pub backend: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn post(backend: &str, url: impl Into<String>) -> Self {
        Self {
            backend: backend.to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Turn a non-2xx response into an error carrying the backend name.
    pub fn error_for_status(self, backend: &str) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let mut body = self.body;
        if body.len() > MAX_ERROR_BODY_LEN {
            let mut cut = MAX_ERROR_BODY_LEN;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(NotifyError::HttpStatus {
            backend: backend.to_string(),
            status: self.status,
            body,
        })
    }
}

/// Sends a fully built request and returns the raw response.
pub trait HttpTransport: Send + Sync {
    fn post(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// `Authorization` header value for HTTP Basic auth.
pub fn basic_auth_header(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
}

/// Blocking reqwest client with fixed timeouts.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// `verify_ssl == false` trusts every certificate.
    pub fn new(verify_ssl: bool) -> Result<Self> {
        Self::with_timeouts(
            verify_ssl,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        )
    }

    pub fn with_timeouts(
        verify_ssl: bool,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| NotifyError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn post(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let resp = builder
            .body(request.body.clone())
            .send()
            .map_err(|e| NotifyError::transport(&request.backend, e))?;

        let status = resp.status().as_u16();
        let body = resp.text().unwrap_or_default();
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header() {
        assert_eq!(
            basic_auth_header("Aladdin", "open sesame"),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }

    #[test]
    fn test_success_range_is_inclusive() {
        for status in [200u16, 201, 204, 299] {
            let resp = HttpResponse {
                status,
                body: String::new(),
            };
            assert!(resp.is_success(), "{} should be success", status);
        }
        for status in [199u16, 300, 404, 500] {
            let resp = HttpResponse {
                status,
                body: String::new(),
            };
            assert!(!resp.is_success(), "{} should be failure", status);
        }
    }

    #[test]
    fn test_error_for_status_truncates_body() {
        let resp = HttpResponse {
            status: 500,
            body: "x".repeat(MAX_ERROR_BODY_LEN * 2),
        };
        match resp.error_for_status("http") {
            Err(NotifyError::HttpStatus { status, body, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), MAX_ERROR_BODY_LEN);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = HttpRequest::post("http", "http://localhost/")
            .header("Content-Type", "application/json");
        assert_eq!(req.header_value("content-type"), Some("application/json"));
        assert_eq!(req.header_value("Referer"), None);
    }
}
