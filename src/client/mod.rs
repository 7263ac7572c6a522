//! HTTP client for agent servers, used by the CLI binaries

mod instances;

pub use instances::{Instance, InstanceRegistry};

use crate::api::{AgentRequest, AgentResponse, HealthResponse};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// Timeout for agent requests from `ask-llm`; models can be slow to answer
pub const ASK_TIMEOUT: Duration = Duration::from_secs(60);

pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure modes the CLIs report separately
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(reqwest::Error),

    #[error("HTTP {status}")]
    Http { status: StatusCode, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Connection(e)
        }
    }
}

/// Health probe result; non-200 answers still carry a status code
#[derive(Debug)]
pub enum HealthProbe {
    Report {
        status: StatusCode,
        health: HealthResponse,
    },
    Status(StatusCode),
}

/// Client for one agent server
pub struct AgentClient {
    client: Client,
    base_url: String,
}

impl AgentClient {
    /// Create a client with a request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a prompt to `/api/agent`
    pub async fn ask(&self, prompt: &str) -> Result<AgentResponse, ClientError> {
        let url = format!("{}/api/agent", self.base_url);
        let request = AgentRequest {
            prompt: Some(prompt.to_string()),
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Http { status, body });
        }

        decode(&body)
    }

    /// GET `/health`, decoding the body whenever it is a health report
    pub async fn health(&self) -> Result<HealthProbe, ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        match decode::<HealthResponse>(&body) {
            Ok(health) => Ok(HealthProbe::Report { status, health }),
            Err(_) if !status.is_success() => Ok(HealthProbe::Status(status)),
            Err(e) => Err(e),
        }
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ClientError> {
    Ok(serde_json::from_str(body)?)
}

/// The executed command, if the response carries a real one
pub fn executed(response: &AgentResponse) -> Option<&str> {
    response
        .executed_command
        .as_deref()
        .filter(|cmd| !cmd.is_empty() && *cmd != "None")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let client = AgentClient::new("http://localhost:5001/", ASK_TIMEOUT).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5001");
    }

    #[test]
    fn test_decode_error_is_json() {
        let result: Result<AgentResponse, _> = decode("<html>oops</html>");
        assert!(matches!(result, Err(ClientError::Json(_))));
    }

    #[test]
    fn test_executed_filters_none_marker() {
        let mut response = AgentResponse {
            llm_response: "hi".to_string(),
            executed_command: Some("None".to_string()),
            command_result: None,
        };
        assert_eq!(executed(&response), None);

        response.executed_command = Some("ls -la".to_string());
        assert_eq!(executed(&response), Some("ls -la"));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Port 9 (discard) is almost never listening on loopback
        let client = AgentClient::new("http://127.0.0.1:9", HEALTH_TIMEOUT).unwrap();
        let err = client.ask("hello").await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(_) | ClientError::Timeout));
    }
}
