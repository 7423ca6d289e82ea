use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::base::{Provider, Usage};
use super::configs::{BedrockAuth, BedrockProviderConfig};
use super::sigv4::{self, SignableRequest};
use super::utils::{
    anthropic_response_to_message, get_usage, messages_to_anthropic_spec, tools_to_anthropic_spec,
};
use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const SIGNING_SERVICE: &str = "bedrock";

/// Anthropic models hosted on AWS Bedrock, through the InvokeModel API
pub struct BedrockProvider {
    client: Client,
    config: BedrockProviderConfig,
}

impl BedrockProvider {
    pub fn new(config: BedrockProviderConfig) -> AgentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn invoke_url(&self) -> String {
        format!(
            "{}/model/{}/invoke",
            self.config.endpoint(),
            urlencoding::encode(&self.config.model)
        )
    }

    async fn post(&self, payload: Value) -> AgentResult<Value> {
        let url = self.invoke_url();
        let body = serde_json::to_vec(&payload)
            .map_err(|e| AgentError::Gateway(format!("cannot encode request: {}", e)))?;

        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");

        match &self.config.auth {
            BedrockAuth::ApiKey(key) => request = request.bearer_auth(key),
            BedrockAuth::Sigv4(credentials) => {
                let parsed = Url::parse(&url)
                    .map_err(|e| AgentError::Gateway(format!("invalid endpoint {}: {}", url, e)))?;
                let host = match (parsed.host_str(), parsed.port()) {
                    (Some(host), Some(port)) => format!("{}:{}", host, port),
                    (Some(host), None) => host.to_string(),
                    (None, _) => {
                        return Err(AgentError::Gateway(format!("endpoint has no host: {}", url)))
                    }
                };
                let signable = SignableRequest {
                    method: "POST",
                    path: parsed.path(),
                    query: parsed.query().unwrap_or(""),
                    headers: vec![
                        ("content-type".to_string(), "application/json".to_string()),
                        ("host".to_string(), host),
                    ],
                    payload: &body,
                };
                let signed = sigv4::sign(
                    signable,
                    credentials,
                    &self.config.region,
                    SIGNING_SERVICE,
                    Utc::now(),
                );
                for (name, value) in signed {
                    request = request.header(name, value);
                }
            }
            BedrockAuth::Missing => {
                return Err(AgentError::Gateway(
                    "no AWS credentials found: set AWS_BEARER_TOKEN_BEDROCK, or \
                     AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY"
                        .to_string(),
                ))
            }
        }

        debug!(%url, "invoking model");
        let response = request.body(body).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(AgentError::Gateway(format!(
                    "Request failed: {} - {}",
                    status, error_text
                )))
            }
        }
    }
}

#[async_trait]
impl Provider for BedrockProvider {
    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> AgentResult<(Message, Usage)> {
        let mut payload = json!({
            "anthropic_version": BEDROCK_ANTHROPIC_VERSION,
            "max_tokens": self.config.max_tokens,
            "messages": messages_to_anthropic_spec(messages),
        });

        let tools_spec = tools_to_anthropic_spec(tools)?;
        if !tools_spec.is_empty() {
            payload["tools"] = Value::Array(tools_spec);
        }

        let response = self.post(payload).await?;

        let message = anthropic_response_to_message(&response)?;
        let usage = get_usage(&response);

        Ok((message, usage))
    }
}
