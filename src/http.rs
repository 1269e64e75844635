use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Status and body of an outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) || self.status == 302
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// Plain HTTP calls to faucets and form endpoints
#[async_trait]
pub trait HttpPoster: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply>;
    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<HttpReply>;
    async fn get(&self, url: &str) -> Result<HttpReply>;
}

pub struct ReqwestPoster {
    client: Client,
}

impl ReqwestPoster {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

async fn into_reply(response: reqwest::Response) -> Result<HttpReply> {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Ok(HttpReply { status, body })
}

#[async_trait]
impl HttpPoster for ReqwestPoster {
    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply> {
        let response = self.client.post(url).json(body).send().await?;
        into_reply(response).await
    }

    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<HttpReply> {
        let response = self.client.post(url).form(fields).send().await?;
        into_reply(response).await
    }

    async fn get(&self, url: &str) -> Result<HttpReply> {
        let response = self.client.get(url).send().await?;
        into_reply(response).await
    }
}
