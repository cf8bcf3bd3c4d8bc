//! Tumblr v2 API client

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::BlogApi;
use super::dto::{Envelope, PostsResponse, RawAccountInfo, RawPost, UserInfoResponse};
use super::oauth::{self, OAuthKeys};
use crate::config::TumblrConfig;
use crate::data::Credentials;
use crate::error::AppError;
use crate::metrics::UPSTREAM_REQUESTS_TOTAL;

/// Client for the Tumblr v2 API
///
/// Public endpoints are called with the consumer key as `api_key`;
/// per-user endpoints are OAuth1 signed with the stored token pair.
#[derive(Clone)]
pub struct TumblrClient {
    http_client: Arc<reqwest::Client>,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
}

/// Full blog identifier accepted by the API
///
/// Bare names get the default hostname, custom domains are kept.
fn blog_identifier(blog_name: &str) -> String {
    if blog_name.contains('.') {
        blog_name.to_string()
    } else {
        format!("{}.tumblr.com", blog_name)
    }
}

impl TumblrClient {
    /// Create new client
    pub fn new(http_client: Arc<reqwest::Client>, config: &TumblrConfig) -> Self {
        Self {
            http_client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
        }
    }

    fn endpoint_url(&self, path: &str) -> Result<url::Url, AppError> {
        url::Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| AppError::Config(format!("invalid Tumblr API URL: {}", e)))
    }

    /// Check the HTTP status and the envelope, then decode the payload
    async fn read_response<T: DeserializeOwned>(
        endpoint: &'static str,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        UPSTREAM_REQUESTS_TOTAL
            .with_label_values(&[endpoint, status.as_str()])
            .inc();

        let body = response.text().await?;
        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| {
            AppError::Upstream(format!(
                "{} returned an unreadable body (HTTP {}): {}",
                endpoint, status, e
            ))
        })?;

        if !status.is_success() || !(200..300).contains(&envelope.meta.status) {
            return Err(AppError::Upstream(format!(
                "{} failed: HTTP {}, meta status {} {}",
                endpoint, status, envelope.meta.status, envelope.meta.msg
            )));
        }

        serde_json::from_value(envelope.response).map_err(|e| {
            AppError::Upstream(format!("{} returned a malformed payload: {}", endpoint, e))
        })
    }
}

#[async_trait]
impl BlogApi for TumblrClient {
    async fn fetch_posts_page(
        &self,
        blog_name: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RawPost>, AppError> {
        let url = self.endpoint_url(&format!(
            "/blog/{}/posts",
            urlencoding::encode(&blog_identifier(blog_name))
        ))?;

        let limit = limit.to_string();
        let offset = offset.to_string();
        let response = self
            .http_client
            .get(url)
            .query(&[
                ("api_key", self.consumer_key.as_str()),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
                ("reblog_info", "true"),
            ])
            .send()
            .await?;

        let payload: PostsResponse = Self::read_response("posts", response).await?;
        tracing::debug!(
            blog = %blog_name,
            offset = %offset,
            count = payload.posts.len(),
            "Fetched posts page"
        );
        Ok(payload.posts)
    }

    async fn fetch_account_info(
        &self,
        credentials: &Credentials,
    ) -> Result<RawAccountInfo, AppError> {
        let url = self.endpoint_url("/user/info")?;
        let authorization = oauth::authorization_header(
            "GET",
            &url,
            &[],
            OAuthKeys {
                consumer_key: &self.consumer_key,
                consumer_secret: &self.consumer_secret,
                token: &credentials.token,
                token_secret: &credentials.secret,
            },
            &ulid::Ulid::new().to_string(),
            chrono::Utc::now().timestamp(),
        )?;

        let response = self
            .http_client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await?;

        let payload: UserInfoResponse = Self::read_response("user_info", response).await?;
        Ok(payload.user)
    }
}
