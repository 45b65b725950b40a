//! Session-token validation against Supabase.
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::error::Error;

/// Identity resolved from a session token. Resolved fresh on every gated
/// request; nothing is cached or stored server-side.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// The one capability the portal needs from the identity provider.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn validate_token(&self, token: &str) -> Result<AuthUser, Error>;
}

#[derive(Clone)]
pub struct SupabaseAuth {
    http: Client,
    user_url: Url,
    anon_key: String,
}

impl fmt::Debug for SupabaseAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseAuth")
            .field("user_url", &self.user_url)
            .finish_non_exhaustive()
    }
}

impl SupabaseAuth {
    pub fn new(base_url: &str, anon_key: String) -> Result<Self> {
        let user_url = Url::parse(base_url)
            .and_then(|u| u.join("auth/v1/user"))
            .with_context(|| format!("invalid Supabase URL: {base_url}"))?;
        let http = Client::builder()
            .user_agent("zeitportal/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Ok(Self {
            http,
            user_url,
            anon_key,
        })
    }
}

#[async_trait]
impl AuthService for SupabaseAuth {
    async fn validate_token(&self, token: &str) -> Result<AuthUser, Error> {
        let res = self
            .http
            .get(self.user_url.clone())
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await?;

        if !res.status().is_success() {
            debug!(status = %res.status(), "session token rejected");
            return Err(Error::Auth("Invalid token"));
        }

        let user: AuthUser = res.json().await?;
        Ok(user)
    }
}
