use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Input for a new identity-provider account.
#[derive(Debug, Clone)]
pub struct NewIdentityAccount {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub disabled: bool,
}

/// The identity provider behind authentication: verifies caller tokens and
/// owns account lifecycle. Accounts here are distinct from the profile
/// documents kept in the store.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verifies a bearer id token, returning the account uid.
    async fn verify_id_token(&self, id_token: &str) -> Result<String>;

    /// Creates an account and returns its uid.
    async fn create_account(&self, new: &NewIdentityAccount) -> Result<String>;

    async fn delete_account(&self, uid: &str) -> Result<()>;
}

/// REST client for an identitytoolkit-style admin API.
pub struct HttpIdentityProvider {
    http: HttpClient,
    api_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
struct LookupUser {
    #[serde(rename = "localId")]
    local_id: String,
}

#[derive(Deserialize)]
struct SignUpResponse {
    #[serde(rename = "localId")]
    local_id: String,
}

impl HttpIdentityProvider {
    pub fn new(http: HttpClient, api_url: String, api_key: String) -> Self {
        Self {
            http,
            api_url,
            api_key,
        }
    }

    async fn post(&self, method: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{}?key={}", self.api_url, method, self.api_key);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("identity API request failed: {}", method))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("identity API {} returned {}: {}", method, status, text);
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify_id_token(&self, id_token: &str) -> Result<String> {
        let value = self
            .post("accounts:lookup", json!({ "idToken": id_token }))
            .await?;
        let lookup: LookupResponse = serde_json::from_value(value)?;
        let user = lookup
            .users
            .into_iter()
            .next()
            .context("token did not resolve to an account")?;

        debug!(uid = %user.local_id, "Verified id token");
        Ok(user.local_id)
    }

    async fn create_account(&self, new: &NewIdentityAccount) -> Result<String> {
        let value = self
            .post(
                "accounts:signUp",
                json!({
                    "email": new.email,
                    "password": new.password,
                    "displayName": new.display_name,
                }),
            )
            .await?;
        let created: SignUpResponse = serde_json::from_value(value)?;

        // signUp cannot create a disabled account directly
        if new.disabled {
            self.post(
                "accounts:update",
                json!({ "localId": created.local_id, "disableUser": true }),
            )
            .await?;
        }

        Ok(created.local_id)
    }

    async fn delete_account(&self, uid: &str) -> Result<()> {
        self.post("accounts:delete", json!({ "localId": uid }))
            .await?;
        Ok(())
    }
}
