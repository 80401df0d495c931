//! Directory query service client
//!
//! Resolves principal object ids to human-readable names via Microsoft
//! Graph. Lookups are independent per principal; failures are surfaced as
//! `PrincipalLookupFailed` and the caller falls back to whatever name the
//! assignment record already carried.

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::{AuditError, Result};

pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/v1.0";

/// Display identity of a directory object
#[derive(Debug, Clone)]
pub struct DirectoryPrincipal {
    pub display_name: String,
    /// UPN for users; not populated for groups or service principals
    pub sign_in_name: Option<String>,
}

/// Directory lookups by object id, one method per principal kind
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn user(&self, object_id: &str) -> Result<DirectoryPrincipal>;
    async fn group(&self, object_id: &str) -> Result<DirectoryPrincipal>;
    async fn service_principal(&self, object_id: &str) -> Result<DirectoryPrincipal>;
}

#[derive(Deserialize)]
struct UserBody {
    #[serde(rename = "displayName")]
    display_name: String,
    #[serde(rename = "userPrincipalName")]
    user_principal_name: Option<String>,
}

#[derive(Deserialize)]
struct DisplayNameBody {
    #[serde(rename = "displayName")]
    display_name: String,
}

/// REST implementation of [`DirectoryApi`] against Microsoft Graph
pub struct GraphClient {
    http: reqwest::Client,
    token: String,
    endpoint: String,
}

impl GraphClient {
    pub fn new(token: String) -> Self {
        Self::with_endpoint(token, DEFAULT_GRAPH_ENDPOINT.to_string())
    }

    pub fn with_endpoint(token: String, endpoint: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            endpoint,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        object_id: &str,
    ) -> Result<T> {
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| AuditError::PrincipalLookupFailed {
                principal_id: object_id.to_string(),
                reason: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuditError::PrincipalLookupFailed {
                principal_id: object_id.to_string(),
                reason: format!("directory returned {}", status),
            });
        }
        response
            .json()
            .await
            .map_err(|e| AuditError::PrincipalLookupFailed {
                principal_id: object_id.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl DirectoryApi for GraphClient {
    async fn user(&self, object_id: &str) -> Result<DirectoryPrincipal> {
        let url = format!(
            "{}/users/{}?$select=displayName,userPrincipalName",
            self.endpoint, object_id
        );
        let body: UserBody = self.get_json(url, object_id).await?;
        Ok(DirectoryPrincipal {
            display_name: body.display_name,
            sign_in_name: body.user_principal_name,
        })
    }

    async fn group(&self, object_id: &str) -> Result<DirectoryPrincipal> {
        let url = format!("{}/groups/{}?$select=displayName", self.endpoint, object_id);
        let body: DisplayNameBody = self.get_json(url, object_id).await?;
        Ok(DirectoryPrincipal {
            display_name: body.display_name,
            sign_in_name: None,
        })
    }

    async fn service_principal(&self, object_id: &str) -> Result<DirectoryPrincipal> {
        let url = format!(
            "{}/servicePrincipals/{}?$select=displayName",
            self.endpoint, object_id
        );
        let body: DisplayNameBody = self.get_json(url, object_id).await?;
        Ok(DirectoryPrincipal {
            display_name: body.display_name,
            sign_in_name: None,
        })
    }
}
