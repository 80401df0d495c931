//! Azure Resource Manager client
//!
//! Thin REST wrapper over the management API surface the audit needs:
//! subscription lookup, resource group enumeration, role assignment listing
//! and role definition resolution. The `CloudApi` trait is the seam tests
//! substitute an in-memory fake for.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{AuditError, Result};

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

const SUBSCRIPTION_API_VERSION: &str = "2022-12-01";
const RESOURCE_GROUP_API_VERSION: &str = "2021-04-01";
const AUTHORIZATION_API_VERSION: &str = "2022-04-01";

/// A resolved subscription
#[derive(Debug, Clone)]
pub struct Subscription {
    pub subscription_id: String,
    pub display_name: String,
}

/// A role assignment as returned by the management API, before role-name
/// resolution and allow-list filtering.
#[derive(Debug, Clone)]
pub struct RawRoleAssignment {
    /// Fully-qualified assignment id
    pub id: String,
    /// Fully-qualified role definition id
    pub role_definition_id: String,
    pub principal_id: String,
    /// Raw principalType string; may be absent for deleted principals
    pub principal_type: Option<String>,
    /// Display name carried on the assignment record, when present.
    /// Used as the fallback when directory lookup fails.
    pub principal_display_name: Option<String>,
    /// The exact scope the assignment was created at (assignments listed at
    /// a resource group include inherited subscription-level entries)
    pub scope: String,
}

/// Management API operations consumed by the collector
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn get_subscription(&self, subscription_id: &str) -> Result<Subscription>;

    async fn list_resource_groups(&self, subscription_id: &str) -> Result<Vec<String>>;

    /// List role assignments at and above the given scope path
    async fn list_role_assignments(&self, scope: &str) -> Result<Vec<RawRoleAssignment>>;

    /// Resolve a fully-qualified role definition id to its role name
    async fn get_role_definition_name(&self, role_definition_id: &str) -> Result<String>;
}

// Wire types for the ARM payloads we decode

#[derive(Deserialize)]
struct ListResponse<T> {
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct SubscriptionBody {
    #[serde(rename = "subscriptionId")]
    subscription_id: String,
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Deserialize)]
struct ResourceGroupBody {
    name: String,
}

#[derive(Deserialize)]
struct RoleAssignmentBody {
    id: String,
    properties: RoleAssignmentProperties,
}

#[derive(Deserialize)]
struct RoleAssignmentProperties {
    #[serde(rename = "roleDefinitionId")]
    role_definition_id: String,
    #[serde(rename = "principalId")]
    principal_id: String,
    #[serde(rename = "principalType")]
    principal_type: Option<String>,
    #[serde(rename = "principalName")]
    principal_name: Option<String>,
    scope: String,
}

#[derive(Deserialize)]
struct RoleDefinitionBody {
    properties: RoleDefinitionProperties,
}

#[derive(Deserialize)]
struct RoleDefinitionProperties {
    #[serde(rename = "roleName")]
    role_name: String,
}

/// REST implementation of [`CloudApi`] against the Azure management endpoint
pub struct ArmClient {
    http: reqwest::Client,
    token: String,
    endpoint: String,
}

impl ArmClient {
    pub fn new(token: String) -> Self {
        Self::with_endpoint(token, DEFAULT_MANAGEMENT_ENDPOINT.to_string())
    }

    /// Construct against a non-default endpoint (sovereign clouds, tests)
    pub fn with_endpoint(token: String, endpoint: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            endpoint,
        }
    }

    /// Follow nextLink pagination until the listing is exhausted
    async fn get_paged<T: serde::de::DeserializeOwned>(&self, first_url: String) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut url = Some(first_url);
        while let Some(current) = url {
            debug!(url = %current, "management API GET");
            let response = self
                .http
                .get(&current)
                .bearer_auth(&self.token)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(AuditError::ApiError(format!(
                    "GET {} returned {}",
                    current, status
                )));
            }
            let page: ListResponse<T> = response.json().await?;
            items.extend(page.value);
            url = page.next_link;
        }
        Ok(items)
    }
}

#[async_trait]
impl CloudApi for ArmClient {
    async fn get_subscription(&self, subscription_id: &str) -> Result<Subscription> {
        let url = format!(
            "{}/subscriptions/{}?api-version={}",
            self.endpoint, subscription_id, SUBSCRIPTION_API_VERSION
        );
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        match response.status() {
            s if s.is_success() => {
                let body: SubscriptionBody = response.json().await?;
                Ok(Subscription {
                    subscription_id: body.subscription_id,
                    display_name: body.display_name,
                })
            }
            reqwest::StatusCode::NOT_FOUND => {
                Err(AuditError::SubscriptionNotFound(subscription_id.to_string()))
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(AuditError::AccessDenied(format!(
                    "subscription {} rejected the session token",
                    subscription_id
                )))
            }
            other => Err(AuditError::ApiError(format!(
                "GET {} returned {}",
                url, other
            ))),
        }
    }

    async fn list_resource_groups(&self, subscription_id: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/subscriptions/{}/resourcegroups?api-version={}",
            self.endpoint, subscription_id, RESOURCE_GROUP_API_VERSION
        );
        let groups: Vec<ResourceGroupBody> = self.get_paged(url).await?;
        Ok(groups.into_iter().map(|g| g.name).collect())
    }

    async fn list_role_assignments(&self, scope: &str) -> Result<Vec<RawRoleAssignment>> {
        let url = format!(
            "{}{}/providers/Microsoft.Authorization/roleAssignments?api-version={}",
            self.endpoint, scope, AUTHORIZATION_API_VERSION
        );
        let bodies: Vec<RoleAssignmentBody> = self.get_paged(url).await?;
        Ok(bodies
            .into_iter()
            .map(|b| RawRoleAssignment {
                id: b.id,
                role_definition_id: b.properties.role_definition_id,
                principal_id: b.properties.principal_id,
                principal_type: b.properties.principal_type,
                principal_display_name: b.properties.principal_name,
                scope: b.properties.scope,
            })
            .collect())
    }

    async fn get_role_definition_name(&self, role_definition_id: &str) -> Result<String> {
        let url = format!(
            "{}{}?api-version={}",
            self.endpoint, role_definition_id, AUTHORIZATION_API_VERSION
        );
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuditError::ApiError(format!(
                "GET {} returned {}",
                url, status
            )));
        }
        let body: RoleDefinitionBody = response.json().await?;
        Ok(body.properties.role_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_assignment_payload_decoding() {
        let payload = r#"{
            "value": [{
                "id": "/subscriptions/sub1/providers/Microsoft.Authorization/roleAssignments/ra1",
                "properties": {
                    "roleDefinitionId": "/subscriptions/sub1/providers/Microsoft.Authorization/roleDefinitions/def1",
                    "principalId": "p1",
                    "principalType": "User",
                    "scope": "/subscriptions/sub1"
                }
            }],
            "nextLink": null
        }"#;
        let page: ListResponse<RoleAssignmentBody> = serde_json::from_str(payload).unwrap();
        assert_eq!(page.value.len(), 1);
        assert!(page.next_link.is_none());
        let props = &page.value[0].properties;
        assert_eq!(props.principal_id, "p1");
        assert_eq!(props.principal_type.as_deref(), Some("User"));
        assert!(props.principal_name.is_none());
    }

    #[test]
    fn test_missing_principal_type_tolerated() {
        // Deleted principals come back without a principalType
        let payload = r#"{
            "id": "/x/roleAssignments/ra2",
            "properties": {
                "roleDefinitionId": "/x/roleDefinitions/def1",
                "principalId": "p2",
                "scope": "/subscriptions/sub1/resourceGroups/rg1"
            }
        }"#;
        let body: RoleAssignmentBody = serde_json::from_str(payload).unwrap();
        assert!(body.properties.principal_type.is_none());
    }

    #[test]
    fn test_subscription_payload_decoding() {
        let payload = r#"{"subscriptionId": "sub1", "displayName": "Production", "state": "Enabled"}"#;
        let body: SubscriptionBody = serde_json::from_str(payload).unwrap();
        assert_eq!(body.subscription_id, "sub1");
        assert_eq!(body.display_name, "Production");
    }
}
