//! Session and subscription context resolution
//!
//! The session is an explicit value passed by reference into every
//! collection call; nothing in this crate reads ambient global state after
//! startup. Resolution order for the subscription: the explicit
//! `--subscription-id` argument, then `AZURE_SUBSCRIPTION_ID` from the
//! active environment. With neither present the run aborts with
//! `NoActiveSession` before any collection happens.

use tracing::info;

use crate::cloud::CloudApi;
use crate::errors::{AuditError, Result};

/// Resolved audit context: the subscription every scope path is built from
#[derive(Debug, Clone)]
pub struct AzureSession {
    pub subscription_id: String,
    pub subscription_name: String,
}

impl AzureSession {
    /// Resolve and validate the target subscription.
    ///
    /// A supplied id is validated against the management API; a missing or
    /// inaccessible subscription is fatal (`SubscriptionNotFound` /
    /// `AccessDenied`).
    pub async fn resolve(cloud: &dyn CloudApi, requested: Option<&str>) -> Result<Self> {
        let from_env;
        let subscription_id = match requested {
            Some(id) => id,
            None => match std::env::var("AZURE_SUBSCRIPTION_ID") {
                Ok(value) if !value.is_empty() => {
                    from_env = value;
                    &from_env
                }
                _ => return Err(AuditError::NoActiveSession),
            },
        };

        let subscription = cloud.get_subscription(subscription_id).await?;
        info!(
            subscription_id = %subscription.subscription_id,
            subscription_name = %subscription.display_name,
            "session context resolved"
        );

        Ok(Self {
            subscription_id: subscription.subscription_id,
            subscription_name: subscription.display_name,
        })
    }

    /// Scope path for subscription-level assignment listing
    pub fn subscription_scope(&self) -> String {
        format!("/subscriptions/{}", self.subscription_id)
    }

    /// Scope path for one resource group
    pub fn resource_group_scope(&self, resource_group: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, resource_group
        )
    }
}

/// Read the management API bearer token from the active environment
pub fn access_token_from_env() -> Result<String> {
    match std::env::var("AZURE_ACCESS_TOKEN") {
        Ok(token) if !token.is_empty() => Ok(token),
        _ => Err(AuditError::NoActiveSession),
    }
}

/// Read the directory (Graph) token, falling back to the management token
/// variable when a dedicated one is not set
pub fn graph_token_from_env() -> Result<String> {
    match std::env::var("AZURE_GRAPH_TOKEN") {
        Ok(token) if !token.is_empty() => Ok(token),
        _ => access_token_from_env(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_paths() {
        let session = AzureSession {
            subscription_id: "sub-1".to_string(),
            subscription_name: "Production".to_string(),
        };
        assert_eq!(session.subscription_scope(), "/subscriptions/sub-1");
        assert_eq!(
            session.resource_group_scope("rg-core"),
            "/subscriptions/sub-1/resourceGroups/rg-core"
        );
    }
}
