//! Principal name resolution with memoization
//!
//! Dispatches each lookup to the directory method matching the principal
//! type, caching successful resolutions by principal id so a principal
//! holding many assignments is looked up once. Failed lookups are never
//! cached: the resolver falls back to the display name already on the
//! assignment record for that one call, and a later successful lookup for
//! the same id still gets cached. This keeps fallback behavior under flaky
//! lookups identical to an uncached resolver.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::directory::DirectoryApi;
use crate::errors::Result;
use crate::types::PrincipalType;

/// A resolved principal name, plus the UPN when the directory provides one
#[derive(Debug, Clone)]
pub struct ResolvedPrincipal {
    pub display_name: String,
    pub sign_in_name: Option<String>,
}

/// Memoizing resolver over a [`DirectoryApi`]
pub struct PrincipalResolver<'a> {
    directory: &'a dyn DirectoryApi,
    cache: DashMap<String, ResolvedPrincipal>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<'a> PrincipalResolver<'a> {
    pub fn new(directory: &'a dyn DirectoryApi) -> Self {
        Self {
            directory,
            cache: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Resolve a principal to its display identity.
    ///
    /// `fallback` is the display name already present on the assignment
    /// record; it is returned verbatim on lookup failure or for principal
    /// types the directory cannot resolve.
    pub async fn resolve(
        &self,
        principal_id: &str,
        principal_type: PrincipalType,
        fallback: &str,
    ) -> ResolvedPrincipal {
        if let Some(cached) = self.cache.get(principal_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached.clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let lookup: Result<_> = match principal_type {
            PrincipalType::User => self.directory.user(principal_id).await,
            PrincipalType::Group => self.directory.group(principal_id).await,
            PrincipalType::ServicePrincipal => {
                self.directory.service_principal(principal_id).await
            }
            PrincipalType::Other => {
                debug!(principal_id, "unresolvable principal type, using record name");
                return ResolvedPrincipal {
                    display_name: fallback.to_string(),
                    sign_in_name: None,
                };
            }
        };

        match lookup {
            Ok(principal) => {
                let resolved = ResolvedPrincipal {
                    display_name: principal.display_name,
                    sign_in_name: principal.sign_in_name,
                };
                self.cache
                    .insert(principal_id.to_string(), resolved.clone());
                resolved
            }
            Err(e) => {
                // Principal may be deleted, or the token may lack directory
                // read permission. Degrade to the name on the record.
                warn!(principal_id, error = %e, "principal lookup failed, using record name");
                ResolvedPrincipal {
                    display_name: fallback.to_string(),
                    sign_in_name: None,
                }
            }
        }
    }

    pub fn cache_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
