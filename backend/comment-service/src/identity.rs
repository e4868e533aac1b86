//! Batched author-identity resolution
//!
//! The identity service owns user profiles; this service only needs a
//! display name and avatar per author id. Resolution is one batched call
//! per request, keyed by the distinct author ids in the result set, and is
//! injected into the pipelines as a trait object so request handling never
//! constructs a client inline.

use std::collections::HashMap;

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::AuthorIdentity;

#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve a set of author ids to public identities.
    ///
    /// Ids with no profile are simply absent from the returned map; callers
    /// synthesize fallbacks. An empty input must not hit the network.
    async fn resolve(&self, author_ids: &[Uuid]) -> Result<HashMap<Uuid, AuthorIdentity>>;
}

/// HTTP client for the identity service's batch profile endpoint.
pub struct HttpIdentityResolver {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchProfilesRequest<'a> {
    user_ids: &'a [Uuid],
}

#[derive(Deserialize)]
struct BatchProfilesResponse {
    profiles: Vec<ProfileRecord>,
}

/// The endpoint also returns banner, border style, and role; only the
/// fields consumed here are deserialized.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRecord {
    id: Uuid,
    username: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
}

impl HttpIdentityResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(&self, author_ids: &[Uuid]) -> Result<HashMap<Uuid, AuthorIdentity>> {
        if author_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/api/v1/profiles/batch", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&BatchProfilesRequest {
                user_ids: author_ids,
            })
            .send()
            .await?
            .error_for_status()?;

        let body: BatchProfilesResponse = response.json().await?;

        Ok(body
            .profiles
            .into_iter()
            .map(|profile| (profile.id, identity_from_profile(profile)))
            .collect())
    }
}

fn identity_from_profile(profile: ProfileRecord) -> AuthorIdentity {
    let display_name = profile
        .display_name
        .filter(|name| !name.trim().is_empty())
        .or_else(|| Some(profile.username.clone()).filter(|name| !name.trim().is_empty()))
        .unwrap_or_else(|| AuthorIdentity::fallback(profile.id).display_name);

    AuthorIdentity {
        id: profile.id,
        display_name,
        avatar_url: profile.avatar_url,
    }
}
