//! HTTP document-store adapter.
//!
//! Speaks to a plain REST document endpoint: `GET/PUT/DELETE {base}/{path}`
//! for documents, `GET {base}/{path}?list=children` for collections.
//! Reachability is probed once through `ready()` with bounded retry and
//! backoff; until the probe succeeds every call reports the store as
//! unavailable and the reconciler stays on the cache tier.
//!
//! Change subscriptions are not supported over plain HTTP; `subscribe`
//! returns `None` and callers fall back to read-on-navigation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::OnceCell;
use url::Url;

use crate::remote::{ChangeCallback, DocumentStore, StoreError, UnsubscribeHandle};

/// Reachability probe attempts before giving up.
const READY_ATTEMPTS: u32 = 3;

/// Initial backoff between probe attempts; doubles per attempt.
const READY_BACKOFF_MS: u64 = 250;

/// Per-request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 10;

pub struct HttpDocStore {
    client: reqwest::Client,
    base: Url,
    ready: OnceCell<bool>,
}

impl HttpDocStore {
    /// Build an adapter for the store rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        // A trailing slash keeps Url::join from eating the last path segment.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base = Url::parse(&normalized)
            .map_err(|e| StoreError::Unavailable(format!("invalid base URL: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Unavailable(format!("client build failed: {e}")))?;
        Ok(Self {
            client,
            base,
            ready: OnceCell::new(),
        })
    }

    fn doc_url(&self, path: &str) -> Result<Url, StoreError> {
        self.base
            .join(path)
            .map_err(|e| StoreError::Request(format!("invalid path {path}: {e}")))
    }

    async fn probe(&self) -> bool {
        let mut backoff = Duration::from_millis(READY_BACKOFF_MS);
        for attempt in 1..=READY_ATTEMPTS {
            // Any HTTP response, including 404, proves the endpoint is up.
            match self.client.get(self.base.clone()).send().await {
                Ok(_) => return true,
                Err(e) => {
                    log::warn!(
                        "Remote store probe {attempt}/{READY_ATTEMPTS} failed: {e}"
                    );
                }
            }
            if attempt < READY_ATTEMPTS {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
        false
    }

    async fn ensure_ready(&self) -> Result<(), StoreError> {
        if self.ready().await {
            Ok(())
        } else {
            Err(StoreError::Unavailable("remote store unreachable".to_string()))
        }
    }
}

#[async_trait]
impl DocumentStore for HttpDocStore {
    async fn ready(&self) -> bool {
        *self.ready.get_or_init(|| self.probe()).await
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.ensure_ready().await?;
        let url = self.doc_url(path)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Request(format!(
                "GET {path} returned {}",
                response.status()
            )));
        }
        let doc = response
            .json::<Value>()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(Some(doc))
    }

    async fn set(&self, path: &str, doc: &Value) -> Result<(), StoreError> {
        self.ensure_ready().await?;
        let url = self.doc_url(path)?;
        let response = self
            .client
            .put(url)
            .json(doc)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Request(format!(
                "PUT {path} returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.ensure_ready().await?;
        let url = self.doc_url(path)?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(StoreError::Request(format!(
                "DELETE {path} returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn list_children(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.ensure_ready().await?;
        let mut url = self.doc_url(path)?;
        url.query_pairs_mut().append_pair("list", "children");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(StoreError::Request(format!(
                "LIST {path} returned {}",
                response.status()
            )));
        }

        // The endpoint returns either `{"id": doc, ...}` or `[{"id": ..,
        // "doc": ..}]`; accept both.
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        match body {
            Value::Object(map) => Ok(map.into_iter().collect()),
            Value::Array(items) => {
                let mut children = Vec::with_capacity(items.len());
                for item in items {
                    let id = item
                        .get("id")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            StoreError::Parse("list item missing id".to_string())
                        })?
                        .to_string();
                    let doc = item.get("doc").cloned().unwrap_or(Value::Null);
                    children.push((id, doc));
                }
                Ok(children)
            }
            other => Err(StoreError::Parse(format!(
                "unexpected list response: {other}"
            ))),
        }
    }

    fn subscribe(&self, _path: &str, _on_change: ChangeCallback) -> Option<UnsubscribeHandle> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_url_joins_nested_paths() {
        let store = HttpDocStore::new("https://docs.example.com/api").unwrap();
        let url = store
            .doc_url("users/U1/weekly-plans/week-2024-06-09")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://docs.example.com/api/users/U1/weekly-plans/week-2024-06-09"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(HttpDocStore::new("not a url").is_err());
    }
}
