//! Client side of the HTTP queue protocol

use std::marker::PhantomData;

use serde::Serialize;

use crate::error::Error;

/// A write-only handle to a queue owned by a remote backend, reached over
/// the HTTP queue protocol. Returned by `Backend::queue_at`.
pub struct HttpQueue<T> {
    base_url: String,
    client: reqwest::Client,
    _marker: PhantomData<fn(T)>,
}

impl<T: Serialize + Send + Sync> HttpQueue<T> {
    pub fn new(base_url: String) -> Self {
        HttpQueue { base_url, client: reqwest::Client::new(), _marker: PhantomData }
    }

    pub async fn push(&self, key: &str, value: T) -> Result<(), Error> {
        let url = format!("{}/write/{key}", self.base_url.trim_end_matches('/'));
        let resp = self.client.post(&url).json(&value).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Protocol(format!(
                "push to {url} failed with status {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
