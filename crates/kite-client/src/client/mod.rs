//! Client connection.

use std::time::Duration;

use bytes::Bytes;

use kite_proto::{GetRequest, Operation, QueryType, Response, UpdateMode};

use crate::error::ClientResult;

/// A KiteDB client bound to one server.
///
/// Cheap to clone; the underlying HTTP client pools connections.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Creates a client for the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Creates a client with a per-request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
        })
    }

    /// The server this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates a table. Creating an existing table is not an error.
    pub async fn create_table(&self, table: &str) -> ClientResult<Response> {
        self.call(&Operation::Create {
            table: table.to_string(),
        })
        .await
    }

    /// Drops a table. A busy table answers Retry.
    pub async fn drop_table(&self, table: &str) -> ClientResult<Response> {
        self.call(&Operation::Drop {
            table: table.to_string(),
        })
        .await
    }

    /// Writes (key, value) pairs verbatim.
    pub async fn insert(
        &self,
        table: &str,
        keys: Vec<Bytes>,
        values: Vec<Bytes>,
    ) -> ClientResult<Response> {
        self.call(&Operation::Insert {
            table: table.to_string(),
            keys,
            values,
        })
        .await
    }

    /// Bumps the contribution counter of each key.
    pub async fn increment(&self, table: &str, keys: Vec<Bytes>) -> ClientResult<Response> {
        self.update(table, UpdateMode::Increment, keys, Vec::new())
            .await
    }

    /// Replaces each key's value unconditionally.
    pub async fn overwrite(
        &self,
        table: &str,
        keys: Vec<Bytes>,
        values: Vec<Bytes>,
    ) -> ClientResult<Response> {
        self.update(table, UpdateMode::Overwrite, keys, values).await
    }

    /// Appends each value to its key's stored payload, bumping the
    /// contribution counter.
    pub async fn accumulate(
        &self,
        table: &str,
        keys: Vec<Bytes>,
        values: Vec<Bytes>,
    ) -> ClientResult<Response> {
        self.update(table, UpdateMode::Accumulate, keys, values)
            .await
    }

    /// Updates keys under an explicit mode.
    pub async fn update(
        &self,
        table: &str,
        mode: UpdateMode,
        keys: Vec<Bytes>,
        values: Vec<Bytes>,
    ) -> ClientResult<Response> {
        self.call(&Operation::Update {
            table: table.to_string(),
            mode,
            keys,
            values,
        })
        .await
    }

    /// Point lookup: zero or one entry, never a token.
    pub async fn get(&self, table: &str, key: Bytes) -> ClientResult<Response> {
        self.call(&Operation::Get(GetRequest::fresh(
            table,
            QueryType::Equal,
            key,
            1,
        )))
        .await
    }

    /// Ascending scan from the first key >= `key`. `limit` is the page
    /// budget; at most `limit - 1` entries come back per page.
    pub async fn scan_from(&self, table: &str, key: Bytes, limit: u32) -> ClientResult<Response> {
        self.call(&Operation::Get(GetRequest::fresh(
            table,
            QueryType::GreaterEqual,
            key,
            limit,
        )))
        .await
    }

    /// Descending scan from the last key <= `key`.
    pub async fn scan_back_from(
        &self,
        table: &str,
        key: Bytes,
        limit: u32,
    ) -> ClientResult<Response> {
        self.call(&Operation::Get(GetRequest::fresh(
            table,
            QueryType::LessEqual,
            key,
            limit,
        )))
        .await
    }

    /// Ascending scan of `[key, key2]`, optionally keeping only entries
    /// whose contribution counter is at least `count_threshold`.
    pub async fn between(
        &self,
        table: &str,
        key: Bytes,
        key2: Bytes,
        limit: u32,
        count_threshold: Option<u32>,
    ) -> ClientResult<Response> {
        self.call(&Operation::Get(GetRequest::between(
            table,
            key,
            key2,
            limit,
            count_threshold,
        )))
        .await
    }

    /// Fetches the next page of a paused scan.
    pub async fn next_page(&self, token: &str, limit: u32) -> ClientResult<Response> {
        self.call(&Operation::Get(GetRequest::continuation(
            token,
            QueryType::GreaterEqual,
            limit,
        )))
        .await
    }

    /// Releases a paused scan without fetching more data.
    pub async fn done(&self, token: &str) -> ClientResult<Response> {
        self.call(&Operation::Get(GetRequest::done(token))).await
    }

    /// Scans a whole table from `key`, following tokens until exhaustion.
    pub async fn scan_all(
        &self,
        table: &str,
        key: Bytes,
        page_limit: u32,
    ) -> ClientResult<(Vec<Bytes>, Vec<Bytes>)> {
        let mut keys = Vec::new();
        let mut values = Vec::new();

        let mut page = self.scan_from(table, key, page_limit).await?;
        loop {
            keys.extend(page.keys.clone());
            values.extend(page.values.clone());
            if !page.has_more() {
                return Ok((keys, values));
            }
            page = self.next_page(&page.token, page_limit).await?;
        }
    }

    /// Fetches the server's statistics snapshot.
    pub async fn stats(&self) -> ClientResult<serde_json::Value> {
        let url = format!("{}/stats", self.base_url.trim_end_matches('/'));
        let value = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(value)
    }

    async fn call(&self, op: &Operation) -> ClientResult<Response> {
        let body = op.encode()?;
        let bytes = self
            .http
            .post(&self.base_url)
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(Response::decode(&bytes)?)
    }
}
