// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! `http(s)://` sink. Grounded in
//! `examples/original_source/syslog/syslog_http.go`'s `HttpWriter`:
//! POST the record as `text/plain`, optionally gzip-encoded when the
//! `in_gzip` query parameter is set, with any 4xx/5xx response body
//! folded into the returned error.

use std::io::Write;

use flate2::{write::GzEncoder, Compression};
use reqwest::Client;

use crate::error::{Error, Result};

pub struct HttpSink {
    url: String,
    in_gzip: bool,
    client: Client,
}

impl HttpSink {
    pub fn new(url: url::Url) -> Self {
        let in_gzip = url
            .query_pairs()
            .find(|(k, _)| k == "in_gzip")
            .map(|(_, v)| v.parse::<bool>().unwrap_or(true))
            .unwrap_or(false);

        let mut stripped = url.clone();
        stripped.set_query(None);

        Self {
            url: stripped.to_string(),
            in_gzip,
            client: Client::new(),
        }
    }

    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.in_gzip {
            self.post_gzip(buf).await?;
        } else {
            self.post_plain(buf).await?;
        }
        Ok(buf.len())
    }

    async fn post_plain(&self, buf: &[u8]) -> Result<()> {
        self.post(buf.to_vec(), None).await
    }

    async fn post_gzip(&self, buf: &[u8]) -> Result<()> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(buf).map_err(|_| Error::HttpStatus {
            url: self.url.clone(),
            status: 0,
            body: "failed to gzip-compress payload".to_string(),
            backtrace: snafu::Backtrace::generate(),
        })?;
        let compressed = encoder.finish().map_err(|_| Error::HttpStatus {
            url: self.url.clone(),
            status: 0,
            body: "failed to finish gzip stream".to_string(),
            backtrace: snafu::Backtrace::generate(),
        })?;
        self.post(compressed, Some("gzip")).await
    }

    async fn post(&self, body: Vec<u8>, content_encoding: Option<&str>) -> Result<()> {
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "text/plain")
            .body(body);
        if let Some(encoding) = content_encoding {
            req = req.header("Content-Encoding", encoding);
        }

        let resp = req.send().await.map_err(|source| Error::Http {
            url: self.url.clone(),
            source,
            backtrace: snafu::Backtrace::generate(),
        })?;

        let status = resp.status();
        if status.as_u16() < 200 || status.as_u16() >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
                body,
                backtrace: snafu::Backtrace::generate(),
            });
        }
        Ok(())
    }

    /// No persistent connection to tear down; kept for interface parity
    /// with the stateful sinks.
    pub async fn close(&self) {}
}
