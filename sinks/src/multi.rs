// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Fan-out sink for plans with two or more drain URLs. Grounded in
//! `examples/original_source/syslog/syslog_multi.go`'s `MultiWriter`:
//! dispatch to every underlying writer in parallel, aggregate failures
//! into one composite error, and report the input length regardless of
//! how many underlying writers actually succeeded.

use futures::future::join_all;

use crate::{
    error::{Error, Result},
    SinkWriter,
};

pub struct MultiSink {
    label: String,
    writers: Vec<Box<dyn SinkWriter>>,
}

impl MultiSink {
    pub fn new(label: String, writers: Vec<Box<dyn SinkWriter>>) -> Self {
        Self { label, writers }
    }
}

#[async_trait::async_trait]
impl SinkWriter for MultiSink {
    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let results = join_all(self.writers.iter().map(|w| w.write(buf))).await;

        let failures: Vec<String> = results
            .iter()
            .filter_map(|r| r.as_ref().err().map(|e| e.to_string()))
            .collect();

        if failures.is_empty() {
            return Ok(buf.len());
        }

        Err(Error::Multi {
            label: self.label.clone(),
            total: self.writers.len(),
            failed: failures.len(),
            detail: failures.join("; "),
            backtrace: snafu::Backtrace::generate(),
        })
    }

    async fn close(&self) {
        for w in &self.writers {
            w.close().await;
        }
    }
}
