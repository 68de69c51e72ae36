// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! A thin wrapper around `tokio::runtime` so the rest of the workspace
//! depends on `common_util::runtime` rather than on `tokio` directly,
//! matching the indirection the original server crate relied on.

use snafu::{Backtrace, ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to build tokio runtime, err:{}.\nBacktrace:\n{}", source, backtrace))]
    Build {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to join task, err:{}", source))]
    Join { source: tokio::task::JoinError },
}

crate::define_result!(Error);

pub use tokio::runtime::Runtime;

#[derive(Default)]
pub struct Builder {
    inner: tokio::runtime::Builder,
}

impl Builder {
    pub fn default() -> Self {
        Self {
            inner: tokio::runtime::Builder::new_multi_thread(),
        }
    }

    pub fn worker_threads(mut self, val: usize) -> Self {
        self.inner.worker_threads(val);
        self
    }

    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        self.inner.thread_name(val.into());
        self
    }

    pub fn enable_all(mut self) -> Self {
        self.inner.enable_all();
        self
    }

    pub fn build(mut self) -> Result<Runtime> {
        self.inner.build().context(Build)
    }
}
