// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

use snafu::{Backtrace, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Sink url '{}' is invalid, err:{}.\nBacktrace:\n{}", url, source, backtrace))]
    InvalidUrl {
        url: String,
        source: url::ParseError,
        backtrace: Backtrace,
    },

    #[snafu(display("Sink url '{}' has an unsupported scheme.\nBacktrace:\n{}", url, backtrace))]
    UnsupportedScheme { url: String, backtrace: Backtrace },

    #[snafu(display("Failed to connect to sink '{}', err:{}.\nBacktrace:\n{}", addr, source, backtrace))]
    Connect {
        addr: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Timed out connecting to sink '{}'.\nBacktrace:\n{}", addr, backtrace))]
    ConnectTimeout { addr: String, backtrace: Backtrace },

    #[snafu(display("Failed to write to sink '{}', err:{}.\nBacktrace:\n{}", addr, source, backtrace))]
    Write {
        addr: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Too many concurrent reconnects to sink '{}'.\nBacktrace:\n{}", addr, backtrace))]
    ReconnectBusy { addr: String, backtrace: Backtrace },

    #[snafu(display("Invalid TLS certificate for sink '{}', err:{}.\nBacktrace:\n{}", addr, source, backtrace))]
    Tls {
        addr: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("HTTP sink request to '{}' failed, err:{}.\nBacktrace:\n{}", url, source, backtrace))]
    Http {
        url: String,
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("HTTP sink '{}' responded with status {}, body:{}.\nBacktrace:\n{}", url, status, body, backtrace))]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Multi sink '{}' of {} had {} failures: {}.\nBacktrace:\n{}", label, total, failed, detail, backtrace))]
    Multi {
        label: String,
        total: usize,
        failed: usize,
        detail: String,
        backtrace: Backtrace,
    },
}

common_util::define_result!(Error);
