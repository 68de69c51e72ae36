// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! The server crate: wires the broker, metadata cache, sinks and parser
//! behind a `warp`-based HTTP surface (component 4.F/4.G of
//! `SPEC_FULL.md`).

pub mod broker_api;
pub mod error;
pub mod error_util;
pub mod forwarder;
pub mod http;
pub mod limiter;
pub mod metrics;
