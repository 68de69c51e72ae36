// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Top-level crate tying configuration and component wiring together for
//! the `logdrain-server` binary.

pub mod config;
pub mod setup;
