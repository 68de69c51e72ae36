// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Rejection type shared by every `warp` handler in [`crate::http`], plus
//! the `handle_rejection` filter that turns it (and warp's own built-in
//! rejections) into the JSON error body the original `server/src/http.rs`
//! produced for query/admin failures.

use snafu::{Backtrace, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Missing or invalid credentials."))]
    Unauthorized,

    #[snafu(display("{}", message))]
    BadRequest { message: String },

    #[snafu(display("Broker error, err:{}", source))]
    Broker { source: broker::Error, backtrace: Backtrace },

    #[snafu(display("Cache error, err:{}", source))]
    Cache { source: cache::Error, backtrace: Backtrace },
}

common_util::define_result!(Error);

impl warp::reject::Reject for Error {}
