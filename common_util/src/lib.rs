// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Small pieces of plumbing shared by every crate in the workspace: the
//! `define_result!` error-type shorthand, a `BoxError` convenience trait,
//! a thin wrapper around the tokio runtime builder, a panic hook and a toml
//! loader.

pub mod error;
pub mod panic;
pub mod runtime;
pub mod toml;

/// Defines a crate-local `Result<T>` alias bound to the given error type,
/// following the snafu convention used throughout this workspace: every
/// crate boundary owns one `Error` enum and a `Result<T> = Result<T, Error>`
/// built from it.
#[macro_export]
macro_rules! define_result {
    ($t:ty) => {
        pub type Result<T> = std::result::Result<T, $t>;
    };
}
