// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

use std::{fs::File, io::Read, path::Path};

use serde::de::DeserializeOwned;
use snafu::{Backtrace, ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to open config file, path:{}, err:{}.\nBacktrace:\n{}", path, source, backtrace))]
    Open {
        path: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to read config file, path:{}, err:{}.\nBacktrace:\n{}", path, source, backtrace))]
    ReadToString {
        path: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to parse config toml, err:{}.\nBacktrace:\n{}", source, backtrace))]
    Parse {
        source: ::toml::de::Error,
        backtrace: Backtrace,
    },
}

crate::define_result!(Error);

/// Reads the file at `path` into `buf` and deserializes it as toml,
/// returning the parsed `T`. `buf` is retained by the caller so the
/// returned value may borrow from it if `T` contains borrowed fields.
pub fn parse_toml_from_path<T: DeserializeOwned>(path: impl AsRef<Path>, buf: &mut String) -> Result<T> {
    let path_str = path.as_ref().display().to_string();
    let mut file = File::open(&path).context(Open { path: path_str.clone() })?;
    file.read_to_string(buf)
        .context(ReadToString { path: path_str })?;
    ::toml::from_str(buf).context(Parse)
}
