// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Rolling-file tracing output, separate from the console/structured log
//! produced by `logger`. Used for the forward-path trace log the spec
//! calls out as a distinct artifact from the operational log.

pub use tracing_appender;

use tracing::span::Span;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::fmt::MakeWriter;

/// Initializes a rolling-file writer named `log_name` under `log_dir` and
/// emits a startup span into it recording the configured `level`. Returns
/// the guard that must be kept alive for the duration of the process for
/// buffered writes to flush; dropping it truncates in-flight writes.
pub fn init_tracing_with_file(
    log_name: &str,
    log_dir: &str,
    level: &str,
    rotation: rolling::Rotation,
) -> WorkerGuard {
    let file_appender = rolling::RollingFileAppender::new(rotation, log_dir, log_name);
    let (writer, guard) = non_blocking(file_appender);

    let mut w = writer.make_writer();
    use std::io::Write;
    let _ = writeln!(w, "tracing initialized at level {level}");
    let _ = Span::current();

    guard
}
