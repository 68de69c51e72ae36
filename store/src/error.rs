// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

use snafu::{Backtrace, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to connect to store, err:{}.\nBacktrace:\n{}", source, backtrace))]
    Connect {
        source: sqlx::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to run migrations, err:{}.\nBacktrace:\n{}", source, backtrace))]
    Migrate {
        source: sqlx::migrate::MigrateError,
        backtrace: Backtrace,
    },

    #[snafu(display("Store query failed, err:{}.\nBacktrace:\n{}", source, backtrace))]
    Query {
        source: sqlx::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Instance '{}' not found.\nBacktrace:\n{}", instance_id, backtrace))]
    InstanceNotFound {
        instance_id: String,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "Instance '{}' has no revision {}.\nBacktrace:\n{}",
        instance_id,
        revision,
        backtrace
    ))]
    RevisionNotFound {
        instance_id: String,
        revision: i64,
        backtrace: Backtrace,
    },

    #[snafu(display("Binding '{}' not found.\nBacktrace:\n{}", binding_id, backtrace))]
    BindingNotFound {
        binding_id: String,
        backtrace: Backtrace,
    },
}

common_util::define_result!(Error);
