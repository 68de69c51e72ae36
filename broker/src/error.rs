// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

use snafu::{Backtrace, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Plan '{}' not found.\nBacktrace:\n{}", plan, backtrace))]
    PlanNotFound { plan: String, backtrace: Backtrace },

    #[snafu(display("Instance '{}' not found.\nBacktrace:\n{}", instance_id, backtrace))]
    InstanceNotFound {
        instance_id: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Binding '{}' not found.\nBacktrace:\n{}", binding_id, backtrace))]
    BindingNotFound {
        binding_id: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Store error, err:{}", source))]
    Store { source: store::Error },
}

common_util::define_result!(Error);
