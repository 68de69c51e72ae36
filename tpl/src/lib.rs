// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! A small template evaluator covering the subset of Go's `text/template`
//! grammar the original tag templates actually use: dotted field access,
//! piped function calls, and `if/else/end`. Ported from `tpl/engine.go`
//! and `tpl/funcs.go`, plus a compiled-template cache (absent from the
//! original, which reparsed every tag on every message) and a `ret`
//! dotted-path accessor the original lacked.

mod cache;
mod engine;
mod funcs;
mod parse;

pub use engine::{Templater, TemplateData};

use snafu::{Backtrace, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to parse tag template {:?}, err:{}.\nBacktrace:\n{}", template, msg, backtrace))]
    Parse {
        template: String,
        msg: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to evaluate tag template {:?}, err:{}.\nBacktrace:\n{}", template, msg, backtrace))]
    Eval {
        template: String,
        msg: String,
        backtrace: Backtrace,
    },
}

common_util::define_result!(Error);
