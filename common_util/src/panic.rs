// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

use std::panic;

use log::error;

/// Installs a panic hook that logs the panic via `log` instead of writing
/// raw to stderr, optionally aborting the process after logging.
pub fn set_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        error!("{}", info);
        default_hook(info);
        if abort_on_panic {
            std::process::abort();
        }
    }));
}
