// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

use std::error::Error as StdError;

/// Convenience conversion from any `std::error::Error` into the boxed
/// trait object most `snafu` `Internal`-style variants wrap.
pub trait BoxError {
    fn box_err(self) -> Box<dyn StdError + Send + Sync + 'static>;
}

impl<E: StdError + Send + Sync + 'static> BoxError for E {
    fn box_err(self) -> Box<dyn StdError + Send + Sync + 'static> {
        Box::new(self)
    }
}
