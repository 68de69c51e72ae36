// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Emits `VERGEN_*` build-info env vars consumed by the startup banner in
//! `src/bin/logdrain-server.rs`.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    vergen::EmitBuilder::builder()
        .all_build()
        .all_cargo()
        .all_git()
        .all_rustc()
        .emit()?;
    Ok(())
}
