// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! The main entry point to start the server.

use clap::{App, Arg};
use common_util::{panic, toml};
use log::info;
use logdrain_gateway::{config::Config, setup};

fn fetch_version() -> String {
    let build_version = env!("CARGO_PKG_VERSION");
    let git_branch = option_env!("VERGEN_GIT_BRANCH").unwrap_or("NONE");
    let git_commit_id = option_env!("VERGEN_GIT_SHA").unwrap_or("NONE");
    let build_time = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("NONE");
    let rustc_version = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("NONE");

    [
        ("\nlogdrain-gateway version", build_version),
        ("Git branch", git_branch),
        ("Git commit", git_commit_id),
        ("Build time", build_time),
        ("Rustc version", rustc_version),
    ]
    .iter()
    .map(|(label, value)| format!("{label}: {value}"))
    .collect::<Vec<_>>()
    .join("\n")
}

fn main() {
    let version = fetch_version();
    let matches = App::new("logdrain-server")
        .version(version.as_str())
        .arg(
            Arg::with_name("config")
                .short('c')
                .long("config")
                .required(false)
                .takes_value(true)
                .help("Set configuration file, eg: \"/path/logdrain.toml\""),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(path) => {
            let mut toml_buf = String::new();
            toml::parse_toml_from_path(path, &mut toml_buf).expect("Failed to parse config.")
        }
        None => Config::default(),
    };

    println!("logdrain-server tries starting with config:{config:?}");

    // Setup log.
    let runtime_level = setup::setup_logger(&config);

    // Setup tracing.
    let _writer_guard = setup::setup_tracing(&config);

    panic::set_panic_hook(false);

    // Log version.
    info!("version:{}", version);

    setup::run_server(config, runtime_level);
}
