// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, path::PathBuf, process::ExitCode};

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use remote_write::{
    config::Config,
    constants::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH},
    pipeline,
};

const CONFIG_ERROR_EXIT_CODE: u8 = 1;

#[tokio::main(flavor = "current_thread")]
pub async fn main() -> ExitCode {
    let config_path = env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = Config::load(&config_path);
    let log_level = match &config {
        Ok(config) => config.log_level.as_str(),
        Err(_) => "info",
    };
    init_logging(log_level);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading {}: {}", config_path.display(), e);
            return ExitCode::from(CONFIG_ERROR_EXIT_CODE);
        }
    };
    debug!("Loaded configuration from {}", config_path.display());

    let report = pipeline::run(&config).await;
    info!(
        "Run finished: {} imported, {} parse failures, {} rejected, {} series, outcome {:?}",
        report.imported, report.parse_failures, report.rejected, report.series, report.outcome
    );
    ExitCode::from(report.exit_code())
}

fn init_logging(log_level: &str) {
    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");
}
