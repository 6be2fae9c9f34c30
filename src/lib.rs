use clap::Parser;
use std::process::ExitCode;

pub mod recording;
pub mod session;

pub fn run() -> ExitCode {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        // Set specific levels for modules
        .filter_module("app_lib::recording", log::LevelFilter::Warn)
        .filter_module("app_lib::session", log::LevelFilter::Info)
        // RUST_LOG overrides the defaults above
        .parse_default_env()
        .init();

    let args = session::Args::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(session::run(args)) {
        Ok(recording::types::IdleReason::Stopped) => ExitCode::SUCCESS,
        Ok(recording::types::IdleReason::Failed) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("Recording session failed: {}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
