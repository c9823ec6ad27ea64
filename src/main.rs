//! Entry point for the Payroll Engine binary.
//!
//! Running this binary will start an HTTP server that exposes the
//! payroll calculations.  Everything is configured through `PAYROLL_*`
//! environment variables (see [`payroll_engine::config`]); a directory
//! of country JSON overrides may be given via `PAYROLL_COUNTRY_DIR`.
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

use log::error;
use payroll_engine::config::Settings;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            error!("invalid settings: {:#}", err);
            std::process::exit(2);
        }
    };
    if let Err(err) = payroll_engine::api::serve(settings).await {
        error!("error running server: {:#}", err);
        std::process::exit(1);
    }
}
