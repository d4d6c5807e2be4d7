pub mod config;
mod datagram;
mod endpoint;
pub mod observer;
pub mod tracing;

use std::{error::Error, path::PathBuf};

use ::tracing::{debug, info};
pub use config::Config;
pub use endpoint::EndpointTask;
use spin_proto::StdMonotonicClock;
use tokio::runtime::Builder;
use tracing_subscriber::util::SubscriberInitExt;

use config::SpinDaemonOptions;

use self::tracing::LogLevel;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn main() -> Result<(), Box<dyn Error>> {
    let options = SpinDaemonOptions::try_parse_from(std::env::args())?;

    match options.action {
        config::SpinDaemonAction::Help => {
            println!("{}", config::long_help_message());
        }
        config::SpinDaemonAction::Version => {
            eprintln!("spind {VERSION}");
        }
        config::SpinDaemonAction::Run => run(options)?,
    }

    Ok(())
}

// initializes the logger so that logs during config parsing are reported. Then it overrides the
// log level based on the config if required.
async fn initialize_logging_parse_config(
    initial_log_level: Option<LogLevel>,
    config_path: Option<PathBuf>,
) -> Config {
    let mut log_level = initial_log_level.unwrap_or_default();

    let config_tracing = self::tracing::tracing_init(log_level, true);
    let config = {
        let _guard = ::tracing::subscriber::set_default(config_tracing);
        match Config::from_first_file(config_path).await {
            Ok(c) => c,
            Err(e) => {
                // print to stderr because tracing is not yet setup
                eprintln!("There was an error loading the config: {e}");
                std::process::exit(exitcode::CONFIG);
            }
        }
    };

    if let Some(config_log_level) = config.observability.log_level {
        if initial_log_level.is_none() {
            log_level = config_log_level;
        }
    }

    // set a default global subscriber from now on
    let tracing_inst = self::tracing::tracing_init(log_level, config.observability.ansi_colors);
    tracing_inst.init();

    config
}

fn run(options: SpinDaemonOptions) -> Result<(), Box<dyn Error>> {
    // a single connection, so a single thread is all we need
    let runtime = Builder::new_current_thread().enable_all().build()?;

    runtime.block_on(async {
        let config = initialize_logging_parse_config(options.log_level, options.config).await;

        // give the user a warning that we use the command line option
        if config.observability.log_level.is_some() && options.log_level.is_some() {
            info!("Log level override from command line arguments is active");
        }

        if !config.check() {
            std::process::exit(exitcode::CONFIG);
        }

        debug!("Configuration loaded, starting endpoint");
        let mut endpoint =
            EndpointTask::bind(config.endpoint, config.observability, StdMonotonicClock).await?;

        Ok(endpoint.run().await?)
    })
}

pub(crate) mod exitcode {
    /// Something was found in an unconfigured or misconfigured state.
    pub const CONFIG: i32 = 78;
}
