#![forbid(unsafe_code)]

mod daemon;

pub use daemon::main as daemon_main;
pub use daemon::{config, observer, Config, EndpointTask};
