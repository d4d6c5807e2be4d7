use std::{
    fmt::Display,
    io::ErrorKind,
    net::SocketAddr,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;
use spin_proto::Role;
use tokio::{fs::read_to_string, io};
use tracing::{info, warn};

use super::tracing::LogLevel;

const USAGE_MSG: &str = "\
usage: spind [-c PATH] [-l LOG_LEVEL]
       spind -h
       spind -v";

const DESCRIPTOR: &str = "spind - exchange latency spin probes with a peer";

const HELP_MSG: &str = "Options:
  -c, --config=PATH             change the config .toml file
  -l, --log-level=LOG_LEVEL     change the log level
  -h, --help                    display this help text
  -v, --version                 display version information";

pub fn long_help_message() -> String {
    format!("{DESCRIPTOR}\n\n{USAGE_MSG}\n\n{HELP_MSG}")
}

#[derive(Debug, Default)]
pub(crate) struct SpinDaemonOptions {
    /// Path of the configuration file
    pub config: Option<PathBuf>,
    /// Level for messages to display in logs
    pub log_level: Option<LogLevel>,
    help: bool,
    version: bool,
    pub action: SpinDaemonAction,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum SpinDaemonAction {
    #[default]
    Help,
    Version,
    Run,
}

/// Splits `--name=value` and `-nvalue` into the option and its inline value
fn split_inline_value(arg: &str) -> (&str, Option<&str>) {
    if arg.starts_with("--") {
        match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg, None),
        }
    } else {
        match (arg.get(..2), arg.get(2..)) {
            (Some(name), Some(value)) if arg.starts_with('-') && !value.is_empty() => {
                (name, Some(value))
            }
            _ => (arg, None),
        }
    }
}

impl SpinDaemonOptions {
    /// parse an iterator over command line arguments, the first being the program name
    pub fn try_parse_from<I, T>(iter: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut options = SpinDaemonOptions::default();
        let mut args = iter.into_iter().skip(1);

        while let Some(arg) = args.next() {
            let arg = arg.as_ref();
            if arg == "--" {
                break;
            }

            let (name, inline) = split_inline_value(arg);
            let mut value = || match inline {
                Some(value) => Ok(value.to_owned()),
                None => args
                    .next()
                    .map(|next| next.as_ref().to_owned())
                    .ok_or_else(|| format!("'{name}' expects an argument")),
            };

            match name {
                "-h" | "--help" if inline.is_none() => options.help = true,
                "-v" | "--version" if inline.is_none() => options.version = true,
                "-c" | "--config" => options.config = Some(PathBuf::from(value()?)),
                "-l" | "--log-level" => {
                    let level = LogLevel::from_str(&value()?).map_err(|e| e.to_string())?;
                    options.log_level = Some(level);
                }
                _ => return Err(format!("invalid option: '{arg}'")),
            }
        }

        options.resolve_action();

        Ok(options)
    }

    /// from the arguments resolve which action should be performed
    fn resolve_action(&mut self) {
        if self.help {
            self.action = SpinDaemonAction::Help;
        } else if self.version {
            self.action = SpinDaemonAction::Version;
        } else {
            self.action = SpinDaemonAction::Run;
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EndpointConfig {
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Required for clients. A server without a peer answers whoever talks to it first.
    #[serde(default)]
    pub peer: Option<SocketAddr>,
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
}

impl EndpointConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            listen: default_listen(),
            peer: None,
            send_interval_ms: default_send_interval_ms(),
            payload_size: default_payload_size(),
        }
    }
}

const fn default_role() -> Role {
    Role::Server
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4784))
}

const fn default_send_interval_ms() -> u64 {
    100
}

const fn default_payload_size() -> usize {
    32
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    #[serde(default = "default_ansi_colors")]
    pub ansi_colors: bool,
    #[serde(default)]
    pub observation_path: Option<PathBuf>,
    #[serde(default = "default_observation_interval_ms")]
    pub observation_interval_ms: u64,
}

impl ObservabilityConfig {
    pub fn observation_interval(&self) -> Duration {
        Duration::from_millis(self.observation_interval_ms)
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: Default::default(),
            ansi_colors: default_ansi_colors(),
            observation_path: Default::default(),
            observation_interval_ms: default_observation_interval_ms(),
        }
    }
}

const fn default_ansi_colors() -> bool {
    true
}

const fn default_observation_interval_ms() -> u64 {
    1000
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    async fn from_file(file: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let meta = std::fs::metadata(&file)?;
        let perm = meta.permissions();

        if perm.mode() as libc::mode_t & libc::S_IWOTH != 0 {
            warn!("Unrestricted config file permissions: Others can write.");
        }

        let contents = read_to_string(file).await?;
        Ok(toml::de::from_str(&contents)?)
    }

    pub async fn from_first_file(file: Option<impl AsRef<Path>>) -> Result<Config, ConfigError> {
        // if an explicit file is given, always use that one
        if let Some(f) = file {
            let path: &Path = f.as_ref();
            info!(?path, "using config file");
            return Config::from_file(f).await;
        }

        // for the global file we also ignore it when there are permission errors
        let global_path = Path::new("/etc/spind/spind.toml");
        if global_path.exists() {
            info!("using config file at default location `{:?}`", global_path);
            match Config::from_file(global_path).await {
                Err(ConfigError::Io(e)) if e.kind() == ErrorKind::PermissionDenied => {
                    info!("permission denied on global config file! using default config ...");
                }
                other => {
                    return other;
                }
            }
        }

        Ok(Config::default())
    }

    /// Check that the config is usable.
    pub fn check(&self) -> bool {
        let mut ok = true;

        if self.endpoint.role == Role::Client && self.endpoint.peer.is_none() {
            warn!("A client endpoint needs a peer to send probes to.");
            ok = false;
        }

        if self.endpoint.send_interval_ms == 0 {
            warn!("The send interval must be at least one millisecond.");
            ok = false;
        }

        if self.observability.observation_path.is_some()
            && self.observability.observation_interval_ms == 0
        {
            warn!("The observation interval must be at least one millisecond.");
            ok = false;
        }

        if self.endpoint.send_interval() <= spin_proto::EDGE_VALIDITY_THRESHOLD
            && self.endpoint.role == Role::Client
        {
            info!("Send interval is within the edge validity threshold, client edges may be marked valid.");
        }

        ok
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Toml(toml::de::Error),
}

impl std::error::Error for ConfigError {}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error while reading config: {e}"),
            Self::Toml(e) => write!(f, "config toml parsing error: {e}"),
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Toml(value)
    }
}
