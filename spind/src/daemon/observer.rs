use std::{net::SocketAddr, path::Path};

use serde::{Deserialize, Serialize};
use spin_proto::{MeasurementSnapshot, Role};

#[derive(Debug, Serialize, Deserialize)]
pub struct ObservableState {
    pub program: ProgramData,
    pub role: Role,
    pub local: Option<SocketAddr>,
    pub peer: Option<SocketAddr>,
    pub measurement: MeasurementSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgramData {
    pub version: String,
    pub uptime_seconds: f64,
}

impl ProgramData {
    pub fn with_uptime(uptime_seconds: f64) -> ProgramData {
        ProgramData {
            uptime_seconds,
            ..Default::default()
        }
    }
}

impl Default for ProgramData {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            uptime_seconds: 0.0,
        }
    }
}

/// Replace the observation file with the current state.
///
/// Written to a sibling file first so readers never see a partial document.
pub async fn write_observation(path: &Path, state: &ObservableState) -> std::io::Result<()> {
    let data = serde_json::to_vec(state)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use spin_proto::{Connection, ManualClock};

    use super::*;

    #[tokio::test]
    async fn test_write_observation() {
        let path =
            std::env::temp_dir().join(format!("spind-observe-{}.json", std::process::id()));

        let connection = Connection::new(Role::Server, ManualClock::default());
        let state = ObservableState {
            program: ProgramData::with_uptime(1.5),
            role: Role::Server,
            local: Some("127.0.0.1:4784".parse().unwrap()),
            peer: None,
            measurement: connection.snapshot(),
        };

        write_observation(&path, &state).await.unwrap();

        let contents = std::fs::read(&path).unwrap();
        let parsed: ObservableState = serde_json::from_slice(&contents).unwrap();
        assert_eq!(parsed.role, Role::Server);
        assert_eq!(parsed.program.uptime_seconds, 1.5);
        assert_eq!(parsed.program.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(parsed.measurement, state.measurement);

        std::fs::remove_file(&path).unwrap();
    }
}
