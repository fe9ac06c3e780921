//! Structured Logging Setup via tracing-subscriber
//!
//! Level und Format kommen aus der Konfiguration und koennen per
//! Umgebungsvariable ueberschrieben werden:
//! - `RW_LOG_LEVEL`: EnvFilter-Direktive, z.B. `debug` oder `rpcwache_rpc=trace`
//! - `RW_LOG_FORMAT`: `text` oder `json`

use std::str::FromStr;

use tracing_subscriber::{fmt, EnvFilter};

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            andere => Err(format!("Unbekanntes Log-Format: {andere}")),
        }
    }
}

/// Initialisiert das Logging-System.
///
/// Ungueltige Werte fallen auf `info` bzw. Text zurueck. Ein bereits
/// installierter Subscriber (z.B. in Tests) bleibt erhalten.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env("RW_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = std::env::var("RW_LOG_FORMAT")
        .ok()
        .and_then(|f| f.parse().ok())
        .or_else(|| format.parse().ok())
        .unwrap_or_default();

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging bereits initialisiert");
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}
