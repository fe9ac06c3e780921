//! Fehlertypen fuer die ACL-Verwaltung

use thiserror::Error;

/// Alle moeglichen Fehler beim Aufbau einer ACL-Tabelle
#[derive(Debug, Error)]
pub enum AclFehler {
    #[error("Ungueltige Level-Grenzen: min={min} max={max}")]
    UngueltigeGrenzen { min: i32, max: i32 },

    #[error("Ungueltiger ACL-Eintrag '{eintrag}': {grund}")]
    UngueltigerEintrag { eintrag: String, grund: String },

    #[error("ACL-Datei nicht lesbar: {0}")]
    Io(#[from] std::io::Error),
}

impl AclFehler {
    pub fn eintrag(eintrag: impl Into<String>, grund: impl Into<String>) -> Self {
        Self::UngueltigerEintrag {
            eintrag: eintrag.into(),
            grund: grund.into(),
        }
    }
}

/// Result-Alias fuer die ACL-Verwaltung
pub type AclResult<T> = Result<T, AclFehler>;
