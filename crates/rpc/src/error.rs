//! Fehlertypen fuer den RPC-Server

use thiserror::Error;

/// Alle moeglichen Fehler im RPC-Crate
#[derive(Debug, Error)]
pub enum RpcFehler {
    #[error("Ungueltiges Argument: {0}")]
    UngueltigesArgument(String),

    #[error("function call not allowed: {0}")]
    ZugriffVerweigert(String),

    #[error("IP '{ip}' not allowed")]
    NichtErlaubt { ip: String },

    #[error("Ungueltiger Zustand: {0}")]
    UngueltigerZustand(String),

    /// Fehler der aufgerufenen Funktion selbst (Geschaeftslogik)
    #[error("Fault {code}: {nachricht}")]
    Aufruf { code: i32, nachricht: String },

    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type RpcResult<T> = Result<T, RpcFehler>;

impl RpcFehler {
    /// Fault einer registrierten Funktion
    pub fn aufruf(code: i32, nachricht: impl Into<String>) -> Self {
        Self::Aufruf {
            code,
            nachricht: nachricht.into(),
        }
    }

    /// Fehler-Code fuer Protokoll-Antworten
    pub fn fehler_code(&self) -> u32 {
        match self {
            Self::NichtErlaubt { .. } => 401,
            Self::ZugriffVerweigert(_) => 1002,
            Self::UngueltigesArgument(_) => 1005,
            Self::UngueltigerZustand(_) => 1006,
            Self::Aufruf { .. } => 4000,
            Self::Io(_) => 5001,
            Self::Protokoll(_) => 5003,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zugriff_verweigert_ist_von_fault_unterscheidbar() {
        let verweigert = RpcFehler::ZugriffVerweigert("reboot".into());
        let fault = RpcFehler::aufruf(7, "Geraet nicht gefunden");
        assert_ne!(verweigert.fehler_code(), fault.fehler_code());
    }

    #[test]
    fn nicht_erlaubt_nennt_adresse() {
        let fehler = RpcFehler::NichtErlaubt {
            ip: "192.168.1.1".into(),
        };
        assert_eq!(fehler.fehler_code(), 401);
        assert_eq!(fehler.to_string(), "IP '192.168.1.1' not allowed");
    }
}
