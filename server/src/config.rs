//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist (dann nur fuer 127.0.0.1).

use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use rpcwache_acl::IpAcl;
use rpcwache_rpc::TcpServerKonfig;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Netzwerk-Einstellungen des RPC-Servers
    pub server: ServerEinstellungen,
    /// Zugriffslevel pro Client-Adresse
    pub acl: AclEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Abweichende Mindestlevel der eingebauten Funktionen (Name -> Level)
    pub funktionen: HashMap<String, serde_json::Value>,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Bind-Adresse des RPC-Servers
    pub bind_adresse: String,
    /// Port des RPC-Servers
    pub port: u16,
    /// Maximale gleichzeitige Verbindungen
    pub max_verbindungen: usize,
    /// Maximale Laenge einer Befehlszeile
    pub zeilenlimit_bytes: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "127.0.0.1".into(),
            port: 55123,
            max_verbindungen: 32,
            zeilenlimit_bytes: 64 * 1024,
        }
    }
}

/// ACL-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AclEinstellungen {
    /// Kleinstes erlaubtes Level eines Eintrags
    pub min_level: i32,
    /// Groesstes erlaubtes Level eines Eintrags
    pub max_level: i32,
    /// Eintraege im Format `ADRESSE,LEVEL`
    pub eintraege: Vec<String>,
    /// ACL-Datei; ersetzt `eintraege` wenn gesetzt
    pub datei: Option<String>,
}

impl Default for AclEinstellungen {
    fn default() -> Self {
        Self {
            min_level: 0,
            max_level: 9,
            eintraege: vec!["127.0.0.1,9".into()],
            datei: None,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Werte die serde nicht pruefen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !rpcwache_observability::log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiges Log-Level: {}", self.logging.level);
        }
        self.logging
            .format
            .parse::<rpcwache_observability::LogFormat>()
            .map_err(|e| anyhow::anyhow!(e))?;
        if self.server.max_verbindungen == 0 {
            anyhow::bail!("server.max_verbindungen muss groesser als 0 sein");
        }
        if self.server.zeilenlimit_bytes == 0 {
            anyhow::bail!("server.zeilenlimit_bytes muss groesser als 0 sein");
        }
        self.bind_adresse()?;
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse des RPC-Servers zurueck
    pub fn bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let adresse = format!("{}:{}", self.server.bind_adresse, self.server.port);
        adresse
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{adresse}'"))
    }

    pub fn tcp_konfig(&self) -> anyhow::Result<TcpServerKonfig> {
        Ok(TcpServerKonfig {
            bind_addr: self.bind_adresse()?,
            max_verbindungen: self.server.max_verbindungen,
            zeilenlimit_bytes: self.server.zeilenlimit_bytes,
        })
    }

    /// Baut die ACL-Tabelle aus Datei oder Eintraegen auf
    pub fn acl_aufbauen(&self) -> anyhow::Result<IpAcl> {
        let acl = IpAcl::neu(self.acl.min_level, self.acl.max_level)?;
        match &self.acl.datei {
            Some(datei) => acl
                .datei_laden(datei)
                .with_context(|| format!("ACL-Datei '{datei}'"))?,
            None => acl.acl_setzen(&self.acl.eintraege.join("\n"))?,
        }
        Ok(acl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcwache_acl::{AccessResolver, KEIN_ZUGRIFF};

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        cfg.validieren().unwrap();
        assert_eq!(cfg.server.port, 55123);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.bind_adresse().unwrap().to_string(), "127.0.0.1:55123");
    }

    #[test]
    fn standard_acl_erlaubt_nur_localhost() {
        let acl = ServerConfig::default().acl_aufbauen().unwrap();
        assert_eq!(acl.level_ermitteln("127.0.0.1"), 9);
        assert_eq!(acl.level_ermitteln("10.0.0.1"), KEIN_ZUGRIFF);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            port = 6000

            [acl]
            max_level = 4
            eintraege = ["10.0.0.5,2", "192.168.*.*,1"]

            [funktionen]
            methoden = 2
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.port, 6000);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.server.bind_adresse, "127.0.0.1");
        assert_eq!(cfg.funktionen["methoden"], serde_json::json!(2));

        let acl = cfg.acl_aufbauen().unwrap();
        assert_eq!(acl.level_ermitteln("10.0.0.5"), 2);
        assert_eq!(acl.level_ermitteln("192.168.3.3"), 1);
        assert_eq!(acl.level_ermitteln("127.0.0.1"), KEIN_ZUGRIFF);
    }

    #[test]
    fn acl_level_ueber_maximum_schlaegt_fehl() {
        let toml = r#"
            [acl]
            max_level = 1
            eintraege = ["10.0.0.5,2"]
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert!(cfg.acl_aufbauen().is_err());
    }

    #[test]
    fn acl_datei_ersetzt_eintraege() {
        let dir = tempfile::tempdir().expect("Temp-Verzeichnis konnte nicht erstellt werden");
        let pfad = dir.path().join("rpcwache.acl");
        std::fs::write(&pfad, "10.1.1.1,3\n").unwrap();

        let mut cfg = ServerConfig::default();
        cfg.acl.datei = Some(pfad.to_string_lossy().into_owned());
        let acl = cfg.acl_aufbauen().unwrap();
        assert_eq!(acl.level_ermitteln("10.1.1.1"), 3);
        assert_eq!(acl.level_ermitteln("127.0.0.1"), KEIN_ZUGRIFF);

        cfg.acl.datei = Some(dir.path().join("fehlt.acl").to_string_lossy().into_owned());
        assert!(cfg.acl_aufbauen().is_err());
    }

    #[test]
    fn ungueltige_werte_werden_erkannt() {
        let mut cfg = ServerConfig::default();
        cfg.logging.level = "laut".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.server.bind_adresse = "kein host".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.server.max_verbindungen = 0;
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn groesstes_zeilenlimit_ist_gueltig() {
        let mut cfg = ServerConfig::default();
        cfg.server.zeilenlimit_bytes = usize::MAX;
        cfg.validieren().unwrap();
        assert_eq!(cfg.tcp_konfig().unwrap().zeilenlimit_bytes, usize::MAX);
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/rpcwache.toml").unwrap();
        assert_eq!(cfg.server.port, 55123);
    }
}
