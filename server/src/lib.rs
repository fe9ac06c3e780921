//! rpcwache-server – Bibliotheks-Root
//!
//! Verbindet Konfiguration, ACL-Tabelle und RPC-Server und registriert die
//! eingebauten Funktionen. Der Einstiegspunkt in `main.rs` ruft nur
//! [`Server::neu`] und [`Server::starten`] auf.

pub mod config;

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};

use config::ServerConfig;
use rpcwache_acl::AclLevel;
use rpcwache_rpc::{funktion, FunktionsRegister, RpcFunktion, RpcServer};

/// Standard-Mindestlevel von `methoden`
pub const METHODEN_LEVEL: AclLevel = 0;
/// Standard-Mindestlevel von `version`
pub const VERSION_LEVEL: AclLevel = 0;

/// Haelt den konfigurierten RPC-Server zusammen
pub struct Server {
    pub config: ServerConfig,
    rpc: RpcServer,
}

impl Server {
    /// Erstellt den Server aus der Konfiguration, ohne ihn zu starten.
    ///
    /// Ungueltige Werte (Bind-Adresse, ACL-Eintraege, Level-Overrides)
    /// fuehren zu einem Fehler.
    pub fn neu(config: ServerConfig) -> Result<Self> {
        config.validieren()?;

        let acl = config.acl_aufbauen()?;
        tracing::info!(eintraege = acl.anzahl(), "ACL geladen");

        let rpc = RpcServer::neu(config.tcp_konfig()?, Arc::new(acl))?;
        let server = Self { config, rpc };
        server.eingebaute_funktionen_registrieren()?;
        Ok(server)
    }

    /// Registriert `methoden` und `version`, Level ggf. aus `[funktionen]`
    fn eingebaute_funktionen_registrieren(&self) -> Result<()> {
        let register = self.rpc.register().clone();
        let methoden = funktion("methoden", move |_: &[Value]| {
            Ok(json!(register.namen()))
        });
        self.eingebaut_registrieren(METHODEN_LEVEL, methoden)?;

        let version = funktion("version", |_: &[Value]| {
            Ok(json!(env!("CARGO_PKG_VERSION")))
        });
        self.eingebaut_registrieren(VERSION_LEVEL, version)?;

        for name in self.config.funktionen.keys() {
            if !matches!(name.as_str(), "methoden" | "version") {
                tracing::warn!(funktion = %name, "Level-Override fuer unbekannte Funktion ignoriert");
            }
        }
        Ok(())
    }

    fn eingebaut_registrieren<F: RpcFunktion>(&self, standard: AclLevel, f: F) -> Result<()> {
        let register = self.rpc.register();
        match self.config.funktionen.get(f.name()) {
            Some(level) => {
                let name = f.name().to_string();
                register
                    .registrieren_dynamisch(level, f, None)
                    .map_err(|e| anyhow::anyhow!("[funktionen] {name}: {e}"))?;
            }
            None => register.registrieren(standard, f, None)?,
        }
        Ok(())
    }

    pub fn rpc(&self) -> &RpcServer {
        &self.rpc
    }

    /// Fuer das Registrieren weiterer Funktionen vor dem Start
    pub fn register(&self) -> &FunktionsRegister {
        self.rpc.register()
    }

    /// Startet den RPC-Server und laeuft bis zum Shutdown-Signal (Ctrl-C)
    pub async fn starten(mut self) -> Result<()> {
        self.rpc.starten()?;
        tracing::info!(
            adresse = ?self.rpc.lokale_adresse(),
            funktionen = self.rpc.register().anzahl(),
            "Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)..."
        );

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        // stoppen() joint den Worker-Thread und blockiert
        let mut rpc = self.rpc;
        tokio::task::spawn_blocking(move || rpc.stoppen()).await??;
        Ok(())
    }
}
