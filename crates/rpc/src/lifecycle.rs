//! Start/Stop des RPC-Servers
//!
//! Zustaende: `NichtGestartet -> Laeuft -> Gestoppt`. Ein gestoppter Server
//! kann nicht erneut gestartet werden.
//!
//! ## Concurrency-Modell
//! Die Accept-Loop laeuft auf genau einem eigenen Worker-Thread mit einer
//! single-threaded tokio-Runtime und einer `LocalSet`. Alle Verbindungen
//! werden auf diesem Thread bedient; das Level jeder Verbindung liegt in
//! ihrer eigenen `TcpSession`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::watch;
use tokio::task::LocalSet;

use rpcwache_acl::{AccessResolver, AclLevel};

use crate::error::{RpcFehler, RpcResult};
use crate::gate::xmlmodus_registrieren;
use crate::registry::{FunktionsRegister, RpcFunktion};
use crate::tcp::server::{accept_loop, TcpServerKonfig, VerbindungsKontext};

/// Lebenszyklus-Zustand des Servers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerZustand {
    NichtGestartet,
    Laeuft,
    Gestoppt,
}

/// Zugriffsgeschuetzter RPC-Server
pub struct RpcServer {
    konfig: TcpServerKonfig,
    register: FunktionsRegister,
    resolver: Arc<dyn AccessResolver>,
    zustand: ServerZustand,
    worker: Option<JoinHandle<std::io::Result<()>>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    lokale_adresse: Option<SocketAddr>,
}

impl RpcServer {
    /// Erstellt einen Server mit leerem Register (nur `xmlmodus`)
    pub fn neu(konfig: TcpServerKonfig, resolver: Arc<dyn AccessResolver>) -> RpcResult<Self> {
        let register = FunktionsRegister::neu();
        xmlmodus_registrieren(&register)?;

        Ok(Self {
            konfig,
            register,
            resolver,
            zustand: ServerZustand::NichtGestartet,
            worker: None,
            shutdown_tx: None,
            lokale_adresse: None,
        })
    }

    /// Registriert eine Funktion, siehe [`FunktionsRegister::registrieren`]
    pub fn registrieren<F: RpcFunktion>(
        &self,
        min_level: AclLevel,
        funktion: F,
        name: Option<&str>,
    ) -> RpcResult<()> {
        self.register.registrieren(min_level, funktion, name)
    }

    pub fn register(&self) -> &FunktionsRegister {
        &self.register
    }

    pub fn zustand(&self) -> ServerZustand {
        self.zustand
    }

    /// Tatsaechlich gebundene Adresse (z.B. bei Port 0), erst nach dem Start
    pub fn lokale_adresse(&self) -> Option<SocketAddr> {
        self.lokale_adresse
    }

    /// Bindet den Socket und startet die Accept-Loop im Hintergrund.
    ///
    /// Schlaegt das Binden fehl, bleibt der Server in `NichtGestartet`.
    pub fn starten(&mut self) -> RpcResult<()> {
        tracing::debug!("RPC-Server wird gestartet");

        if self.zustand != ServerZustand::NichtGestartet {
            return Err(RpcFehler::UngueltigerZustand(
                "rpc server can only be started once".into(),
            ));
        }

        let listener = std::net::TcpListener::bind(self.konfig.bind_addr)?;
        listener.set_nonblocking(true)?;
        let lokale_adresse = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let max_verbindungen = self.konfig.max_verbindungen;
        let kontext = VerbindungsKontext {
            register: self.register.clone(),
            resolver: Arc::clone(&self.resolver),
            zeilenlimit: self.konfig.zeilenlimit_bytes,
        };

        let worker = std::thread::Builder::new()
            .name("rpcwache-worker".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = tokio::net::TcpListener::from_std(listener)?;
                    let local = LocalSet::new();
                    let ergebnis = local
                        .run_until(accept_loop(listener, max_verbindungen, kontext, shutdown_rx))
                        .await;
                    if let Err(e) = &ergebnis {
                        tracing::error!(fehler = %e, "Accept-Loop mit Fehler beendet");
                    }
                    ergebnis
                })
            })?;

        self.worker = Some(worker);
        self.shutdown_tx = Some(shutdown_tx);
        self.lokale_adresse = Some(lokale_adresse);
        self.zustand = ServerZustand::Laeuft;

        tracing::info!(adresse = %lokale_adresse, "RPC-Server gestartet");
        Ok(())
    }

    /// Signalisiert den Shutdown, wartet auf den Worker und gibt den Socket frei.
    ///
    /// Laufende Aufrufe werden nicht abgebrochen.
    pub fn stoppen(&mut self) -> RpcResult<()> {
        tracing::debug!("RPC-Server wird gestoppt");

        match self.zustand {
            ServerZustand::NichtGestartet => {
                return Err(RpcFehler::UngueltigerZustand(
                    "rpc server was not started".into(),
                ))
            }
            ServerZustand::Gestoppt => {
                return Err(RpcFehler::UngueltigerZustand(
                    "rpc server already stopped".into(),
                ))
            }
            ServerZustand::Laeuft => {}
        }

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            // Fehler nur wenn die Loop bereits beendet ist
            let _ = shutdown_tx.send(true);
        }
        self.zustand = ServerZustand::Gestoppt;

        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(fehler = %e, "Worker mit Fehler beendet"),
                Err(_) => tracing::error!("Worker-Thread abgestuerzt"),
            }
        }

        tracing::info!("RPC-Server gestoppt");
        Ok(())
    }

    /// Ob der Worker gerade die Accept-Loop ausfuehrt
    pub fn laeuft(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        if self.zustand == ServerZustand::Laeuft {
            let _ = self.stoppen();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcwache_acl::KEIN_ZUGRIFF;

    fn test_server() -> RpcServer {
        let konfig = TcpServerKonfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..TcpServerKonfig::default()
        };
        let resolver = Arc::new(|_: &str| KEIN_ZUGRIFF);
        RpcServer::neu(konfig, resolver).unwrap()
    }

    #[test]
    fn neuer_server_ist_nicht_gestartet() {
        let server = test_server();
        assert_eq!(server.zustand(), ServerZustand::NichtGestartet);
        assert!(!server.laeuft());
        assert!(server.lokale_adresse().is_none());
        assert!(server.register().enthaelt(crate::XMLMODUS));
    }

    #[test]
    fn start_stop_zyklus() {
        let mut server = test_server();
        server.starten().unwrap();
        assert_eq!(server.zustand(), ServerZustand::Laeuft);
        assert!(server.laeuft());
        assert_ne!(server.lokale_adresse().unwrap().port(), 0);

        server.stoppen().unwrap();
        assert_eq!(server.zustand(), ServerZustand::Gestoppt);
        assert!(!server.laeuft());
    }

    #[test]
    fn zweiter_start_schlaegt_fehl() {
        let mut server = test_server();
        server.starten().unwrap();
        let adresse = server.lokale_adresse();

        assert!(matches!(
            server.starten(),
            Err(RpcFehler::UngueltigerZustand(_))
        ));
        assert_eq!(server.zustand(), ServerZustand::Laeuft);
        assert_eq!(server.lokale_adresse(), adresse);
        assert!(server.laeuft());

        server.stoppen().unwrap();
    }

    #[test]
    fn stop_ohne_start_schlaegt_fehl() {
        let mut server = test_server();
        assert!(matches!(
            server.stoppen(),
            Err(RpcFehler::UngueltigerZustand(_))
        ));
        assert_eq!(server.zustand(), ServerZustand::NichtGestartet);

        // Server bleibt startbar
        server.starten().unwrap();
        server.stoppen().unwrap();
    }

    #[test]
    fn kein_neustart_nach_stop() {
        let mut server = test_server();
        server.starten().unwrap();
        server.stoppen().unwrap();

        assert!(matches!(
            server.starten(),
            Err(RpcFehler::UngueltigerZustand(_))
        ));
        assert!(matches!(
            server.stoppen(),
            Err(RpcFehler::UngueltigerZustand(_))
        ));
        assert!(!server.laeuft());
    }

    #[test]
    fn bind_fehler_laesst_zustand_unveraendert() {
        let belegt = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let konfig = TcpServerKonfig {
            bind_addr: belegt.local_addr().unwrap(),
            ..TcpServerKonfig::default()
        };
        let mut server = RpcServer::neu(konfig, Arc::new(|_: &str| 0)).unwrap();

        assert!(matches!(server.starten(), Err(RpcFehler::Io(_))));
        assert_eq!(server.zustand(), ServerZustand::NichtGestartet);
        assert!(!server.laeuft());
    }

    #[test]
    fn laeuft_ist_falsch_wenn_loop_von_selbst_endet() {
        let mut server = test_server();
        server.starten().unwrap();
        assert!(server.laeuft());

        // Ohne Sender endet die Accept-Loop ohne Stop-Aufruf
        drop(server.shutdown_tx.take());
        let ende = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while server.laeuft() && std::time::Instant::now() < ende {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        assert!(!server.laeuft());
        assert_eq!(server.zustand(), ServerZustand::Laeuft);

        server.stoppen().unwrap();
        assert_eq!(server.zustand(), ServerZustand::Gestoppt);
    }

    #[test]
    fn socket_nach_stop_freigegeben() {
        let mut server = test_server();
        server.starten().unwrap();
        let adresse = server.lokale_adresse().unwrap();
        server.stoppen().unwrap();

        std::net::TcpListener::bind(adresse).unwrap();
    }
}
