//! Accept-Loop und Verbindungsbehandlung
//!
//! Zeilenbasiertes Protokoll ueber TCP.
//! Format: call name=<methode> [params=<JSON-Array>]\n | quit\n
//! Antworten: ok result=... oder error id=N msg=...
//!
//! Das Level eines Clients wird einmal beim Verbindungsaufbau ermittelt,
//! noch bevor eine Zeile gelesen wird. Clients ohne Zugriff bekommen
//! `error id=401` und die Verbindung wird geschlossen.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use rpcwache_acl::AccessResolver;

use crate::error::RpcFehler;
use crate::gate::aufruf_pruefen;
use crate::registry::FunktionsRegister;
use crate::tcp::parser::{ergebnis_antwort, fehler_antwort, ok_antwort, parse_line, RpcAufruf};
use crate::tcp::session::{client_ip, TcpSession};

/// Begruessungszeile fuer zugelassene Clients
pub const BEGRUESSUNG: &str = "rpcwache\n";

/// TCP-Server-Konfiguration
#[derive(Debug, Clone)]
pub struct TcpServerKonfig {
    pub bind_addr: SocketAddr,
    pub max_verbindungen: usize,
    pub zeilenlimit_bytes: usize,
}

impl Default for TcpServerKonfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 55123)),
            max_verbindungen: 32,
            zeilenlimit_bytes: 64 * 1024,
        }
    }
}

/// Gemeinsame Daten aller Verbindungen eines Servers
#[derive(Clone)]
pub(crate) struct VerbindungsKontext {
    pub register: FunktionsRegister,
    pub resolver: Arc<dyn AccessResolver>,
    pub zeilenlimit: usize,
}

/// Akzeptiert Verbindungen bis `shutdown_rx` ein `true`-Signal empfaengt.
///
/// Muss innerhalb einer `LocalSet` laufen. Nach dem Shutdown wird der
/// Listener freigegeben und auf das Ende aller Verbindungs-Tasks gewartet.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    max_verbindungen: usize,
    kontext: VerbindungsKontext,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let lokale_addr = listener.local_addr()?;
    tracing::info!(adresse = %lokale_addr, "Accept-Loop gestartet");

    let mut verbindungen = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        if verbindungen.len() >= max_verbindungen {
                            tracing::warn!(
                                peer = %peer_addr,
                                max = max_verbindungen,
                                "Verbindung abgelehnt: Connection-Limit erreicht"
                            );
                            // Stream wird durch Drop geschlossen
                            continue;
                        }

                        tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");
                        verbindungen.spawn_local(verbindung_behandeln(
                            stream,
                            peer_addr,
                            kontext.clone(),
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }

            // Beendete Verbindungs-Tasks einsammeln
            Some(_) = verbindungen.join_next(), if !verbindungen.is_empty() => {}

            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Accept-Loop: Shutdown-Signal empfangen");
                    break;
                }
            }
        }
    }

    drop(listener);
    while verbindungen.join_next().await.is_some() {}

    tracing::info!(adresse = %lokale_addr, "Accept-Loop beendet");
    Ok(())
}

/// Behandelt eine einzelne Verbindung
async fn verbindung_behandeln(
    stream: TcpStream,
    peer_addr: SocketAddr,
    kontext: VerbindungsKontext,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut session = TcpSession::neu(peer_addr, kontext.resolver.as_ref());
    let (reader, mut writer) = stream.into_split();

    if !session.ist_aktiv() {
        let ip = client_ip(&session.client_addr).to_string();
        tracing::warn!(peer = %session.client_addr, "Verbindung abgelehnt: IP ohne Zugriff");
        let antwort = fehler_antwort(&RpcFehler::NichtErlaubt { ip });
        let _ = writer.write_all(antwort.as_bytes()).await;
        let _ = writer.shutdown().await;
        return;
    }

    tracing::debug!(
        peer = %session.client_addr,
        session = %session.id,
        level = session.acl_level(),
        "Verbindung zugelassen"
    );

    if writer.write_all(BEGRUESSUNG.as_bytes()).await.is_err() {
        return;
    }

    let mut buf_reader = BufReader::new(reader);
    let limit = kontext.zeilenlimit as u64;
    let mut zeile = Vec::new();

    loop {
        zeile.clear();
        let mut begrenzt = (&mut buf_reader).take(limit.saturating_add(1));
        let gelesen = tokio::select! {
            r = begrenzt.read_until(b'\n', &mut zeile) => r,
            _ = shutdown_rx.changed() => break,
        };

        match gelesen {
            Ok(0) => break,
            Ok(n) if n as u64 > limit && zeile.last() != Some(&b'\n') => {
                let antwort = fehler_antwort(&RpcFehler::Protokoll(format!(
                    "Zeile laenger als {limit} Bytes"
                )));
                let _ = writer.write_all(antwort.as_bytes()).await;
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(fehler = %e, "Lesefehler auf TCP-Session");
                break;
            }
        }

        let antwort = match std::str::from_utf8(&zeile) {
            Ok(text) => verarbeite_befehl(text, &mut session, &kontext.register),
            Err(_) => fehler_antwort(&RpcFehler::Protokoll(
                "Zeile ist kein gueltiges UTF-8".into(),
            )),
        };
        if writer.write_all(antwort.as_bytes()).await.is_err() {
            break;
        }

        if !session.ist_aktiv() {
            break;
        }
    }

    let _ = writer.shutdown().await;
    tracing::debug!(peer = %session.client_addr, session = %session.id, "Verbindung beendet");
}

/// Verarbeitet eine einzelne Befehlszeile und gibt die Antwort zurueck
pub(crate) fn verarbeite_befehl(
    zeile: &str,
    session: &mut TcpSession,
    register: &FunktionsRegister,
) -> String {
    let parsed = match parse_line(zeile) {
        Ok(p) => p,
        Err(e) => return fehler_antwort(&e),
    };

    match parsed.name.as_str() {
        "call" => {
            let aufruf = match RpcAufruf::aus_befehl(&parsed) {
                Ok(a) => a,
                Err(e) => return fehler_antwort(&e),
            };
            match aufruf_pruefen(register, session.acl_level(), &aufruf.methode, aufruf.params) {
                Ok(ergebnis) => ergebnis_antwort(&ergebnis),
                Err(e) => fehler_antwort(&e),
            }
        }
        "quit" => {
            session.beenden();
            ok_antwort(&[("msg", "bye")])
        }
        andere => fehler_antwort(&RpcFehler::Protokoll(format!(
            "Unbekannter Befehl: {andere}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::xmlmodus_registrieren;
    use crate::registry::funktion;
    use rpcwache_acl::{AclLevel, KEIN_ZUGRIFF};
    use serde_json::{json, Value};

    fn resolver(adresse: &str) -> AclLevel {
        match adresse {
            "10.0.0.5" => 2,
            _ => KEIN_ZUGRIFF,
        }
    }

    fn register() -> FunktionsRegister {
        let register = FunktionsRegister::neu();
        xmlmodus_registrieren(&register).unwrap();
        register
            .registrieren(3, funktion("reboot", |_: &[Value]| Ok(json!(true))), None)
            .unwrap();
        register
            .registrieren(1, funktion("echo", |p: &[Value]| Ok(Value::Array(p.to_vec()))), None)
            .unwrap();
        register
    }

    fn session() -> TcpSession {
        TcpSession::neu("10.0.0.5:50000".parse().unwrap(), &resolver)
    }

    #[test]
    fn erlaubter_aufruf_liefert_ergebnis() {
        let antwort = verarbeite_befehl(
            "call name=echo params=[1,\"x\"]\n",
            &mut session(),
            &register(),
        );
        assert_eq!(antwort, "ok result=[1,\\\"x\\\"]\n");
    }

    #[test]
    fn zu_niedriges_level_wird_abgelehnt() {
        let antwort = verarbeite_befehl("call name=reboot\n", &mut session(), &register());
        assert!(antwort.starts_with("error id=1002 "));
    }

    #[test]
    fn xmlmodus_liefert_session_level() {
        let antwort = verarbeite_befehl(
            "call name=xmlmodus params=[9]\n",
            &mut session(),
            &register(),
        );
        assert_eq!(antwort, "ok result=2\n");
    }

    #[test]
    fn quit_beendet_session() {
        let mut session = session();
        let antwort = verarbeite_befehl("quit\n", &mut session, &register());
        assert_eq!(antwort, "ok msg=bye\n");
        assert!(!session.ist_aktiv());
    }

    #[test]
    fn unbekannter_befehl_ist_protokollfehler() {
        let antwort = verarbeite_befehl("reboot\n", &mut session(), &register());
        assert!(antwort.starts_with("error id=5003 "));
    }

    #[test]
    fn standard_konfig() {
        let konfig = TcpServerKonfig::default();
        assert_eq!(konfig.bind_addr.port(), 55123);
        assert!(konfig.max_verbindungen > 0);
    }
}
