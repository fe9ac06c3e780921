//! rpcwache-rpc – Zugriffsgeschuetzter RPC-Server
//!
//! Jede registrierte Funktion hat ein Mindestlevel, jeder Client bekommt
//! beim Verbindungsaufbau ueber einen [`AccessResolver`] ein Level
//! zugewiesen. Aufrufe werden nur weitergeleitet wenn das Client-Level
//! mindestens dem Mindestlevel entspricht.
//!
//! - [`registry`]: Funktionsregister (Name -> Mindestlevel + Aufruf)
//! - [`gate`]: Zugriffspruefung vor jeder Weiterleitung
//! - [`tcp`]: Zeilenbasiertes Transport-Interface
//! - [`lifecycle`]: Start/Stop des Hintergrund-Workers

pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod registry;
pub mod tcp;

pub use error::{RpcFehler, RpcResult};
pub use gate::{aufruf_pruefen, XMLMODUS};
pub use lifecycle::{RpcServer, ServerZustand};
pub use registry::{funktion, FunktionsEintrag, FunktionsRegister, RpcFunktion};
pub use rpcwache_acl::{AccessResolver, AclLevel, KEIN_ZUGRIFF};
pub use tcp::TcpServerKonfig;
