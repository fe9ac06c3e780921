//! TCP-Session-Management
//!
//! Jede Verbindung bekommt beim Aufbau genau einmal ihr Zugriffslevel.
//! Alle Aufrufe auf dieser Verbindung werden mit diesem Level geprueft.

use std::net::{IpAddr, SocketAddr};

use uuid::Uuid;

use rpcwache_acl::{AccessResolver, AclLevel};

/// Zustand einer TCP-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    /// Client hat kein Zugriffslevel, Verbindung wird abgelehnt
    Abgelehnt,
    /// Verbunden, Aufrufe werden verarbeitet
    Aktiv,
    /// Verbindung wird beendet
    Beendend,
}

/// Eine aktive TCP-Session
#[derive(Debug)]
pub struct TcpSession {
    pub id: Uuid,
    pub zustand: SessionZustand,
    pub client_addr: SocketAddr,
    acl_level: AclLevel,
}

impl TcpSession {
    /// Loest das Level des Clients auf und legt die Session an
    pub fn neu(client_addr: SocketAddr, resolver: &dyn AccessResolver) -> Self {
        let acl_level = resolver.level_ermitteln(&client_ip(&client_addr).to_string());
        let zustand = if acl_level >= 0 {
            SessionZustand::Aktiv
        } else {
            SessionZustand::Abgelehnt
        };
        Self {
            id: Uuid::new_v4(),
            zustand,
            client_addr,
            acl_level,
        }
    }

    pub fn acl_level(&self) -> AclLevel {
        self.acl_level
    }

    pub fn ist_aktiv(&self) -> bool {
        self.zustand == SessionZustand::Aktiv
    }

    pub fn beenden(&mut self) {
        self.zustand = SessionZustand::Beendend;
    }
}

/// IP des Clients, IPv4-gemappte IPv6-Adressen als IPv4
pub fn client_ip(addr: &SocketAddr) -> IpAddr {
    addr.ip().to_canonical()
}
