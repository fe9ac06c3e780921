//! rpcwache-acl – Zugriffslevel pro Client-Adresse
//!
//! Stellt den [`AccessResolver`]-Trait bereit, ueber den der RPC-Server
//! die IP-Adresse eines Clients auf ein [`AclLevel`] abbildet, sowie die
//! In-Memory-Tabelle [`IpAcl`] als Standard-Implementierung.

pub mod error;
pub mod ip_acl;
pub mod resolver;

pub use error::{AclFehler, AclResult};
pub use ip_acl::IpAcl;
pub use resolver::{AccessResolver, AclLevel, KEIN_ZUGRIFF};
