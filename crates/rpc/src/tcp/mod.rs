//! Zeilenbasiertes TCP-Interface fuer den RPC-Server

pub mod parser;
pub mod server;
pub mod session;

pub use server::{TcpServerKonfig, BEGRUESSUNG};
pub use session::{SessionZustand, TcpSession};
