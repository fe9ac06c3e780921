//! Zugriffspruefung vor jeder Weiterleitung an eine registrierte Funktion
//!
//! Nicht registrierte Namen werden unabhaengig vom Client-Level abgelehnt.
//! Die Meldung bei Ablehnung enthaelt nie das erforderliche Level.

use serde_json::Value;

use rpcwache_acl::AclLevel;

use crate::error::{RpcFehler, RpcResult};
use crate::registry::{funktion, FunktionsRegister};

/// Reservierter Methodenname: liefert das eigene Level des Aufrufers
pub const XMLMODUS: &str = "xmlmodus";

/// Registriert den eingebauten `xmlmodus`-Handler.
///
/// Der Handler gibt sein erstes Argument zurueck; das Argument setzt
/// [`aufruf_pruefen`] immer auf das Level des Aufrufers.
pub fn xmlmodus_registrieren(register: &FunktionsRegister) -> RpcResult<()> {
    register.registrieren(
        0,
        funktion(XMLMODUS, |params: &[Value]| {
            Ok(params.first().cloned().unwrap_or(Value::Null))
        }),
        None,
    )
}

/// Prueft das Level des Aufrufers gegen das Mindestlevel der Methode und
/// leitet den Aufruf bei Erfolg weiter.
///
/// Ergebnis und Faults der Funktion werden unveraendert zurueckgegeben.
pub fn aufruf_pruefen(
    register: &FunktionsRegister,
    level: AclLevel,
    methode: &str,
    params: Vec<Value>,
) -> RpcResult<Value> {
    let verweigert = || RpcFehler::ZugriffVerweigert(methode.to_string());

    if level < 0 {
        tracing::debug!(methode, "Aufruf ohne Zugriff abgelehnt");
        return Err(verweigert());
    }

    let Some(eintrag) = register.suchen(methode) else {
        tracing::debug!(methode, "Aufruf einer unbekannten Methode abgelehnt");
        return Err(verweigert());
    };

    // xmlmodus ist fuer jeden zugelassenen Client aufrufbar
    let params = if methode == XMLMODUS {
        vec![Value::from(level)]
    } else {
        if level < eintrag.min_level {
            tracing::debug!(methode, "Aufruf wegen zu niedrigem Level abgelehnt");
            return Err(verweigert());
        }
        params
    };

    tracing::debug!(methode, "Aufruf zugelassen");
    eintrag.aufrufen(&params)
}
