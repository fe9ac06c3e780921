//! Funktionsregister
//!
//! Bildet Funktionsnamen auf einen [`FunktionsEintrag`] mit Mindestlevel und
//! Aufruf ab. Ein Eintrag wird immer als Ganzes ersetzt, Aufruf und Level
//! koennen daher nie auseinanderlaufen.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use rpcwache_acl::AclLevel;

use crate::error::{RpcFehler, RpcResult};

/// Einheitliche Aufruf-Signatur aller registrierten Funktionen
pub type FunktionsAufruf = Arc<dyn Fn(&[Value]) -> RpcResult<Value> + Send + Sync>;

/// Eine per RPC aufrufbare Funktion mit eigenem Namen
pub trait RpcFunktion: Send + Sync + 'static {
    /// Name unter dem die Funktion ohne expliziten Namen registriert wird
    fn name(&self) -> &str;

    fn aufrufen(&self, params: &[Value]) -> RpcResult<Value>;
}

/// Funktion aus Name und Closure, siehe [`funktion`]
pub struct BenannteFunktion<F> {
    name: String,
    f: F,
}

impl<F> RpcFunktion for BenannteFunktion<F>
where
    F: Fn(&[Value]) -> RpcResult<Value> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn aufrufen(&self, params: &[Value]) -> RpcResult<Value> {
        (self.f)(params)
    }
}

/// Erstellt eine [`RpcFunktion`] aus einem Namen und einer Closure
pub fn funktion<F>(name: impl Into<String>, f: F) -> BenannteFunktion<F>
where
    F: Fn(&[Value]) -> RpcResult<Value> + Send + Sync + 'static,
{
    BenannteFunktion {
        name: name.into(),
        f,
    }
}

/// Unveraenderlicher Registereintrag
pub struct FunktionsEintrag {
    pub name: String,
    pub min_level: AclLevel,
    aufruf: FunktionsAufruf,
}

impl FunktionsEintrag {
    pub fn aufrufen(&self, params: &[Value]) -> RpcResult<Value> {
        (self.aufruf)(params)
    }
}

impl std::fmt::Debug for FunktionsEintrag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunktionsEintrag")
            .field("name", &self.name)
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}

/// Register aller aufrufbaren Funktionen.
///
/// Klone teilen sich dieselbe Tabelle.
#[derive(Clone, Default)]
pub struct FunktionsRegister {
    funktionen: Arc<RwLock<HashMap<String, Arc<FunktionsEintrag>>>>,
}

impl FunktionsRegister {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert eine Funktion mit Mindestlevel.
    ///
    /// Ohne `name` wird [`RpcFunktion::name`] verwendet. Ein bestehender
    /// Eintrag gleichen Namens wird vollstaendig ersetzt.
    pub fn registrieren<F: RpcFunktion>(
        &self,
        min_level: AclLevel,
        funktion: F,
        name: Option<&str>,
    ) -> RpcResult<()> {
        let name = name.unwrap_or_else(|| funktion.name()).to_string();
        if name.trim().is_empty() {
            return Err(RpcFehler::UngueltigesArgument(
                "Funktionsname darf nicht leer sein".into(),
            ));
        }

        let funktion = Arc::new(funktion);
        let eintrag = Arc::new(FunktionsEintrag {
            name: name.clone(),
            min_level,
            aufruf: Arc::new(move |params: &[Value]| funktion.aufrufen(params)),
        });

        let ersetzt = self.funktionen.write().insert(name.clone(), eintrag).is_some();
        tracing::debug!(funktion = %name, min_level, ersetzt, "Funktion registriert");
        Ok(())
    }

    /// Registriert eine Funktion mit einem Level aus untypisierten Daten
    /// (z.B. Konfiguration). Alles ausser einer Ganzzahl im `i32`-Bereich
    /// wird abgelehnt, das Register bleibt dann unveraendert.
    pub fn registrieren_dynamisch<F: RpcFunktion>(
        &self,
        min_level: &Value,
        funktion: F,
        name: Option<&str>,
    ) -> RpcResult<()> {
        let level = min_level
            .as_i64()
            .and_then(|l| AclLevel::try_from(l).ok())
            .ok_or_else(|| {
                RpcFehler::UngueltigesArgument(format!(
                    "min_level muss eine Ganzzahl sein, erhalten: {min_level}"
                ))
            })?;
        self.registrieren(level, funktion, name)
    }

    pub fn suchen(&self, name: &str) -> Option<Arc<FunktionsEintrag>> {
        self.funktionen.read().get(name).cloned()
    }

    pub fn enthaelt(&self, name: &str) -> bool {
        self.funktionen.read().contains_key(name)
    }

    /// Alle registrierten Namen, sortiert
    pub fn namen(&self) -> Vec<String> {
        let mut namen: Vec<String> = self.funktionen.read().keys().cloned().collect();
        namen.sort();
        namen
    }

    pub fn anzahl(&self) -> usize {
        self.funktionen.read().len()
    }
}
