//! Aufloesung von Client-Adressen zu Zugriffsleveln

/// Zugriffslevel eines Clients bzw. Mindestlevel einer Funktion.
///
/// Negative Werte bedeuten "kein Zugriff", ab `0` gilt: hoeher = mehr Rechte.
pub type AclLevel = i32;

/// Sentinel fuer Clients ohne jeden Zugriff
pub const KEIN_ZUGRIFF: AclLevel = -1;

/// Bildet eine Client-Adresse auf ein Zugriffslevel ab.
///
/// Implementierungen muessen reine In-Memory-Lookups sein: der Server ruft
/// `level_ermitteln` fuer jede neue Verbindung auf seinem einzigen Worker auf.
pub trait AccessResolver: Send + Sync {
    fn level_ermitteln(&self, adresse: &str) -> AclLevel;
}

impl<F> AccessResolver for F
where
    F: Fn(&str) -> AclLevel + Send + Sync,
{
    fn level_ermitteln(&self, adresse: &str) -> AclLevel {
        self(adresse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_als_resolver() {
        let resolver = |adresse: &str| if adresse == "10.0.0.5" { 2 } else { KEIN_ZUGRIFF };
        assert_eq!(resolver.level_ermitteln("10.0.0.5"), 2);
        assert_eq!(resolver.level_ermitteln("10.0.0.6"), KEIN_ZUGRIFF);
    }
}
