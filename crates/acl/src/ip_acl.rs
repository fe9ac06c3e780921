//! In-Memory IP-ACL-Tabelle
//!
//! Format der Eintraege: `ADRESSE,LEVEL`, getrennt durch Whitespace oder
//! Zeilenumbrueche. `#` leitet einen Kommentar bis zum Zeilenende ein.
//!
//! ADRESSE ist entweder ein IPv4-Muster mit `*` als Platzhalter pro Oktett
//! (`192.168.1.*`) oder eine exakte IPv6-Adresse.
//!
//! Bei mehreren Treffern gewinnt der spezifischste Eintrag (wenigste
//! Platzhalter), bei Gleichstand der zuletzt aufgefuehrte.

use std::net::{IpAddr, Ipv6Addr};
use std::path::Path;

use parking_lot::RwLock;

use crate::error::{AclFehler, AclResult};
use crate::resolver::{AccessResolver, AclLevel, KEIN_ZUGRIFF};

/// Adressmuster eines ACL-Eintrags
#[derive(Debug, Clone, PartialEq, Eq)]
enum AdressMuster {
    /// IPv4, `None` = Platzhalter fuer dieses Oktett
    V4([Option<u8>; 4]),
    V6(Ipv6Addr),
}

impl AdressMuster {
    fn parsen(text: &str) -> Option<Self> {
        if text.contains(':') {
            return text.parse::<Ipv6Addr>().ok().map(Self::V6);
        }

        let mut oktette = [None; 4];
        let mut teile = text.split('.');
        for oktett in oktette.iter_mut() {
            let teil = teile.next()?;
            *oktett = match teil {
                "*" => None,
                zahl => Some(zahl.parse::<u8>().ok()?),
            };
        }
        if teile.next().is_some() {
            return None;
        }
        Some(Self::V4(oktette))
    }

    fn passt(&self, adresse: &IpAddr) -> bool {
        match (self, adresse) {
            (Self::V4(muster), IpAddr::V4(v4)) => muster
                .iter()
                .zip(v4.octets())
                .all(|(m, o)| m.map_or(true, |m| m == o)),
            (Self::V6(muster), IpAddr::V6(v6)) => muster == v6,
            _ => false,
        }
    }

    fn platzhalter(&self) -> usize {
        match self {
            Self::V4(muster) => muster.iter().filter(|o| o.is_none()).count(),
            Self::V6(_) => 0,
        }
    }

    fn als_text(&self) -> String {
        match self {
            Self::V4(muster) => muster
                .iter()
                .map(|o| o.map_or_else(|| "*".to_string(), |o| o.to_string()))
                .collect::<Vec<_>>()
                .join("."),
            Self::V6(v6) => v6.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct AclEintrag {
    muster: AdressMuster,
    level: AclLevel,
}

/// IP-basierte ACL mit festen Level-Grenzen
#[derive(Debug)]
pub struct IpAcl {
    min_level: AclLevel,
    max_level: AclLevel,
    eintraege: RwLock<Vec<AclEintrag>>,
}

impl IpAcl {
    /// Erstellt eine leere ACL. Ohne Eintraege hat keine Adresse Zugriff.
    pub fn neu(min_level: AclLevel, max_level: AclLevel) -> AclResult<Self> {
        if min_level < 0 || min_level > max_level {
            return Err(AclFehler::UngueltigeGrenzen {
                min: min_level,
                max: max_level,
            });
        }
        Ok(Self {
            min_level,
            max_level,
            eintraege: RwLock::new(Vec::new()),
        })
    }

    pub fn min_level(&self) -> AclLevel {
        self.min_level
    }

    pub fn max_level(&self) -> AclLevel {
        self.max_level
    }

    pub fn anzahl(&self) -> usize {
        self.eintraege.read().len()
    }

    /// Ersetzt die komplette Tabelle.
    ///
    /// Bei einem ungueltigen Eintrag bleibt die bisherige Tabelle erhalten.
    pub fn acl_setzen(&self, text: &str) -> AclResult<()> {
        let neu = self.eintraege_parsen(text)?;
        let anzahl = neu.len();
        *self.eintraege.write() = neu;
        tracing::debug!(anzahl, "ACL-Tabelle ersetzt");
        Ok(())
    }

    /// Laedt die Tabelle aus einer Datei im Eintragsformat
    pub fn datei_laden(&self, pfad: impl AsRef<Path>) -> AclResult<()> {
        let inhalt = std::fs::read_to_string(pfad.as_ref())?;
        self.acl_setzen(&inhalt)?;
        tracing::info!(
            pfad = %pfad.as_ref().display(),
            eintraege = self.anzahl(),
            "ACL-Datei geladen"
        );
        Ok(())
    }

    /// Gibt die Tabelle wieder im Eintragsformat aus (ein Eintrag pro Zeile)
    pub fn als_text(&self) -> String {
        self.eintraege
            .read()
            .iter()
            .map(|e| format!("{},{}\n", e.muster.als_text(), e.level))
            .collect()
    }

    fn eintraege_parsen(&self, text: &str) -> AclResult<Vec<AclEintrag>> {
        let mut eintraege = Vec::new();

        for zeile in text.lines() {
            let zeile = zeile.split('#').next().unwrap_or_default();
            for token in zeile.split_whitespace() {
                eintraege.push(self.eintrag_parsen(token)?);
            }
        }

        Ok(eintraege)
    }

    fn eintrag_parsen(&self, token: &str) -> AclResult<AclEintrag> {
        let (adresse, level) = token
            .rsplit_once(',')
            .ok_or_else(|| AclFehler::eintrag(token, "erwartet ADRESSE,LEVEL"))?;

        let muster = AdressMuster::parsen(adresse)
            .ok_or_else(|| AclFehler::eintrag(token, "ungueltige Adresse"))?;

        let level: AclLevel = level
            .parse()
            .map_err(|_| AclFehler::eintrag(token, "Level ist keine Ganzzahl"))?;

        if level < self.min_level || level > self.max_level {
            return Err(AclFehler::eintrag(
                token,
                format!(
                    "Level ausserhalb von {}..={}",
                    self.min_level, self.max_level
                ),
            ));
        }

        Ok(AclEintrag { muster, level })
    }
}

impl AccessResolver for IpAcl {
    fn level_ermitteln(&self, adresse: &str) -> AclLevel {
        let Ok(ip) = adresse.parse::<IpAddr>() else {
            return KEIN_ZUGRIFF;
        };
        let ip = ip.to_canonical();

        let eintraege = self.eintraege.read();
        let mut treffer: Option<&AclEintrag> = None;
        for eintrag in eintraege.iter().filter(|e| e.muster.passt(&ip)) {
            match treffer {
                Some(bisher) if bisher.muster.platzhalter() < eintrag.muster.platzhalter() => {}
                _ => treffer = Some(eintrag),
            }
        }

        treffer.map_or(KEIN_ZUGRIFF, |e| e.level)
    }
}
