//! Befehlsparser fuer das zeilenbasierte TCP-Interface
//!
//! Parst zeilenbasierte Befehle im Format:
//!   befehlsname key1=value1 key2="value with spaces"
//!
//! Sonderzeichen in Werten werden mit Backslash escaped:
//!   \s = Leerzeichen, \n = Newline, \\ = Backslash, \| = Pipe, \" = Quote
//!
//! Ein RPC-Aufruf sieht so aus:
//!   call name=status params=[1,"a\sb"]

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{RpcFehler, RpcResult};

/// Ein geparster TCP-Befehl
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    /// Befehlsname (z.B. "call", "quit")
    pub name: String,
    /// Key-Value-Parameter
    pub params: HashMap<String, String>,
}

impl ParsedCommand {
    /// Gibt einen Parameter als String zurueck
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }

    /// Gibt einen Pflicht-Parameter zurueck oder einen Fehler
    pub fn required_param(&self, key: &str) -> RpcResult<&str> {
        self.param(key)
            .ok_or_else(|| RpcFehler::Protokoll(format!("Pflicht-Parameter fehlt: {key}")))
    }

    /// Gibt einen optionalen Parameter als JSON-Wert zurueck
    pub fn json_param(&self, key: &str) -> RpcResult<Option<Value>> {
        self.param(key)
            .map(|s| {
                serde_json::from_str(s).map_err(|e| {
                    RpcFehler::Protokoll(format!("Ungueltiges JSON fuer '{key}': {e}"))
                })
            })
            .transpose()
    }
}

/// Methodenname und Argumente eines `call`-Befehls
#[derive(Debug, Clone, PartialEq)]
pub struct RpcAufruf {
    pub methode: String,
    pub params: Vec<Value>,
}

impl RpcAufruf {
    /// Liest `name` und `params` aus einem `call`-Befehl.
    ///
    /// `params` ist optional, muss aber ein JSON-Array sein.
    pub fn aus_befehl(befehl: &ParsedCommand) -> RpcResult<Self> {
        let methode = befehl.required_param("name")?.to_string();
        let params = match befehl.json_param("params")? {
            None => Vec::new(),
            Some(Value::Array(werte)) => werte,
            Some(_) => {
                return Err(RpcFehler::Protokoll(
                    "params muss ein JSON-Array sein".into(),
                ))
            }
        };
        Ok(Self { methode, params })
    }
}

/// Parst eine Befehlszeile
///
/// Format: `befehlsname [key=value ...]`
/// Werte koennen mit " " gequotet oder mit \s escaped sein.
pub fn parse_line(line: &str) -> RpcResult<ParsedCommand> {
    let line = line.trim();
    if line.is_empty() {
        return Err(RpcFehler::Protokoll("Leere Befehlszeile".into()));
    }

    // Tokens durch Leerzeichen trennen (aber quoted Werte beachten)
    let tokens = tokenize(line);
    if tokens.is_empty() {
        return Err(RpcFehler::Protokoll("Kein Befehlsname".into()));
    }

    let name = tokens[0].to_lowercase();
    let mut params = HashMap::new();

    for token in &tokens[1..] {
        if let Some((key, value)) = token.split_once('=') {
            params.insert(key.to_lowercase(), value.to_string());
        }
        // Token ohne '=' werden ignoriert (kein Wert)
    }

    Ok(ParsedCommand { name, params })
}

/// Zerlegt eine Zeile in Tokens, beachtet quoted Strings und loest
/// Escape-Sequenzen auf
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            // Quotes nur direkt hinter dem ersten '=' eines Tokens
            '"' if !in_quotes && current.find('=') == Some(current.len().wrapping_sub(1)) => {
                in_quotes = true;
            }
            '"' if in_quotes => {
                in_quotes = false;
            }
            ' ' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(current.clone());
                    current.clear();
                }
            }
            '\\' => {
                if let Some(&next) = chars.peek() {
                    chars.next();
                    match next {
                        's' => current.push(' '),
                        'n' => current.push('\n'),
                        '\\' => current.push('\\'),
                        '|' => current.push('|'),
                        '"' => current.push('"'),
                        other => {
                            current.push('\\');
                            current.push(other);
                        }
                    }
                } else {
                    current.push('\\');
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Kodiert einen Wert fuer die Ausgabe (Escape-Sequenzen einfuegen)
pub fn encode_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(' ', "\\s")
        .replace('\n', "\\n")
        .replace('|', "\\|")
}

/// Erstellt eine Erfolgs-Antwortzeile
pub fn ok_antwort(params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        "ok\n".to_string()
    } else {
        let kv: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, encode_value(v)))
            .collect();
        format!("ok {}\n", kv.join(" "))
    }
}

/// Erstellt die Antwortzeile fuer ein Aufrufergebnis
pub fn ergebnis_antwort(ergebnis: &Value) -> String {
    ok_antwort(&[("result", &ergebnis.to_string())])
}

/// Erstellt eine Fehler-Antwortzeile
pub fn fehler_antwort_tcp(code: u32, nachricht: &str) -> String {
    format!("error id={} msg={}\n", code, encode_value(nachricht))
}

/// Erstellt die Antwortzeile fuer einen beliebigen [`RpcFehler`].
///
/// Faults der aufgerufenen Funktion tragen ihren eigenen Code als `fault=`.
pub fn fehler_antwort(fehler: &RpcFehler) -> String {
    match fehler {
        RpcFehler::Aufruf { code, nachricht } => format!(
            "error id={} msg={} fault={}\n",
            fehler.fehler_code(),
            encode_value(nachricht),
            code
        ),
        andere => fehler_antwort_tcp(andere.fehler_code(), &andere.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_einfacher_befehl() {
        let cmd = parse_line("quit").unwrap();
        assert_eq!(cmd.name, "quit");
        assert!(cmd.params.is_empty());
    }

    #[test]
    fn parse_aufruf_mit_params() {
        let cmd = parse_line(r#"call name=summe params=[1,2,3]"#).unwrap();
        let aufruf = RpcAufruf::aus_befehl(&cmd).unwrap();
        assert_eq!(aufruf.methode, "summe");
        assert_eq!(aufruf.params, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn parse_escaped_leerzeichen_im_json() {
        let cmd = parse_line(r#"call name=echo params=["Hallo\sWelt"]"#).unwrap();
        let aufruf = RpcAufruf::aus_befehl(&cmd).unwrap();
        assert_eq!(aufruf.params, vec![json!("Hallo Welt")]);
    }

    #[test]
    fn parse_quoted_wert() {
        let cmd = parse_line(r#"call name=echo params="[\"a b\"]""#).unwrap();
        let aufruf = RpcAufruf::aus_befehl(&cmd).unwrap();
        assert_eq!(aufruf.params, vec![json!("a b")]);
    }

    #[test]
    fn methodenname_behaelt_gross_kleinschreibung() {
        let cmd = parse_line("CALL name=getStatus").unwrap();
        assert_eq!(cmd.name, "call");
        let aufruf = RpcAufruf::aus_befehl(&cmd).unwrap();
        assert_eq!(aufruf.methode, "getStatus");
        assert!(aufruf.params.is_empty());
    }

    #[test]
    fn leere_zeile_gibt_fehler() {
        assert!(parse_line("").is_err());
        assert!(parse_line("   ").is_err());
    }

    #[test]
    fn aufruf_ohne_name_gibt_fehler() {
        let cmd = parse_line("call params=[]").unwrap();
        assert!(matches!(
            RpcAufruf::aus_befehl(&cmd),
            Err(RpcFehler::Protokoll(_))
        ));
    }

    #[test]
    fn params_muss_array_sein() {
        let cmd = parse_line(r#"call name=x params={"a":1}"#).unwrap();
        assert!(RpcAufruf::aus_befehl(&cmd).is_err());

        let cmd = parse_line("call name=x params=[1,").unwrap();
        assert!(RpcAufruf::aus_befehl(&cmd).is_err());
    }

    #[test]
    fn ok_antwort_ohne_params() {
        assert_eq!(ok_antwort(&[]), "ok\n");
    }

    #[test]
    fn ergebnis_antwort_escaped_json() {
        let antwort = ergebnis_antwort(&json!("a b"));
        assert_eq!(antwort, "ok result=\\\"a\\sb\\\"\n");
    }

    #[test]
    fn fehler_antwort_format() {
        let antwort = fehler_antwort(&RpcFehler::ZugriffVerweigert("reboot".into()));
        assert_eq!(
            antwort,
            "error id=1002 msg=function\\scall\\snot\\sallowed:\\sreboot\n"
        );
    }

    #[test]
    fn fault_antwort_traegt_eigenen_code() {
        let antwort = fehler_antwort(&RpcFehler::aufruf(42, "kaputt"));
        assert_eq!(antwort, "error id=4000 msg=kaputt fault=42\n");
    }

    #[test]
    fn encode_dann_parse_ergibt_original() {
        let original = json!(["Hallo Welt\nMit Newline", "a|b", "c\\d"]);
        let zeile = format!("call name=x params={}", encode_value(&original.to_string()));
        let aufruf = RpcAufruf::aus_befehl(&parse_line(&zeile).unwrap()).unwrap();
        assert_eq!(Value::Array(aufruf.params), original);
    }
}
