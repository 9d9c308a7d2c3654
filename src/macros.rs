//! Parameterized command sequences: `define` stores a body with `{0}`,
//! `{1}`, ... placeholders and `expand` substitutes arguments in a single
//! token-level pass. Expansion is deliberately non-recursive; a placeholder
//! produced by a substitution is left alone.

use crate::error::SemanticError;
use anyhow::Result;
use anyhow::bail;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    definitions: BTreeMap<String, String>,
}

impl MacroTable {
    pub fn new() -> MacroTable {
        MacroTable::default()
    }

    pub fn define(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.definitions.insert(name.into(), body.into());
    }

    pub fn undefine(&mut self, name: &str) -> bool {
        self.definitions.remove(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(|name| name.as_str())
    }

    /// Expands a macro with positional arguments. Unreferenced arguments are
    /// legal; a placeholder with no matching argument is an error.
    pub fn expand(&self, name: &str, args: &[&str]) -> Result<String> {
        let Some(body) = self.definitions.get(name) else {
            bail!(SemanticError(format!("no macro named {name}")));
        };
        substitute(body, args)
    }
}

/// One left-to-right pass over the body replacing `{N}` placeholders.
fn substitute(body: &str, args: &[&str]) -> Result<String> {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            // Not a placeholder, keep the brace.
            out.push('{');
            rest = after_open;
            continue;
        };
        let inner = &after_open[..close];
        if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
            let position: usize = inner.parse().expect("digits parse");
            let Some(value) = args.get(position) else {
                bail!(SemanticError(format!(
                    "macro placeholder {{{position}}} has no argument"
                )));
            };
            out.push_str(value);
        } else {
            out.push('{');
            out.push_str(inner);
            out.push('}');
        }
        rest = &after_open[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_define_and_expand() {
        let mut table = MacroTable::new();
        table.define("retag", "tag delete {0}\ntag create {0} {1}");
        let expanded = table.expand("retag", &["v1", ":42"]).unwrap();
        assert_eq!(expanded, "tag delete v1\ntag create v1 :42");
    }

    #[test]
    fn test_missing_argument_errors() {
        let mut table = MacroTable::new();
        table.define("m", "{0} and {2}");
        let err = table.expand("m", &["only"]).unwrap_err();
        assert!(err.downcast_ref::<SemanticError>().is_some());
    }

    #[test]
    fn test_expansion_is_single_pass() {
        let mut table = MacroTable::new();
        table.define("m", "{0}");
        // A substitution result that looks like a placeholder stays as-is.
        assert_eq!(table.expand("m", &["{1}"]).unwrap(), "{1}");
    }

    #[test]
    fn test_non_placeholder_braces_pass_through() {
        let mut table = MacroTable::new();
        table.define("m", "filter --regex /{x}/{0}/");
        assert_eq!(
            table.expand("m", &["y"]).unwrap(),
            "filter --regex /{x}/y/"
        );
        table.define("open", "brace { alone");
        assert_eq!(table.expand("open", &[]).unwrap(), "brace { alone");
    }

    #[test]
    fn test_undefine() {
        let mut table = MacroTable::new();
        table.define("m", "body");
        assert!(table.undefine("m"));
        assert!(!table.undefine("m"));
        assert!(table.expand("m", &[]).is_err());
    }
}
