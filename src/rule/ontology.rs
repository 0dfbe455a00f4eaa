use std::collections::BTreeMap;

use lazy_static::lazy_static;

use crate::error::{ProvaidError, Result};

use super::attribute::escaped;

lazy_static! {
    /// Namespaces known without any configuration. Mirrors the namespace table
    /// of the provenance schemas this tool consumes.
    static ref WELL_KNOWN: BTreeMap<&'static str, &'static str> = {
        let mut m = BTreeMap::new();
        m.insert("prov", "http://www.w3.org/ns/prov#");
        m.insert("s-prov", "http://s-prov/ns/#");
        m.insert("draid", "http://draid/ns/#");
        m
    };
}

/// Maps short ontology prefixes to namespace URIs. Resolution is pure
/// namespace expansion; there is no subclass inference.
#[derive(Debug, Clone)]
pub struct PrefixTable {
    prefixes: BTreeMap<String, String>,
}

impl Default for PrefixTable {
    fn default() -> Self {
        PrefixTable {
            prefixes: WELL_KNOWN
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl PrefixTable {
    pub fn insert(&mut self, prefix: &str, namespace: &str) {
        self.prefixes
            .insert(prefix.to_string(), namespace.to_string());
    }

    pub fn expand(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }
}

/// An obligated-action name, either plain (`acknowledge`) or qualified with an
/// ontology prefix (`draid:acknowledge`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionName {
    prefix: Option<String>,
    local: String,
}

impl ActionName {
    pub fn parse(raw: &str) -> Result<ActionName> {
        let mut parts = raw.split(':');
        let first = parts.next().unwrap_or_default();
        match (parts.next(), parts.next()) {
            (None, _) => Ok(ActionName {
                prefix: None,
                local: first.to_string(),
            }),
            (Some(local), None) => Ok(ActionName {
                prefix: Some(first.to_string()),
                local: local.to_string(),
            }),
            (Some(_), Some(_)) => Err(ProvaidError::MalformedRule {
                kind: "data",
                reason: format!("action name {raw} is neither plain nor prefix:local"),
            }),
        }
    }

    /// Expands `prefix:local` through the prefix table. Plain names stay
    /// literal. An unknown prefix is an error reported to the caller.
    pub fn fully_qualified(&self, prefixes: &PrefixTable) -> Result<String> {
        match &self.prefix {
            None => Ok(self.local.clone()),
            Some(prefix) => prefixes
                .expand(prefix)
                .map(|ns| format!("{ns}{}", self.local))
                .ok_or_else(|| ProvaidError::UnknownPrefix(self.dump_raw())),
        }
    }

    fn dump_raw(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local),
            None => self.local.clone(),
        }
    }

    /// The rule-text form. Names that do not fit the identifier grammar are
    /// written as escaped strings.
    pub fn dump(&self) -> String {
        let raw = self.dump_raw();
        let plain = raw.split(':').all(is_identifier) && raw.split(':').count() <= 2;
        if plain { raw } else { escaped(&raw) }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{ActionName, PrefixTable};

    #[test]
    fn plain_name_stays_literal() {
        let name = ActionName::parse("acknowledge").unwrap();
        assert_eq!(
            name.fully_qualified(&PrefixTable::default()).unwrap(),
            "acknowledge"
        );
        assert_eq!(name.dump(), "acknowledge");
    }

    #[test]
    fn prefixed_name_expands() {
        let name = ActionName::parse("draid:acknowledge").unwrap();
        assert_eq!(
            name.fully_qualified(&PrefixTable::default()).unwrap(),
            "http://draid/ns/#acknowledge"
        );
        assert_eq!(name.dump(), "draid:acknowledge");
    }

    #[test]
    fn unknown_prefix_is_reported() {
        let name = ActionName::parse("nobody:x").unwrap();
        assert!(name.fully_qualified(&PrefixTable::default()).is_err());
    }

    #[test]
    fn configured_prefixes_extend_the_table() {
        let mut prefixes = PrefixTable::default();
        prefixes.insert("obl", "http://example.com/obligation#");
        let name = ActionName::parse("obl:erase").unwrap();
        assert_eq!(
            name.fully_qualified(&prefixes).unwrap(),
            "http://example.com/obligation#erase"
        );
    }

    #[test]
    fn uri_like_name_is_rejected() {
        assert!(ActionName::parse("http://draid/ns/#a:b").is_err());
    }

    #[test]
    fn odd_names_dump_escaped() {
        let name = ActionName::parse("hide data").unwrap();
        assert_eq!(name.dump(), "\"hide data\"");
    }
}
