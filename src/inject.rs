//! Loading of the JSON rule databases and injection of their contents into a
//! graph: flow rules onto components, imported rules onto virtual ports, data
//! rules onto data items (directly or through cross-graph links). After a run
//! the derived rules are merged back into the database file.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use linked_hash_map::LinkedHashMap;
use log::info;
use serde_derive::Deserialize;
use serde_json::json;

use crate::error::{ProvaidError, Result};
use crate::graph::{GraphWrapper, IMPORT_PORT_NAME};
use crate::parser::{parse_data_rule, parse_flow_rule};
use crate::rule::{DataRuleContainer, FlowRule};

/// A cross-graph provenance edge: the data item `to_uri` (in `to_graph`) is
/// derived from `from_uri` (in `from_graph`). A missing graph matches any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub from_graph: Option<String>,
    pub from_uri: String,
    pub to_graph: Option<String>,
    pub to_uri: String,
}

/// Imported rules of one component, keyed by virtual port name.
pub type ImportedRuleSet = LinkedHashMap<String, DataRuleContainer>;

type GraphKey = Option<String>;

#[derive(Default)]
struct KeyedEntries<T> {
    by_uri: HashMap<String, T>,
    by_function: HashMap<String, T>,
}

/// The parsed injection tables of all loaded rule databases.
#[derive(Default)]
pub struct RuleIndex {
    data_rules: HashMap<GraphKey, HashMap<String, DataRuleContainer>>,
    imported_rules: HashMap<GraphKey, KeyedEntries<ImportedRuleSet>>,
    flow_rules: HashMap<GraphKey, KeyedEntries<FlowRule>>,
    links: Vec<Link>,
}

#[derive(Deserialize, Default)]
struct RawDatabase {
    #[serde(default)]
    data_rules: BTreeMap<String, RawSection>,
    #[serde(default)]
    imported_rules: BTreeMap<String, RawSection>,
    #[serde(default)]
    flow_rules: BTreeMap<String, RawSection>,
    #[serde(default)]
    link: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,
}

#[derive(Deserialize, Default)]
struct RawSection {
    #[serde(default)]
    uri: BTreeMap<String, RawRuleEntry>,
    #[serde(default)]
    function: BTreeMap<String, RawRuleEntry>,
}

/// A rule entry is either the rule text itself or, for imported rules, a map
/// from virtual port name to rule text.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRuleEntry {
    Text(String),
    Ported(BTreeMap<String, String>),
}

fn graph_key(raw: &str) -> GraphKey {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

// Lookup order: the graph-scoped table first, then the any-graph table.
fn scopes(graph: Option<&str>) -> Vec<GraphKey> {
    match graph {
        Some(graph) => vec![Some(graph.to_string()), None],
        None => vec![None],
    }
}

impl RuleIndex {
    /// Reads and parses all rule databases. Missing files are skipped,
    /// ill-formed ones abort startup. Entries of later databases override
    /// earlier ones with the same key.
    pub fn load(paths: &[PathBuf]) -> Result<RuleIndex> {
        let mut index = RuleIndex::default();
        for path in paths {
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!("Rule database {} does not exist, ignoring", path.display());
                    continue;
                }
                Err(e) => {
                    return Err(ProvaidError::RuleDatabase {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
            };
            let raw: RawDatabase =
                serde_json::from_str(&content).map_err(|e| ProvaidError::RuleDatabase {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            index.absorb(raw, path)?;
        }
        Ok(index)
    }

    fn absorb(&mut self, raw: RawDatabase, path: &Path) -> Result<()> {
        let db_error = |reason: String| ProvaidError::RuleDatabase {
            path: path.to_path_buf(),
            reason,
        };

        for (graph, section) in raw.data_rules {
            let table = self.data_rules.entry(graph_key(&graph)).or_default();
            for (uri, entry) in section.uri {
                let RawRuleEntry::Text(text) = entry else {
                    return Err(db_error(format!("data rule of {uri} is not a string")));
                };
                let rule = parse_data_rule(&text)
                    .map_err(|e| db_error(format!("data rule of {uri}: {e}")))?;
                table.insert(uri, rule);
            }
        }

        for (graph, section) in raw.imported_rules {
            let table = self.imported_rules.entry(graph_key(&graph)).or_default();
            for (key, entry) in section.uri {
                let rules = parse_imported_entry(&key, entry, &db_error)?;
                table.by_uri.insert(key, rules);
            }
            for (key, entry) in section.function {
                let rules = parse_imported_entry(&key, entry, &db_error)?;
                table.by_function.insert(key, rules);
            }
        }

        for (graph, section) in raw.flow_rules {
            let table = self.flow_rules.entry(graph_key(&graph)).or_default();
            for (key, entry) in section.uri {
                let RawRuleEntry::Text(text) = entry else {
                    return Err(db_error(format!("flow rule of {key} is not a string")));
                };
                let rule = parse_flow_rule(&text)
                    .map_err(|e| db_error(format!("flow rule of {key}: {e}")))?;
                table.by_uri.insert(key, rule);
            }
            for (key, entry) in section.function {
                let RawRuleEntry::Text(text) = entry else {
                    return Err(db_error(format!("flow rule of {key} is not a string")));
                };
                let rule = parse_flow_rule(&text)
                    .map_err(|e| db_error(format!("flow rule of {key}: {e}")))?;
                table.by_function.insert(key, rule);
            }
        }

        for (from_graph, from_entries) in raw.link {
            for (from_uri, to_entries) in from_entries {
                for (to_graph, to_uri) in to_entries {
                    self.links.push(Link {
                        from_graph: graph_key(&from_graph),
                        from_uri: from_uri.clone(),
                        to_graph: graph_key(&to_graph),
                        to_uri,
                    });
                }
            }
        }
        Ok(())
    }

    /// The most specific flow rule for a component: a graph-scoped entry
    /// beats a global one, a component id beats a function name.
    pub fn flow_rule(
        &self,
        graph: Option<&str>,
        component: &str,
        function: Option<&str>,
    ) -> Option<&FlowRule> {
        self.keyed_lookup(&self.flow_rules, graph, component, function)
    }

    pub fn imported_rules(
        &self,
        graph: Option<&str>,
        component: &str,
        function: Option<&str>,
    ) -> Option<&ImportedRuleSet> {
        self.keyed_lookup(&self.imported_rules, graph, component, function)
    }

    fn keyed_lookup<'a, T>(
        &'a self,
        table: &'a HashMap<GraphKey, KeyedEntries<T>>,
        graph: Option<&str>,
        component: &str,
        function: Option<&str>,
    ) -> Option<&'a T> {
        for scope in scopes(graph) {
            let Some(entries) = table.get(&scope) else {
                continue;
            };
            if let Some(found) = entries.by_uri.get(component) {
                return Some(found);
            }
            if let Some(found) = function.and_then(|f| entries.by_function.get(f)) {
                return Some(found);
            }
        }
        None
    }

    pub fn data_rule(&self, graph: Option<&str>, entity: &str) -> Option<&DataRuleContainer> {
        for scope in scopes(graph) {
            if let Some(found) = self.data_rules.get(&scope).and_then(|m| m.get(entity)) {
                return Some(found);
            }
        }
        None
    }

    /// Follows a `link` entry to the data rule of the upstream data item. An
    /// exact `to_graph` match beats the any-graph wildcard.
    pub fn rule_from_link(
        &self,
        to_graph: Option<&str>,
        to_uri: &str,
    ) -> Option<&DataRuleContainer> {
        let mut best: Option<&Link> = None;
        for link in &self.links {
            if link.to_uri != to_uri {
                continue;
            }
            match &link.to_graph {
                Some(scoped) => {
                    if Some(scoped.as_str()) == to_graph {
                        best = Some(link);
                    }
                }
                None => {
                    if best.is_none() {
                        best = Some(link);
                    }
                }
            }
        }
        let link = best?;
        self.data_rules
            .get(&link.from_graph)
            .and_then(|m| m.get(&link.from_uri))
            .or_else(|| {
                self.data_rules
                    .get(&None)
                    .and_then(|m| m.get(&link.from_uri))
            })
    }
}

fn parse_imported_entry(
    key: &str,
    entry: RawRuleEntry,
    db_error: &dyn Fn(String) -> ProvaidError,
) -> Result<ImportedRuleSet> {
    let mut rules = ImportedRuleSet::new();
    match entry {
        RawRuleEntry::Text(text) => {
            let rule = parse_data_rule(&text)
                .map_err(|e| db_error(format!("imported rule of {key}: {e}")))?;
            rules.insert(IMPORT_PORT_NAME.to_string(), rule);
        }
        RawRuleEntry::Ported(ported) => {
            for (vport, text) in ported {
                let vport = if vport.is_empty() {
                    IMPORT_PORT_NAME.to_string()
                } else {
                    vport
                };
                let rule = parse_data_rule(&text)
                    .map_err(|e| db_error(format!("imported rule of {key}:{vport}: {e}")))?;
                rules.insert(vport, rule);
            }
        }
    }
    Ok(rules)
}

/// Attaches the injected flow rules to the components of `graph`.
pub fn apply_flow_rules(graph: &mut GraphWrapper, index: &RuleIndex) {
    let graph_uri = graph.uri().map(str::to_string);
    for component in graph.components().to_vec() {
        let function = graph
            .component_info(&component)
            .and_then(|info| info.function);
        if let Some(flow_rule) =
            index.flow_rule(graph_uri.as_deref(), &component, function.as_deref())
        {
            graph.set_flow_rule(&component, flow_rule.clone());
        }
    }
}

/// Attaches the injected imported rules to the components of `graph`.
pub fn apply_imported_rules(graph: &mut GraphWrapper, index: &RuleIndex) {
    let graph_uri = graph.uri().map(str::to_string);
    for component in graph.components().to_vec() {
        let function = graph
            .component_info(&component)
            .and_then(|info| info.function);
        if let Some(rules) =
            index.imported_rules(graph_uri.as_deref(), &component, function.as_deref())
        {
            graph.set_imported_rules(&component, rules.clone());
        }
    }
}

/// Attaches the injected data rules to the data items of `graph`, consulting
/// `link` entries for items whose rules live in another graph.
pub fn apply_data_rules(graph: &mut GraphWrapper, index: &RuleIndex) {
    let graph_uri = graph.uri().map(str::to_string);
    let data_items: Vec<String> = graph.data().iter().map(|d| d.to_string()).collect();
    for data in data_items {
        let rule = index
            .data_rule(graph_uri.as_deref(), &data)
            .or_else(|| index.rule_from_link(graph_uri.as_deref(), &data));
        if let Some(rule) = rule {
            graph.attach_data_rule(&data, rule.clone());
        }
    }
}

/// Runs the complete injection phase for one graph.
pub fn apply_all(graph: &mut GraphWrapper, index: &RuleIndex) {
    apply_flow_rules(graph, index);
    apply_imported_rules(graph, index);
    apply_data_rules(graph, index);
}

/// Merges the data rules derived for `graph` into the `data_rules[""]`
/// section of the database file and rewrites it atomically. Other sections
/// and unrelated entries are preserved.
pub fn update_database(path: &Path, graph: &GraphWrapper) -> Result<()> {
    let db_error = |reason: String| ProvaidError::RuleDatabase {
        path: path.to_path_buf(),
        reason,
    };

    let mut derived = serde_json::Map::new();
    for data in graph.data() {
        if let Some(rule) = graph.data_rule_of_data(data) {
            derived.insert(data.to_string(), json!(rule.dump()));
        }
    }

    let mut db: serde_json::Value = match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map_err(|e| db_error(e.to_string()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => json!({}),
        Err(e) => return Err(db_error(e.to_string())),
    };

    let entries = db
        .as_object_mut()
        .ok_or_else(|| db_error("database root is not an object".to_string()))?
        .entry("data_rules")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| db_error("data_rules is not an object".to_string()))?
        .entry("")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| db_error("data_rules section is not an object".to_string()))?
        .entry("uri")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| db_error("uri table is not an object".to_string()))?;
    entries.extend(derived);

    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut file = match parent {
        Some(parent) => tempfile::NamedTempFile::new_in(parent)?,
        None => tempfile::NamedTempFile::new_in(".")?,
    };
    serde_json::to_writer_pretty(&mut file, &db)?;
    file.write_all(b"\n")?;
    file.persist(path)
        .map_err(|e| db_error(format!("could not replace database: {e}")))?;
    Ok(())
}
