//! Boundary to the provenance store. External clients (e.g. a SPARQL helper
//! for an S-Prov or CWLProv triple store) produce [`GraphDescription`] values;
//! this module only defines that interchange form and a loader for
//! `file://` endpoints carrying it as JSON.

use std::collections::BTreeMap;
use std::fs;

use serde_derive::Deserialize;
use url::Url;

use crate::error::{ProvaidError, Result};

/// One workflow execution graph as exposed by a provenance store.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphDescription {
    /// URI of the (sub)graph inside the store, if any.
    #[serde(default)]
    pub uri: Option<String>,
    /// Graph-level facts such as `startTime` or `user`.
    #[serde(default)]
    pub info: BTreeMap<String, String>,
    pub components: Vec<ComponentDescription>,
    #[serde(default)]
    pub connections: Vec<ConnectionDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentDescription {
    pub id: String,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub input_ports: Vec<String>,
    #[serde(default)]
    pub output_ports: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortRef {
    pub component: String,
    pub port: String,
}

/// A directed edge from an output port to an input port. Either end may be
/// absent for data entering or leaving the workflow. `data` names the data
/// item travelling the connection (file-oriented workflows have exactly one
/// per connection, streaming workflows none).
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionDescription {
    #[serde(default)]
    pub from: Option<PortRef>,
    #[serde(default)]
    pub to: Option<PortRef>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Box<GraphDescription>),
    Many(Vec<GraphDescription>),
}

/// Loads the graph descriptions behind `endpoint`. Only `file://` URLs are
/// served here; network schemes belong to external provenance clients.
pub fn load_descriptions(endpoint: &str) -> Result<Vec<GraphDescription>> {
    let url = Url::parse(endpoint).map_err(|e| ProvaidError::LoadGraph {
        url: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "file" {
        return Err(ProvaidError::UnsupportedEndpoint(endpoint.to_string()));
    }
    let path = url
        .to_file_path()
        .map_err(|_| ProvaidError::LoadGraph {
            url: endpoint.to_string(),
            reason: "not a valid file path".to_string(),
        })?;
    let content = fs::read_to_string(&path).map_err(|e| ProvaidError::LoadGraph {
        url: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    let parsed: OneOrMany =
        serde_json::from_str(&content).map_err(|e| ProvaidError::LoadGraph {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
    Ok(match parsed {
        OneOrMany::One(single) => vec![*single],
        OneOrMany::Many(many) => many,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::load_descriptions;

    #[test]
    fn network_endpoints_are_not_served() {
        let result = load_descriptions("http://127.0.0.1:3030/prov");
        assert!(result.is_err());
    }

    #[test]
    fn single_description_loads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "uri": "http://example.com/graph/1",
                "components": [
                    {{ "id": "c1", "function": "load", "output_ports": ["out"] }}
                ],
                "connections": [
                    {{ "from": {{ "component": "c1", "port": "out" }}, "data": "d1" }}
                ]
            }}"#
        )
        .unwrap();
        let url = url::Url::from_file_path(file.path()).unwrap();
        let graphs = load_descriptions(url.as_str()).unwrap();
        assert_eq!(graphs.len(), 1);
        assert_eq!(graphs[0].components.len(), 1);
        assert_eq!(graphs[0].connections[0].data.as_deref(), Some("d1"));
    }
}
