//! Read-only wrapper around one workflow execution graph, plus the slots the
//! injection phase and the propagation driver write into: per-port and
//! per-data rule containers, per-component flow rules, imported rules and
//! activated obligations.

use std::collections::{BTreeMap, HashMap, HashSet};

use linked_hash_map::LinkedHashMap;
use log::{debug, info, warn};

use crate::error::{ProvaidError, Result};
use crate::provenance::GraphDescription;
use crate::rule::{
    ActivatedObligation, DataRuleContainer, FlowRule, PortedRules, default_flow,
};

/// Name of the synthetic input port carrying imported rules when no explicit
/// virtual port is declared.
pub const IMPORT_PORT_NAME: &str = "imported_rule";

/// Graph-wide identifier of the virtual import port of a component.
pub fn virtual_port_for_import(component: &str, vport: &str) -> String {
    format!("{component}#{vport}")
}

/// Strips a leading `<function>/` from a port name. Some provenance schemas
/// prefix port names with the component function.
pub fn trim_port_name<'a>(port_name: &'a str, function: &str) -> &'a str {
    port_name
        .strip_prefix(function)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(port_name)
}

/// Per-component facts from the provenance store.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub id: String,
    pub function: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

/// The derived output rules of one component, keyed by short port name.
#[derive(Debug, Clone)]
pub struct ComponentAugmentation {
    pub id: String,
    pub rules: PortedRules,
}

#[derive(Debug, Clone)]
struct Connection {
    from: Option<(String, String)>,
    to: Option<(String, String)>,
    data: Option<String>,
}

pub struct GraphWrapper {
    uri: Option<String>,
    streaming: bool,
    info: BTreeMap<String, String>,
    extra_info: BTreeMap<String, String>,
    components: Vec<String>,
    functions: HashMap<String, Option<String>>,
    parameters: HashMap<String, BTreeMap<String, String>>,
    input_ports: HashMap<String, Vec<String>>,
    output_ports: HashMap<String, Vec<String>>,
    connections: Vec<Connection>,
    port_rules: HashMap<String, DataRuleContainer>,
    data_rules: HashMap<String, DataRuleContainer>,
    flow_rules: HashMap<String, FlowRule>,
    imported_rules: HashMap<String, LinkedHashMap<String, DataRuleContainer>>,
    activated: LinkedHashMap<String, Vec<ActivatedObligation>>,
}

impl GraphWrapper {
    /// Builds the wrapper for a file-oriented workflow (connections carry
    /// data items).
    pub fn from_file_oriented(description: GraphDescription) -> Result<GraphWrapper> {
        GraphWrapper::new(description, false)
    }

    /// Builds the wrapper for a data-streaming workflow (rules attach to the
    /// ports themselves).
    pub fn from_streaming(description: GraphDescription) -> Result<GraphWrapper> {
        GraphWrapper::new(description, true)
    }

    fn new(description: GraphDescription, streaming: bool) -> Result<GraphWrapper> {
        let mut components = Vec::new();
        let mut functions = HashMap::new();
        let mut parameters = HashMap::new();
        let mut input_ports = HashMap::new();
        let mut output_ports = HashMap::new();
        for component in description.components {
            components.push(component.id.clone());
            functions.insert(component.id.clone(), component.function);
            parameters.insert(component.id.clone(), component.parameters);
            input_ports.insert(component.id.clone(), component.input_ports);
            output_ports.insert(component.id.clone(), component.output_ports);
        }

        let bad_ref = |what: &str| ProvaidError::LoadGraph {
            url: description.uri.clone().unwrap_or_else(|| "<graph>".to_string()),
            reason: format!("connection references unknown {what}"),
        };
        let mut connections = Vec::new();
        for connection in description.connections {
            if let Some(from) = &connection.from {
                let known = output_ports
                    .get(&from.component)
                    .is_some_and(|ports: &Vec<String>| ports.contains(&from.port));
                if !known {
                    return Err(bad_ref(&format!(
                        "output port {}#{}",
                        from.component, from.port
                    )));
                }
            }
            if let Some(to) = &connection.to {
                let known = input_ports
                    .get(&to.component)
                    .is_some_and(|ports: &Vec<String>| ports.contains(&to.port));
                if !known {
                    return Err(bad_ref(&format!(
                        "input port {}#{}",
                        to.component, to.port
                    )));
                }
            }
            connections.push(Connection {
                from: connection.from.map(|p| (p.component, p.port)),
                to: connection.to.map(|p| (p.component, p.port)),
                data: connection.data,
            });
        }

        Ok(GraphWrapper {
            uri: description.uri,
            streaming,
            info: description.info,
            extra_info: BTreeMap::new(),
            components,
            functions,
            parameters,
            input_ports,
            output_ports,
            connections,
            port_rules: HashMap::new(),
            data_rules: HashMap::new(),
            flow_rules: HashMap::new(),
            imported_rules: HashMap::new(),
            activated: LinkedHashMap::new(),
        })
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn is_data_streaming(&self) -> bool {
        self.streaming
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn component_info(&self, component: &str) -> Option<ComponentInfo> {
        if !self.components.iter().any(|c| c == component) {
            return None;
        }
        Some(ComponentInfo {
            id: component.to_string(),
            function: self.functions.get(component).cloned().flatten(),
            parameters: self
                .parameters
                .get(component)
                .cloned()
                .unwrap_or_default(),
        })
    }

    pub fn input_ports(&self, component: &str) -> &[String] {
        self.input_ports
            .get(component)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn output_ports(&self, component: &str) -> &[String] {
        self.output_ports
            .get(component)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn unique_name_of_port(&self, component: &str, port: &str) -> String {
        format!("{component}#{port}")
    }

    /// All data items, in connection enumeration order.
    pub fn data(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for connection in &self.connections {
            if let Some(data) = &connection.data {
                if seen.insert(data.as_str()) {
                    items.push(data.as_str());
                }
            }
        }
        items
    }

    /// Graph-level facts from the provenance store.
    pub fn graph_info(&self) -> &BTreeMap<String, String> {
        &self.info
    }

    /// Facts supplied by the caller rather than the store.
    pub fn extra_info(&self) -> &BTreeMap<String, String> {
        &self.extra_info
    }

    pub fn set_purpose(&mut self, purpose: &str) {
        self.extra_info
            .insert("purpose".to_string(), purpose.to_string());
    }

    /// Splits the component graph into topological batches; all components of
    /// one batch only depend on earlier batches.
    pub fn component_batches(&self) -> Result<Vec<Vec<String>>> {
        let mut dependencies: HashMap<&str, HashSet<&str>> = HashMap::new();
        for component in &self.components {
            dependencies.insert(component, HashSet::new());
        }
        for connection in &self.connections {
            if let (Some((from, _)), Some((to, _))) = (&connection.from, &connection.to) {
                if from != to {
                    if let Some(deps) = dependencies.get_mut(to.as_str()) {
                        deps.insert(from);
                    }
                }
            }
        }

        let mut batches = Vec::new();
        let mut placed: HashSet<&str> = HashSet::new();
        while placed.len() < self.components.len() {
            let batch: Vec<String> = self
                .components
                .iter()
                .filter(|c| !placed.contains(c.as_str()))
                .filter(|c| {
                    dependencies
                        .get(c.as_str())
                        .is_none_or(|deps| deps.iter().all(|d| placed.contains(d)))
                })
                .cloned()
                .collect();
            if batch.is_empty() {
                let stuck = self
                    .components
                    .iter()
                    .filter(|c| !placed.contains(c.as_str()))
                    .cloned()
                    .collect();
                return Err(ProvaidError::CyclicGraph(stuck));
            }
            for component in &batch {
                placed.insert(self.component_key(component)?);
            }
            batches.push(batch);
        }
        Ok(batches)
    }

    // Returns the graph-owned key for a component name, so that borrowed
    // bookkeeping does not outlive the wrapper.
    fn component_key(&self, component: &str) -> Result<&str> {
        self.components
            .iter()
            .map(String::as_str)
            .find(|c| *c == component)
            .ok_or_else(|| ProvaidError::IllegalCase(format!("unknown component {component}")))
    }

    /// Merged upstream rule containers for every input port of `component`,
    /// keyed by graph-unique port name. Ports without any upstream rule have
    /// no entry.
    pub fn get_data_rules(&self, component: &str) -> PortedRules {
        let mut input_rules = PortedRules::new();
        for port in self.input_ports(component) {
            let unique_name = self.unique_name_of_port(component, port);
            let mut rules: Vec<&DataRuleContainer> = Vec::new();
            for connection in &self.connections {
                match &connection.to {
                    Some((to_component, to_port))
                        if to_component == component && to_port == port => {}
                    _ => continue,
                }
                if self.streaming {
                    if let Some((from_component, from_port)) = &connection.from {
                        let from_unique = self.unique_name_of_port(from_component, from_port);
                        if let Some(rule) = self.port_rules.get(&from_unique) {
                            rules.push(rule);
                        }
                    }
                } else if let Some(data) = &connection.data {
                    if let Some(rule) = self.data_rules.get(data) {
                        rules.push(rule);
                    }
                }
            }
            if rules.is_empty() {
                info!("Component {component} :: input port {unique_name} receives no rule");
            } else {
                let merged = DataRuleContainer::merge(rules);
                debug!(
                    "Component {component} :: input port {unique_name} receives rule with {}",
                    merged.summary()
                );
                input_rules.insert(unique_name, merged);
            }
        }
        input_rules
    }

    /// The flow rule of `component` with its name map set, falling back to
    /// the default flow over all (unique-named) ports including virtual
    /// import ports.
    pub fn get_flow_rule(&self, component: &str) -> FlowRule {
        let mut flow_rule = match self.flow_rules.get(component) {
            Some(declared) => declared.clone(),
            None => {
                let mut inputs: Vec<String> = self
                    .input_ports(component)
                    .iter()
                    .map(|p| self.unique_name_of_port(component, p))
                    .collect();
                // imported rules reach the outputs unless the component
                // declares its own flow
                for vport in self.imported_vports(component) {
                    inputs.push(virtual_port_for_import(component, vport));
                }
                let outputs: Vec<String> = self
                    .output_ports(component)
                    .iter()
                    .map(|p| self.unique_name_of_port(component, p))
                    .collect();
                default_flow(&inputs, &outputs)
            }
        };

        let function = self.functions.get(component).cloned().flatten();
        let mut name_map = HashMap::new();
        for port in self
            .input_ports(component)
            .iter()
            .chain(self.output_ports(component).iter())
        {
            let unique_name = self.unique_name_of_port(component, port);
            if let Some(function) = &function {
                let short = trim_port_name(port, function);
                name_map.insert(short.to_string(), unique_name.clone());
            }
            name_map.insert(port.clone(), unique_name);
        }
        for vport in self.imported_vports(component) {
            name_map.insert(
                vport.to_string(),
                virtual_port_for_import(component, vport),
            );
        }
        flow_rule.set_name_map(name_map);
        flow_rule
    }

    fn imported_vports(&self, component: &str) -> Vec<&str> {
        self.imported_rules
            .get(component)
            .map(|rules| rules.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn set_flow_rule(&mut self, component: &str, flow_rule: FlowRule) {
        self.flow_rules.insert(component.to_string(), flow_rule);
    }

    pub fn set_imported_rules(
        &mut self,
        component: &str,
        rules: LinkedHashMap<String, DataRuleContainer>,
    ) {
        self.imported_rules.insert(component.to_string(), rules);
    }

    pub fn imported_rules(
        &self,
        component: &str,
    ) -> Option<&LinkedHashMap<String, DataRuleContainer>> {
        self.imported_rules.get(component)
    }

    pub fn attach_data_rule(&mut self, data: &str, rule: DataRuleContainer) {
        self.data_rules.insert(data.to_string(), rule);
    }

    pub fn attach_port_rule(&mut self, component: &str, port: &str, rule: DataRuleContainer) {
        let unique_name = self.unique_name_of_port(component, port);
        self.port_rules.insert(unique_name, rule);
    }

    pub fn data_rule_of_data(&self, data: &str) -> Option<&DataRuleContainer> {
        self.data_rules.get(data)
    }

    pub fn port_rule(&self, component: &str, port: &str) -> Option<&DataRuleContainer> {
        self.port_rules
            .get(&self.unique_name_of_port(component, port))
    }

    pub fn set_activated(&mut self, component: &str, obligations: Vec<ActivatedObligation>) {
        self.activated.insert(component.to_string(), obligations);
    }

    pub fn activated_obligations(&self) -> &LinkedHashMap<String, Vec<ActivatedObligation>> {
        &self.activated
    }

    /// The single data item produced at an output port, or `NotUnique` when
    /// the one-outgoing-connection assumption does not hold.
    pub fn downstream_data(&self, component: &str, port: &str) -> Result<Option<&str>> {
        let mut found: Vec<&str> = Vec::new();
        for connection in &self.connections {
            match &connection.from {
                Some((from_component, from_port))
                    if from_component == component && from_port == port => {}
                _ => continue,
            }
            if let Some(data) = &connection.data {
                if !found.contains(&data.as_str()) {
                    found.push(data);
                }
            }
        }
        match found.len() {
            0 => Ok(None),
            1 => Ok(Some(found[0])),
            count => Err(ProvaidError::NotUnique {
                what: format!("data item at output port {component}#{port}"),
                count,
            }),
        }
    }

    /// The input ports fed by an output port, as `(component, port)` pairs.
    pub fn downstream_ports(&self, component: &str, port: &str) -> Vec<(&str, &str)> {
        let mut ports = Vec::new();
        for connection in &self.connections {
            match &connection.from {
                Some((from_component, from_port))
                    if from_component == component && from_port == port => {}
                _ => continue,
            }
            if let Some((to_component, to_port)) = &connection.to {
                ports.push((to_component.as_str(), to_port.as_str()));
            }
        }
        ports
    }

    /// Appends a virtual terminal process behind every unconsumed output, so
    /// that obligations conditioned on the given boundary action (e.g.
    /// `action = "publish"`) trigger when data leaves the workflow.
    pub fn add_virtual(&mut self, action: &str) {
        let mut dangling: Vec<(String, String, Option<String>)> = Vec::new();
        if self.streaming {
            for component in &self.components {
                for port in self.output_ports(component) {
                    if self.downstream_ports(component, port).is_empty() {
                        dangling.push((component.clone(), port.clone(), None));
                    }
                }
            }
        } else {
            for connection in &self.connections {
                if connection.to.is_some() {
                    continue;
                }
                if let (Some((component, port)), Some(data)) =
                    (&connection.from, &connection.data)
                {
                    dangling.push((component.clone(), port.clone(), Some(data.clone())));
                }
            }
        }

        for (component, port, data) in dangling {
            let id = format!("{component}#{port}/{action}");
            self.components.push(id.clone());
            self.functions.insert(id.clone(), Some(action.to_string()));
            self.parameters.insert(id.clone(), BTreeMap::new());
            self.input_ports.insert(id.clone(), vec!["in".to_string()]);
            self.output_ports.insert(id.clone(), Vec::new());
            self.connections.push(Connection {
                from: Some((component, port)),
                to: Some((id, "in".to_string())),
                data,
            });
        }
    }

    /// Writes derived per-output rules back into the graph: onto the port in
    /// streaming mode, onto the produced data item otherwise. Violated graph
    /// assumptions are logged and skipped.
    pub fn apply_augmentation(&mut self, augmentations: Vec<ComponentAugmentation>) {
        for augmentation in augmentations {
            let component = augmentation.id;
            for port in self.output_ports(&component).to_vec() {
                let Some(rule) = augmentation.rules.get(&port) else {
                    warn!(
                        "Augmentation for {component} does not contain output port {port}"
                    );
                    continue;
                };
                if self.streaming {
                    self.attach_port_rule(&component, &port, rule.clone());
                } else {
                    let target = match self.downstream_data(&component, &port) {
                        Ok(Some(data)) => Some(data.to_string()),
                        Ok(None) => {
                            warn!("Output port {component}#{port} produces no data item");
                            None
                        }
                        Err(e) => {
                            warn!("Skipping output port {component}#{port}: {e}");
                            None
                        }
                    };
                    if let Some(data) = target {
                        self.attach_data_rule(&data, rule.clone());
                    }
                }
            }
        }
    }
}
