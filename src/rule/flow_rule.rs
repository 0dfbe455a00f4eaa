use std::collections::HashMap;

use super::attribute::{AttributeValue, escaped};

/// One step of a flow rule. Optional fields of `Edit` and `Delete` are
/// wildcards when `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Copy (and merge) the container of the input port onto the output ports.
    Propagate { input: String, outputs: Vec<String> },
    /// Rewrite matching attributes to the new type and value, in place.
    Edit {
        new_type: String,
        new_value: AttributeValue,
        input: Option<String>,
        output: Option<String>,
        name: Option<String>,
        match_type: Option<String>,
        match_value: Option<AttributeValue>,
    },
    /// Remove matching attributes; obligations referencing them die with them.
    Delete {
        input: Option<String>,
        output: Option<String>,
        name: Option<String>,
        match_type: Option<String>,
        match_value: Option<AttributeValue>,
    },
}

impl Action {
    fn mapped(&self, name_map: &HashMap<String, String>) -> Action {
        let map = |port: &str| -> String {
            name_map
                .get(port)
                .cloned()
                .unwrap_or_else(|| port.to_string())
        };
        let map_opt = |port: &Option<String>| port.as_deref().map(map);
        match self {
            Action::Propagate { input, outputs } => Action::Propagate {
                input: map(input),
                outputs: outputs.iter().map(|o| map(o)).collect(),
            },
            Action::Edit {
                new_type,
                new_value,
                input,
                output,
                name,
                match_type,
                match_value,
            } => Action::Edit {
                new_type: new_type.clone(),
                new_value: new_value.clone(),
                input: map_opt(input),
                output: map_opt(output),
                name: name.clone(),
                match_type: match_type.clone(),
                match_value: match_value.clone(),
            },
            Action::Delete {
                input,
                output,
                name,
                match_type,
                match_value,
            } => Action::Delete {
                input: map_opt(input),
                output: map_opt(output),
                name: name.clone(),
                match_type: match_type.clone(),
                match_value: match_value.clone(),
            },
        }
    }
}

/// A component's recipe mapping per-input-port rule containers to
/// per-output-port rule containers: an ordered action sequence, optionally
/// with a name map rewriting component-internal port names to graph-unique
/// ones. The rule itself is stateless.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlowRule {
    actions: Vec<Action>,
    name_map: Option<HashMap<String, String>>,
}

impl FlowRule {
    pub fn new(actions: Vec<Action>) -> FlowRule {
        FlowRule {
            actions,
            name_map: None,
        }
    }

    pub fn set_name_map(&mut self, name_map: HashMap<String, String>) {
        self.name_map = Some(name_map);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// The actions with all port names translated through the name map.
    pub fn mapped_actions(&self) -> Vec<Action> {
        match &self.name_map {
            None => self.actions.clone(),
            Some(name_map) => self.actions.iter().map(|a| a.mapped(name_map)).collect(),
        }
    }

    /// Serializes the (unmapped) actions.
    pub fn dump(&self) -> String {
        let mut s = String::new();
        for action in &self.actions {
            match action {
                Action::Propagate { input, outputs } => {
                    let outputs = outputs.iter().map(|o| escaped(o)).collect::<Vec<_>>();
                    s.push_str(&format!("{} -> {}\n", escaped(input), outputs.join(", ")));
                }
                Action::Edit {
                    new_type,
                    new_value,
                    input,
                    output,
                    name,
                    match_type,
                    match_value,
                } => {
                    s.push_str(&format!(
                        "edit({}, {}, {}, {}, {}, {}, {})\n",
                        port_or_any(input),
                        port_or_any(output),
                        name.as_deref().unwrap_or("*"),
                        port_or_any(match_type),
                        value_or_any(match_value),
                        escaped(new_type),
                        new_value.dump(),
                    ));
                }
                Action::Delete {
                    input,
                    output,
                    name,
                    match_type,
                    match_value,
                } => {
                    s.push_str(&format!(
                        "delete({}, {}, {}, {}, {})\n",
                        port_or_any(input),
                        port_or_any(output),
                        name.as_deref().unwrap_or("*"),
                        port_or_any(match_type),
                        value_or_any(match_value),
                    ));
                }
            }
        }
        s
    }
}

fn port_or_any(port: &Option<String>) -> String {
    match port {
        Some(p) => escaped(p),
        None => "*".to_string(),
    }
}

fn value_or_any(value: &Option<AttributeValue>) -> String {
    match value {
        Some(v) => v.dump(),
        None => "*".to_string(),
    }
}

/// The flow rule assumed for components that declare none: every input port
/// propagates to every output port.
pub fn default_flow(input_ports: &[String], output_ports: &[String]) -> FlowRule {
    let actions = input_ports
        .iter()
        .map(|input| Action::Propagate {
            input: input.clone(),
            outputs: output_ports.to_vec(),
        })
        .collect();
    FlowRule::new(actions)
}
