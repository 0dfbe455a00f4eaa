//! The flow-rule interpreter: executes an action sequence as a state
//! transition over a multi-port rule store. [`FlowRuleHandler`] covers one
//! component; [`dispatch_all`] runs every component's rule over one combined
//! store ("all-in-one" mode), which must produce the same per-output
//! containers as the batch-wise driver.

use std::collections::HashMap;

use linked_hash_map::LinkedHashMap;

use crate::error::Result;
use crate::graph::GraphWrapper;
use crate::rule::{
    Action, Attribute, AttributeCapsule, AttributeValue, DataRuleContainer, FlowRule,
    ObligationDeclaration, PortedRules, RefRemap,
};

pub struct FlowRuleHandler<'a> {
    rule: &'a FlowRule,
}

impl<'a> FlowRuleHandler<'a> {
    pub fn new(rule: &'a FlowRule) -> FlowRuleHandler<'a> {
        FlowRuleHandler { rule }
    }

    /// Runs the action sequence against the per-port input containers and
    /// returns the containers observed on the rule's output ports.
    pub fn dispatch(&self, rules_in: &PortedRules) -> Result<PortedRules> {
        let mut store: LinkedHashMap<String, DataRuleContainer> = rules_in.clone();
        let mut outputs: Vec<String> = Vec::new();
        for action in self.rule.mapped_actions() {
            apply_action(&mut store, &action, &mut outputs);
        }
        Ok(collect_outputs(&store, &outputs))
    }
}

fn note_output(outputs: &mut Vec<String>, port: &str) {
    if !outputs.iter().any(|o| o == port) {
        outputs.push(port.to_string());
    }
}

fn collect_outputs(
    store: &LinkedHashMap<String, DataRuleContainer>,
    outputs: &[String],
) -> PortedRules {
    let mut rules_out = PortedRules::new();
    for port in outputs {
        if let Some(container) = store.get(port) {
            rules_out.insert(port.clone(), container.clone());
        }
    }
    rules_out
}

fn apply_action(
    store: &mut LinkedHashMap<String, DataRuleContainer>,
    action: &Action,
    outputs: &mut Vec<String>,
) {
    match action {
        Action::Propagate {
            input,
            outputs: targets,
        } => {
            for target in targets {
                note_output(outputs, target);
            }
            // an absent input store makes the whole action a no-op
            let Some(source) = store.get(input).cloned() else {
                return;
            };
            for target in targets {
                let merged = match store.get(target) {
                    Some(existing) => DataRuleContainer::merge([existing, &source]),
                    None => source.clone(),
                };
                store.insert(target.clone(), merged);
            }
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
            if let Some(output) = output {
                note_output(outputs, output);
            }
            for port in matching_ports(store, input, output) {
                if let Some(container) = store.get(&port) {
                    let edited = edit_container(
                        container,
                        name.as_deref(),
                        match_type.as_deref(),
                        match_value.as_ref(),
                        new_type,
                        new_value,
                    );
                    store.insert(port, edited);
                }
            }
        }
        Action::Delete {
            input,
            output,
            name,
            match_type,
            match_value,
        } => {
            if let Some(output) = output {
                note_output(outputs, output);
            }
            for port in matching_ports(store, input, output) {
                if let Some(container) = store.get(&port) {
                    let remaining = delete_from_container(
                        container,
                        name.as_deref(),
                        match_type.as_deref(),
                        match_value.as_ref(),
                    );
                    store.insert(port, remaining);
                }
            }
        }
    }
}

/// The stores an edit/delete applies to: the named input and/or output port
/// when concrete, every port when both are wildcards. Ports not present in
/// the store are silently skipped by the caller.
fn matching_ports(
    store: &LinkedHashMap<String, DataRuleContainer>,
    input: &Option<String>,
    output: &Option<String>,
) -> Vec<String> {
    match (input, output) {
        (None, None) => store.keys().cloned().collect(),
        _ => {
            let mut ports = Vec::new();
            if let Some(input) = input {
                ports.push(input.clone());
            }
            if let Some(output) = output {
                if !ports.contains(output) {
                    ports.push(output.clone());
                }
            }
            ports
        }
    }
}

fn attribute_matches(
    attr: &Attribute,
    name: Option<&str>,
    match_type: Option<&str>,
    match_value: Option<&AttributeValue>,
) -> bool {
    name.is_none_or(|n| n == attr.name())
        && match_type.is_none_or(|t| t == attr.type_tag())
        && match_value.is_none_or(|v| v == attr.value())
}

/// Replaces every matching attribute by one of the same name with the new
/// type and value. Indices do not shift, so references stay untouched.
fn edit_container(
    container: &DataRuleContainer,
    name: Option<&str>,
    match_type: Option<&str>,
    match_value: Option<&AttributeValue>,
    new_type: &str,
    new_value: &AttributeValue,
) -> DataRuleContainer {
    let capsules = container
        .capsules()
        .iter()
        .map(|capsule| {
            let attrs = capsule
                .iter()
                .map(|attr| {
                    if attribute_matches(attr, name, match_type, match_value) {
                        Attribute::new(attr.name(), new_type, new_value.clone())
                    } else {
                        attr.clone()
                    }
                })
                .collect();
            AttributeCapsule::new(capsule.name(), attrs)
        })
        .collect();
    DataRuleContainer::from_parts(container.obligations().to_vec(), capsules)
}

/// Removes matching attributes and re-indexes the survivors. Obligations
/// whose argument or validity references died with an attribute are dropped;
/// the references of the remaining obligations are rewritten. Emptied
/// capsules stay in place.
fn delete_from_container(
    container: &DataRuleContainer,
    name: Option<&str>,
    match_type: Option<&str>,
    match_value: Option<&AttributeValue>,
) -> DataRuleContainer {
    let mut capsules = Vec::with_capacity(container.capsules().len());
    let mut remap = RefRemap::new();
    let mut removed: HashMap<&str, Vec<usize>> = HashMap::new();
    for capsule in container.capsules() {
        let mut survivors = Vec::new();
        let mut mapping = Vec::with_capacity(capsule.len());
        let mut dead = Vec::new();
        for (index, attr) in capsule.iter().enumerate() {
            if attribute_matches(attr, name, match_type, match_value) {
                // dead indices keep a placeholder so the remap stays by-position
                mapping.push(usize::MAX);
                dead.push(index);
            } else {
                mapping.push(survivors.len());
                survivors.push(attr.clone());
            }
        }
        remap.insert(capsule.name().to_string(), mapping);
        removed.insert(capsule.name(), dead);
        capsules.push(AttributeCapsule::new(capsule.name(), survivors));
    }

    let obligations: Vec<ObligationDeclaration> = container
        .obligations()
        .iter()
        .filter(|ob| {
            ob.references().all(|r| {
                removed
                    .get(r.name.as_str())
                    .is_none_or(|dead| !dead.contains(&r.index))
            })
        })
        .map(|ob| ob.remapped(&remap))
        .collect();

    DataRuleContainer::from_parts(obligations, capsules)
}

/// Runs all flow rules of the graph over one combined store keyed by
/// graph-unique port names. Transitions between components are modelled as
/// extra propagate actions per batch. Returns the containers for every
/// output port of every flow rule.
pub fn dispatch_all(
    graph: &GraphWrapper,
    component_rules: &LinkedHashMap<String, PortedRules>,
    flow_rules: &HashMap<String, FlowRule>,
) -> Result<PortedRules> {
    let mut store: LinkedHashMap<String, DataRuleContainer> = LinkedHashMap::new();
    for ported in component_rules.values() {
        for (port, container) in ported {
            store.insert(port.clone(), container.clone());
        }
    }

    let mut actions: Vec<Action> = Vec::new();
    for batch in graph.component_batches()? {
        for component in &batch {
            if let Some(flow_rule) = flow_rules.get(component) {
                actions.extend(flow_rule.mapped_actions());
            }
        }
        for component in &batch {
            for output_port in graph.output_ports(component) {
                let from = graph.unique_name_of_port(component, output_port);
                for (to_component, to_port) in graph.downstream_ports(component, output_port) {
                    actions.push(Action::Propagate {
                        input: from.clone(),
                        outputs: vec![graph.unique_name_of_port(to_component, to_port)],
                    });
                }
            }
        }
    }

    let mut outputs: Vec<String> = Vec::new();
    for component in graph.components() {
        for output_port in graph.output_ports(component) {
            note_output(&mut outputs, &graph.unique_name_of_port(component, output_port));
        }
    }

    let mut seen_outputs: Vec<String> = Vec::new();
    for action in &actions {
        apply_action(&mut store, action, &mut seen_outputs);
    }
    Ok(collect_outputs(&store, &outputs))
}
