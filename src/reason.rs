//! The propagation driver: pushes rule containers along the workflow DAG
//! batch by batch, merging at fan-in points, running each component's flow
//! rule and recording the obligations activated on the way.

use std::collections::HashMap;

use linked_hash_map::LinkedHashMap;
use log::{debug, warn};

use crate::dispatch::{FlowRuleHandler, dispatch_all};
use crate::error::{ProvaidError, Result};
use crate::graph::{ComponentAugmentation, GraphWrapper, virtual_port_for_import};
use crate::rule::{ActivatedObligation, Info, PortedRules, PrefixTable, Stage};

/// Activated obligations keyed by the component that triggered them.
pub type ActivatedObligations = LinkedHashMap<String, Vec<ActivatedObligation>>;

/// The contextual info an activation condition of `component` can look at.
fn component_context(graph: &GraphWrapper, component: &str) -> Info {
    let mut info = graph.graph_info().clone();
    info.extend(
        graph
            .extra_info()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    if let Some(component_info) = graph.component_info(component) {
        info.extend(component_info.parameters);
    }
    info.insert("processId".to_string(), component.to_string());
    info
}

/// Processes the given components (one topological batch): reads their merged
/// input containers, evaluates activations and runs their flow rules.
///
/// Failures of a single component are logged and skipped; the remaining
/// components are still processed.
pub fn propagate(
    graph: &GraphWrapper,
    components: &[String],
    prefixes: &PrefixTable,
) -> (Vec<ComponentAugmentation>, ActivatedObligations) {
    let mut augmentations = Vec::new();
    let mut activated = ActivatedObligations::new();
    for component in components {
        match propagate_component(graph, component, prefixes) {
            Ok((augmentation, emitted)) => {
                if let Some(augmentation) = augmentation {
                    augmentations.push(augmentation);
                }
                if !emitted.is_empty() {
                    activated
                        .entry(component.clone())
                        .or_insert_with(Vec::new)
                        .extend(emitted);
                }
            }
            Err(e) => {
                warn!("Skipping component {component}: {e}");
            }
        }
    }
    (augmentations, activated)
}

fn propagate_component(
    graph: &GraphWrapper,
    component: &str,
    prefixes: &PrefixTable,
) -> Result<(Option<ComponentAugmentation>, Vec<ActivatedObligation>)> {
    let component_info = graph
        .component_info(component)
        .ok_or_else(|| ProvaidError::IllegalCase(format!("unknown component {component}")))?;
    let function = component_info.function.as_deref();
    let info = component_context(graph, component);

    let mut input_rules = graph.get_data_rules(component);
    debug!(
        "Component {component} receives input rules from {} ports",
        input_rules.len()
    );

    let mut emitted = Vec::new();
    for container in input_rules.values() {
        emitted.extend(container.on_stage(Stage::Processing, function, &info, prefixes)?);
    }
    if let Some(imported) = graph.imported_rules(component) {
        for (vport, container) in imported {
            emitted.extend(container.on_stage(Stage::Imported, function, &info, prefixes)?);
            input_rules.insert(
                virtual_port_for_import(component, vport),
                container.clone(),
            );
        }
    }

    let flow_rule = graph.get_flow_rule(component);
    let output_rules = FlowRuleHandler::new(&flow_rule)
        .dispatch(&input_rules)
        .map_err(|e| ProvaidError::Propagation {
            component: component.to_string(),
            reason: e.to_string(),
        })?;
    let output_rules = retract_port_names(graph, component, &output_rules);
    let augmentation = if output_rules.is_empty() {
        None
    } else {
        Some(ComponentAugmentation {
            id: component.to_string(),
            rules: output_rules,
        })
    };
    Ok((augmentation, emitted))
}

/// Translates the graph-unique port names of the interpreter result back to
/// the short names used when attaching the augmentation.
fn retract_port_names(
    graph: &GraphWrapper,
    component: &str,
    ported_rules: &PortedRules,
) -> PortedRules {
    let mut retracted = PortedRules::new();
    for port in graph.output_ports(component) {
        let unique_name = graph.unique_name_of_port(component, port);
        if let Some(rule) = ported_rules.get(&unique_name) {
            retracted.insert(port.clone(), rule.clone());
        }
    }
    retracted
}

/// The initial per-component port rules (merged upstream rules plus imported
/// rules on their virtual ports), as consumed by the all-in-one mode.
pub fn obtain_rules(graph: &GraphWrapper) -> LinkedHashMap<String, PortedRules> {
    let mut component_port_rules = LinkedHashMap::new();
    for component in graph.components() {
        let mut input_rules = graph.get_data_rules(component);
        if let Some(imported) = graph.imported_rules(component) {
            for (vport, container) in imported {
                input_rules.insert(
                    virtual_port_for_import(component, vport),
                    container.clone(),
                );
            }
        }
        if !input_rules.is_empty() {
            component_port_rules.insert(component.clone(), input_rules);
        }
    }
    component_port_rules
}

/// All-in-one mode: concatenates every component's flow rule into a single
/// interpreter run. The derived output containers equal those of the
/// batch-wise walk; activations are not evaluated on this path.
pub fn reason_in_total(
    graph: &GraphWrapper,
) -> Result<(Vec<ComponentAugmentation>, ActivatedObligations)> {
    let component_port_rules = obtain_rules(graph);
    let mut component_flow_rules = HashMap::new();
    for component in graph.components() {
        component_flow_rules.insert(component.clone(), graph.get_flow_rule(component));
    }
    debug!(
        "{} components with rules, {} flow rules",
        component_port_rules.len(),
        component_flow_rules.len()
    );

    let graph_output_rules = dispatch_all(graph, &component_port_rules, &component_flow_rules)?;
    let mut augmentations = Vec::new();
    for component in graph.components() {
        let output_rules = retract_port_names(graph, component, &graph_output_rules);
        if !output_rules.is_empty() {
            augmentations.push(ComponentAugmentation {
                id: component.clone(),
                rules: output_rules,
            });
        }
    }
    Ok((augmentations, ActivatedObligations::new()))
}
