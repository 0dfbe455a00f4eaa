//! Orchestrates one run: load the rule databases, wrap every provenance
//! graph, inject rules, walk the DAG, write derived rules and the obligation
//! log back out.

use log::debug;

use crate::error::Result;
use crate::graph::GraphWrapper;
use crate::obligation_store::ObligationStore;
use crate::progress::{ProgressReporter, StatusMessage, StatusSender, StepID};
use crate::provenance::load_descriptions;
use crate::reason::{self, ActivatedObligations};
use crate::rule::PrefixTable;
use crate::{Config, Scheme, inject};

pub struct RunOutcome {
    pub graphs: Vec<GraphWrapper>,
    pub activated: Vec<ActivatedObligations>,
}

/// Executes a complete run as described by `config`.
///
/// * `tx` - If supported by the caller, this is a sender object that allows
///   sending status updates (information messages, warnings and progress) to
///   the calling entity.
pub fn execute(config: &Config, tx: Option<StatusSender>) -> Result<RunOutcome> {
    let index = inject::RuleIndex::load(&config.rule_db)?;
    let descriptions = load_descriptions(&config.endpoint)?;

    if let Some(tx) = &tx {
        let mut steps: Vec<StepID> = descriptions
            .iter()
            .map(|d| StepID::for_graph("propagate", d.uri.as_deref()))
            .collect();
        if config.write_to.is_some() {
            steps.push(StepID::for_graph("write_database", None));
        }
        if config.obligation_log.is_some() {
            steps.push(StepID::for_graph("write_obligation_log", None));
        }
        tx.send(StatusMessage::StepsCreated(steps))?;
    }

    let prefixes = PrefixTable::default();
    let mut graphs = Vec::new();
    let mut activated_per_graph = Vec::new();
    for description in descriptions {
        let step_id = StepID::for_graph("propagate", description.uri.as_deref());
        let mut graph = match config.scheme {
            Scheme::Sprov => GraphWrapper::from_streaming(description)?,
            Scheme::Cwlprov => GraphWrapper::from_file_oriented(description)?,
        };
        if let Some(purpose) = &config.purpose {
            graph.set_purpose(purpose);
        }
        if let Some(action) = &config.virtual_action {
            graph.add_virtual(action);
        }
        inject::apply_all(&mut graph, &index);

        let mut activated = ActivatedObligations::new();
        if config.all_in_one {
            let reporter = ProgressReporter::unbounded(tx.clone(), step_id)?;
            let (augmentations, emitted) = reason::reason_in_total(&graph)?;
            debug!("All-in-one produced {} augmentations", augmentations.len());
            graph.apply_augmentation(augmentations);
            activated = emitted;
            reporter.done()?;
        } else {
            let batches = graph.component_batches()?;
            let total: usize = batches.iter().map(Vec::len).sum();
            let mut reporter = ProgressReporter::with_total(tx.clone(), step_id, total)?;
            for batch in batches {
                let (augmentations, emitted) = reason::propagate(&graph, &batch, &prefixes);
                graph.apply_augmentation(augmentations);
                for (component, obligations) in emitted {
                    activated
                        .entry(component)
                        .or_insert_with(Vec::new)
                        .extend(obligations);
                }
                reporter.worked(batch.len())?;
            }
            reporter.done()?;
        }

        for (component, obligations) in &activated {
            graph.set_activated(component, obligations.clone());
        }
        graphs.push(graph);
        activated_per_graph.push(activated);
    }

    if let Some(write_to) = &config.write_to {
        let mut reporter = ProgressReporter::with_total(
            tx.clone(),
            StepID::for_graph("write_database", None),
            graphs.len(),
        )?;
        for graph in &graphs {
            inject::update_database(write_to, graph)?;
            reporter.worked(1)?;
        }
        reporter.done()?;
    }

    if let Some(log_path) = &config.obligation_log {
        let reporter = ProgressReporter::unbounded(
            tx.clone(),
            StepID::for_graph("write_obligation_log", None),
        )?;
        let mut store = ObligationStore::new(log_path)?;
        for activated in &activated_per_graph {
            store.insert(activated);
        }
        store.write()?;
        reporter.done()?;
    }

    Ok(RunOutcome {
        graphs,
        activated: activated_per_graph,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use crate::parser::parse_data_rule;
    use crate::{Config, Scheme};

    use super::execute;

    const GRAPH: &str = r#"{
        "uri": "http://example.com/graph/0",
        "components": [
            { "id": "A", "function": "load", "output_ports": ["a_out"] },
            { "id": "B", "function": "publish",
              "input_ports": ["b_in"], "output_ports": ["b_out"] }
        ],
        "connections": [
            { "from": { "component": "A", "port": "a_out" },
              "to": { "component": "B", "port": "b_in" },
              "data": "d0" },
            { "from": { "component": "B", "port": "b_out" }, "data": "d1" }
        ]
    }"#;

    const DB: &str = r#"{
        "data_rules": {
            "": { "uri": { "d0": "begin obligation(hide, [], action = \"publish\"). end" } }
        }
    }"#;

    fn run(all_in_one: bool) -> super::RunOutcome {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("graph.json");
        std::fs::File::create(&graph_path)
            .unwrap()
            .write_all(GRAPH.as_bytes())
            .unwrap();
        let db_path = dir.path().join("rule-db.json");
        std::fs::write(&db_path, DB).unwrap();

        let config = Config {
            endpoint: url::Url::from_file_path(&graph_path).unwrap().to_string(),
            scheme: Scheme::Cwlprov,
            all_in_one,
            rule_db: vec![db_path],
            purpose: None,
            virtual_action: None,
            write_to: None,
            obligation_log: None,
        };
        execute(&config, None).unwrap()
    }

    #[test]
    fn virtual_terminal_process_activates_boundary_obligations() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("graph.json");
        std::fs::File::create(&graph_path)
            .unwrap()
            .write_all(GRAPH.as_bytes())
            .unwrap();
        let db_path = dir.path().join("rule-db.json");
        std::fs::write(
            &db_path,
            r#"{
                "data_rules": {
                    "": { "uri": { "http://example.com/data/d0":
                        "begin obligation(notify, [], action = \"archive\"). end" } }
                }
            }"#,
        )
        .unwrap();

        let config = Config {
            endpoint: url::Url::from_file_path(&graph_path).unwrap().to_string(),
            scheme: Scheme::Cwlprov,
            all_in_one: false,
            rule_db: vec![db_path],
            purpose: None,
            virtual_action: Some("archive".to_string()),
            write_to: None,
            obligation_log: None,
        };
        let outcome = execute(&config, None).unwrap();
        // d1 dangles behind B#b_out; the virtual process consumes it with
        // function "archive" and triggers the obligation there
        let activated = &outcome.activated[0];
        let virtual_component = "B#b_out/archive";
        assert_eq!(activated.get(virtual_component).map(Vec::len), Some(1));
        assert_eq!(activated.get(virtual_component).unwrap()[0].action, "notify");
        // B itself runs under "publish" and stays silent
        assert!(activated.get("B").is_none());
    }

    #[test]
    fn batch_wise_run_activates_and_derives() {
        let outcome = run(false);
        assert_eq!(outcome.graphs.len(), 1);
        let graph = &outcome.graphs[0];
        let expected =
            parse_data_rule("begin obligation(hide, [], action = \"publish\"). end").unwrap();
        assert_eq!(graph.data_rule_of_data("d1"), Some(&expected));
        let activated = &outcome.activated[0];
        assert_eq!(activated.get("B").map(Vec::len), Some(1));
        assert_eq!(activated.get("B").unwrap()[0].action, "hide");
        // the activations are also attached to the graph for later readers
        assert_eq!(graph.activated_obligations().get("B"), activated.get("B"));
    }

    #[test]
    fn all_in_one_derives_the_same_containers() {
        let batch = run(false);
        let aio = run(true);
        assert_eq!(
            batch.graphs[0].data_rule_of_data("d1"),
            aio.graphs[0].data_rule_of_data("d1")
        );
    }
}
