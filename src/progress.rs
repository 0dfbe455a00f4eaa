use std::fmt::Display;
use std::sync::mpsc::Sender;

use log::{debug, info, warn};

use crate::error::{ProvaidError, Result};

/// Identifies one phase of a run, optionally scoped to a single provenance graph.
#[derive(Eq, PartialEq, Hash, Debug, Clone)]
pub struct StepID {
    pub phase: String,
    /// URI of the workflow execution graph the phase works on, if any.
    pub graph: Option<String>,
}

impl StepID {
    pub fn for_graph(phase: &str, graph: Option<&str>) -> StepID {
        StepID {
            phase: phase.to_string(),
            graph: graph.map(str::to_string),
        }
    }
}

impl Display for StepID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(graph) = &self.graph {
            write!(f, "{} ({})", self.phase, graph)
        } else {
            write!(f, "{}", self.phase)
        }
    }
}

/// Status updates are sent as single messages while a run is executed.
#[derive(Debug)]
pub enum StatusMessage {
    /// Sent once before any work starts, so listeners know all phases in advance.
    StepsCreated(Vec<StepID>),
    /// An informing message.
    Info(String),
    /// A warning message.
    Warning(String),
    /// Progress report for a single phase.
    Progress {
        id: StepID,
        /// Estimated total work units of the phase.
        total_work: Option<usize>,
        /// Number of finished work units. Should never be larger than `total_work`.
        finished_work: usize,
    },
    /// Indicates a phase has finished.
    StepDone { id: StepID },
    /// The run failed with the given error.
    Failed(ProvaidError),
}

pub type StatusSender = Sender<StatusMessage>;

/// Counts the finished work units of one run phase. The propagation engine is
/// single-threaded, so the reporter is a plain owned counter; every update is
/// forwarded to the status channel, or to the log when the caller did not
/// connect one. Dropping the reporter without [`ProgressReporter::done`]
/// leaves the phase unfinished for listeners.
pub struct ProgressReporter {
    tx: Option<StatusSender>,
    step_id: StepID,
    total_work: Option<usize>,
    finished_work: usize,
}

impl ProgressReporter {
    /// A reporter for a phase whose total amount of work is known up front.
    /// Listeners get a zero-progress update immediately, so the phase shows
    /// up before its first work unit finishes.
    pub fn with_total(
        tx: Option<StatusSender>,
        step_id: StepID,
        total_work: usize,
    ) -> Result<ProgressReporter> {
        let reporter = ProgressReporter {
            tx,
            step_id,
            total_work: Some(total_work),
            finished_work: 0,
        };
        reporter.report()?;
        Ok(reporter)
    }

    /// A reporter for a phase that cannot estimate its work in advance.
    pub fn unbounded(tx: Option<StatusSender>, step_id: StepID) -> Result<ProgressReporter> {
        let reporter = ProgressReporter {
            tx,
            step_id,
            total_work: None,
            finished_work: 0,
        };
        reporter.report()?;
        Ok(reporter)
    }

    fn report(&self) -> Result<()> {
        match &self.tx {
            Some(tx) => tx.send(StatusMessage::Progress {
                id: self.step_id.clone(),
                total_work: self.total_work,
                finished_work: self.finished_work,
            })?,
            None => match self.total_work {
                Some(total_work) => {
                    debug!("{}: {}/{total_work}", self.step_id, self.finished_work);
                }
                None => debug!("{}: {} units", self.step_id, self.finished_work),
            },
        }
        Ok(())
    }

    pub fn info(&self, msg: &str) -> Result<()> {
        match &self.tx {
            Some(tx) => tx.send(StatusMessage::Info(msg.to_string()))?,
            None => info!("{msg}"),
        }
        Ok(())
    }

    pub fn warn(&self, msg: &str) -> Result<()> {
        match &self.tx {
            Some(tx) => tx.send(StatusMessage::Warning(msg.to_string()))?,
            None => warn!("{msg}"),
        }
        Ok(())
    }

    /// Records `units` more finished work units.
    pub fn worked(&mut self, units: usize) -> Result<()> {
        self.finished_work += units;
        self.report()
    }

    /// Ends the phase. Remaining work units count as finished, so listeners
    /// always see a complete bar before the step-done notification.
    pub fn done(mut self) -> Result<()> {
        if let Some(total_work) = self.total_work {
            if self.finished_work < total_work {
                self.finished_work = total_work;
                self.report()?;
            }
        }
        match self.tx {
            Some(tx) => tx.send(StatusMessage::StepDone { id: self.step_id })?,
            None => info!("{} finished", self.step_id),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::{ProgressReporter, StatusMessage, StepID};

    #[test]
    fn reports_progress_and_completion() {
        let (tx, rx) = mpsc::channel();
        let step_id = StepID::for_graph("propagate", Some("http://example.com/graph/0"));
        let mut reporter =
            ProgressReporter::with_total(Some(tx), step_id.clone(), 3).unwrap();
        reporter.worked(1).unwrap();
        reporter.worked(1).unwrap();
        reporter.done().unwrap();

        let messages: Vec<_> = rx.into_iter().collect();
        let finished: Vec<_> = messages
            .iter()
            .filter_map(|m| match m {
                StatusMessage::Progress { finished_work, .. } => Some(*finished_work),
                _ => None,
            })
            .collect();
        // initial announcement, two work units, then the catch-up to the total
        assert_eq!(finished, vec![0, 1, 2, 3]);
        assert!(matches!(
            messages.last(),
            Some(StatusMessage::StepDone { id }) if *id == step_id
        ));
    }

    #[test]
    fn works_without_a_listener() {
        let step_id = StepID::for_graph("write_database", None);
        let mut reporter = ProgressReporter::unbounded(None, step_id).unwrap();
        reporter.worked(5).unwrap();
        reporter.info("halfway").unwrap();
        reporter.warn("slow backend").unwrap();
        reporter.done().unwrap();
    }
}
