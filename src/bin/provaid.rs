use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use tabled::{Table, Tabled};
use tracing_subscriber::EnvFilter;

use provaid::progress::{StatusMessage, StepID};
use provaid::runner::{self, RunOutcome};
use provaid::{Config, Scheme};

/// Propagates data-handling obligations through the provenance graph of a
/// workflow run and reports which obligations become activated.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// The URL to the provenance service, e.g. http://127.0.0.1:3030/prov
    /// (external client required) or file:///path/to/graph.json
    url: String,
    /// The scheme the target provenance uses.
    #[arg(value_enum, default_value_t = Scheme::Cwlprov)]
    scheme: Scheme,
    /// Perform all-in-one reasoning, rather than reasoning about one
    /// component at a time.
    #[arg(long)]
    aio: bool,
    /// The databases where data rules and flow rules are stored, as JSON
    /// files. Use comma to separate multiple values; files that do not exist
    /// are ignored.
    #[arg(long = "rule-db", value_delimiter = ',', default_value = "rule-db.json")]
    rule_db: Vec<PathBuf>,
    /// Write the reasoning results into a database. Optionally specifies the
    /// location to write to; the default location is the last rule database.
    #[arg(short = 'w', long = "write", num_args = 0..=1, default_missing_value = "")]
    write: Option<PathBuf>,
    /// The obligation database path. If present, the activated obligations
    /// are stored there.
    #[arg(long = "obligation-db")]
    obligation_db: Option<PathBuf>,
    /// The purpose of this run, made visible to activation conditions.
    #[arg(long)]
    purpose: Option<String>,
    /// Treat data leaving the workflow as consumed by a virtual process with
    /// this function, so that boundary conditions can trigger.
    #[arg(long = "virtual-action")]
    virtual_action: Option<String>,
    /// Increase the verbosity of messages.
    #[arg(short = 'v', long = "verbosity", action = ArgAction::Count)]
    verbosity: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbosity);

    let write_to = match args.write {
        None => None,
        Some(path) if path.as_os_str().is_empty() => args.rule_db.last().cloned(),
        Some(path) => Some(path),
    };
    let config = Config {
        endpoint: args.url,
        scheme: args.scheme,
        all_in_one: args.aio,
        rule_db: args.rule_db,
        purpose: args.purpose,
        virtual_action: args.virtual_action,
        write_to,
        obligation_log: args.obligation_db,
    };

    let outcome = run(config)?;
    report_obligations(&outcome);
    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Executes the run in the background and shows the status to the user.
fn run(config: Config) -> anyhow::Result<RunOutcome> {
    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || runner::execute(&config, Some(tx)));

    let mut steps_progress: HashMap<StepID, f32> = HashMap::new();
    let bar = ProgressBar::new(1000);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed}] [{bar:40}] {percent}% {msg}")
    {
        bar.set_style(style);
    }

    for status_update in rx {
        match status_update {
            StatusMessage::Failed(e) => {
                bar.println(format!("[ERROR] {e}"));
            }
            StatusMessage::StepsCreated(steps) => {
                bar.println(format!("Reasoning starts with {} steps", steps.len()));
                for step in steps {
                    bar.println(format!("{step}"));
                    steps_progress.entry(step).or_default();
                }
                bar.println("");
            }
            StatusMessage::Info(msg) => {
                bar.println(msg);
            }
            StatusMessage::Warning(msg) => {
                bar.println(format!("[WARNING] {msg}"));
            }
            StatusMessage::Progress {
                id,
                total_work,
                finished_work,
            } => {
                if let Some(total_work) = total_work {
                    let progress = if total_work == 0 {
                        1.0
                    } else {
                        finished_work as f32 / total_work as f32
                    };
                    *steps_progress.entry(id.clone()).or_default() = progress;
                }
                update_bar(&bar, &steps_progress, format!("Running {id}"));
            }
            StatusMessage::StepDone { id } => {
                *steps_progress.entry(id.clone()).or_default() = 1.0;
                update_bar(&bar, &steps_progress, format!("Finished {id}"));
            }
        }
    }

    match worker.join() {
        Ok(Ok(outcome)) => {
            bar.finish_with_message("Reasoning finished");
            Ok(outcome)
        }
        Ok(Err(e)) => {
            bar.abandon_with_message("Reasoning failed");
            Err(e.into())
        }
        Err(_) => Err(anyhow!("The reasoning thread panicked")),
    }
}

fn update_bar(bar: &ProgressBar, steps_progress: &HashMap<StepID, f32>, msg: String) {
    let progress_sum: f32 = steps_progress.values().sum();
    let num_entries = steps_progress.len() as f32;
    if num_entries > 0.0 {
        let progress_percent = (progress_sum / num_entries) * 100.0;
        bar.set_position((progress_percent * 10.0) as u64);
    }
    bar.set_message(msg);
}

#[derive(Tabled)]
struct ObligationRow {
    component: String,
    obligation: String,
    attributes: String,
}

fn report_obligations(outcome: &RunOutcome) {
    let mut rows = Vec::new();
    for activated in &outcome.activated {
        for (component, obligations) in activated {
            for obligation in obligations {
                let attributes = obligation
                    .attributes
                    .iter()
                    .map(|attr| {
                        format!(
                            "{}({} {})",
                            attr.name(),
                            attr.type_tag(),
                            attr.value().as_text()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                rows.push(ObligationRow {
                    component: component.clone(),
                    obligation: obligation.action.clone(),
                    attributes,
                });
            }
        }
    }
    if rows.is_empty() {
        println!("No obligations activated.");
    } else {
        println!("{}", Table::new(rows));
    }
}
