//! survey-nav CLI - Command-line interface for survey navigation
//!
//! Commands:
//! - validate: Check a task definition for authoring problems
//! - simulate: Walk a task with scripted answers and print each navigation decision
//! - next: Answer a single navigation query

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use survey_navigation::session::{next_step_json, SessionState, SessionStatus};
use survey_navigation::{NavigationError, Task, TaskSession, ENGINE_VERSION};

/// survey-nav - Task navigation and survey-rule evaluation
#[derive(Parser)]
#[command(name = "survey-nav")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Evaluate survey branching and cohort rules", long_about = None)]
struct Cli {
    /// Log navigation decisions (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a task definition for authoring problems
    Validate {
        /// Task definition file (use - for stdin)
        task: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Walk a task with scripted answers
    Simulate {
        /// Task definition file (use - for stdin)
        task: PathBuf,

        /// Answers file: {"<step>": {"<input field>": <value>}}
        #[arg(short, long)]
        answers: Option<PathBuf>,

        /// Load cohort membership from a snapshot file
        #[arg(long)]
        load_cohorts: Option<PathBuf>,

        /// Save cohort membership to a snapshot file after the run
        #[arg(long)]
        save_cohorts: Option<PathBuf>,

        /// Stop after this many steps (guards against looping tasks)
        #[arg(long, default_value = "500")]
        max_steps: usize,

        /// Output the trace as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decide the step after the current one
    Next {
        /// Task definition file (use - for stdin)
        task: PathBuf,

        /// Task result recorded so far
        #[arg(short, long)]
        result: Option<PathBuf>,

        /// Step that just ran (omit to get the first step)
        #[arg(short, long)]
        current: Option<String>,

        /// Cohort snapshot file
        #[arg(long)]
        cohorts: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .try_init();
}

fn run(cli: Cli) -> Result<(), SurveyCliError> {
    match cli.command {
        Commands::Validate { task, json } => cmd_validate(&task, json),

        Commands::Simulate {
            task,
            answers,
            load_cohorts,
            save_cohorts,
            max_steps,
            json,
        } => cmd_simulate(
            &task,
            answers.as_deref(),
            load_cohorts.as_deref(),
            save_cohorts.as_deref(),
            max_steps,
            json,
        ),

        Commands::Next {
            task,
            result,
            current,
            cohorts,
        } => cmd_next(&task, result.as_deref(), current.as_deref(), cohorts.as_deref()),
    }
}

fn read_input(path: &Path) -> Result<String, SurveyCliError> {
    if path.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            warn!("reading from an interactive terminal; end input with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn cmd_validate(path: &Path, json: bool) -> Result<(), SurveyCliError> {
    let input = read_input(path)?;
    let task: Task = serde_json::from_str(&input)?;
    let issues = task.validate();

    let report = ValidationReport {
        task: task.identifier.clone(),
        steps: count_steps(task.steps()),
        errors: issues.iter().filter(|i| !i.is_warning()).map(|i| i.to_string()).collect(),
        warnings: issues.iter().filter(|i| i.is_warning()).map(|i| i.to_string()).collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Task:     {}", report.task);
        println!("Steps:    {}", report.steps);
        println!("Errors:   {}", report.errors.len());
        println!("Warnings: {}", report.warnings.len());

        for error in &report.errors {
            println!("  - error: {}", error);
        }
        for warning in &report.warnings {
            println!("  - warning: {}", warning);
        }
    }

    if report.errors.is_empty() {
        Ok(())
    } else {
        Err(SurveyCliError::ValidationFailed(report.errors.len()))
    }
}

fn count_steps(steps: &[survey_navigation::Step]) -> usize {
    steps
        .iter()
        .map(|s| 1 + s.section_navigator().map_or(0, |n| count_steps(n.steps())))
        .sum()
}

fn cmd_simulate(
    path: &Path,
    answers: Option<&Path>,
    load_cohorts: Option<&Path>,
    save_cohorts: Option<&Path>,
    max_steps: usize,
    json: bool,
) -> Result<(), SurveyCliError> {
    let mut session = TaskSession::new(Task::from_json(&read_input(path)?)?);

    if let Some(cohorts_path) = load_cohorts {
        session.load_cohorts(&fs::read_to_string(cohorts_path)?)?;
    }

    let scripted: Map<String, Value> = match answers {
        Some(answers_path) => match serde_json::from_str(&fs::read_to_string(answers_path)?)? {
            Value::Object(map) => map,
            _ => {
                return Err(SurveyCliError::InvalidAnswers(
                    "answers file must be a JSON object keyed by step identifier".to_string(),
                ))
            }
        },
        None => Map::new(),
    };

    let mut trace: Vec<SessionState> = Vec::new();
    let mut step = session.start().map(|s| s.identifier.clone());

    while let Some(identifier) = step {
        if trace.len() >= max_steps {
            return Err(SurveyCliError::StepLimit(max_steps));
        }
        trace.push(session.state());

        let step_answers = scripted.get(&identifier).and_then(Value::as_object);
        session.record_answers(step_answers)?;
        debug!(step = %identifier, answered = step_answers.is_some(), "recorded step");

        step = session.advance().map(|s| s.identifier.clone());
    }

    if let Some(cohorts_path) = save_cohorts {
        fs::write(cohorts_path, session.save_cohorts()?)?;
    }

    let report = SimulationReport {
        task: session.task().identifier.clone(),
        status: session.status(),
        trace,
        final_cohorts: session.current_cohorts().clone(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Simulation of '{}'", report.task);
        for (index, state) in report.trace.iter().enumerate() {
            let mut location = state.section_path.clone();
            location.extend(state.current_step.clone());
            let progress = state
                .progress
                .map(|p| format!(" [{}/{}{}]", p.current, p.total, if p.is_estimated { "~" } else { "" }))
                .unwrap_or_default();
            println!(
                "{:>3}. {}{}  cohorts: {:?}",
                index + 1,
                location.join(" > "),
                progress,
                state.current_cohorts
            );
        }
        println!("Status: {:?}", report.status);
        println!("Final cohorts: {:?}", report.final_cohorts);
    }

    Ok(())
}

fn cmd_next(
    path: &Path,
    result: Option<&Path>,
    current: Option<&str>,
    cohorts: Option<&Path>,
) -> Result<(), SurveyCliError> {
    let task_json = read_input(path)?;
    let result_json = result.map(fs::read_to_string).transpose()?;
    let cohorts_json = cohorts.map(fs::read_to_string).transpose()?;

    let decision = next_step_json(
        &task_json,
        result_json.as_deref(),
        current,
        cohorts_json.as_deref(),
    )?;

    let pretty: Value = serde_json::from_str(&decision)?;
    println!("{}", serde_json::to_string_pretty(&pretty)?);
    Ok(())
}

// Error types

#[derive(Debug)]
enum SurveyCliError {
    Io(io::Error),
    Navigation(NavigationError),
    Json(serde_json::Error),
    InvalidAnswers(String),
    ValidationFailed(usize),
    StepLimit(usize),
}

impl From<io::Error> for SurveyCliError {
    fn from(e: io::Error) -> Self {
        SurveyCliError::Io(e)
    }
}

impl From<NavigationError> for SurveyCliError {
    fn from(e: NavigationError) -> Self {
        SurveyCliError::Navigation(e)
    }
}

impl From<serde_json::Error> for SurveyCliError {
    fn from(e: serde_json::Error) -> Self {
        SurveyCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<SurveyCliError> for CliError {
    fn from(e: SurveyCliError) -> Self {
        match e {
            SurveyCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            SurveyCliError::Navigation(NavigationError::InvalidTask(issues)) => CliError {
                code: "INVALID_TASK".to_string(),
                message: issues.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; "),
                hint: Some("Run 'survey-nav validate' for details".to_string()),
            },
            SurveyCliError::Navigation(NavigationError::UnknownStep(step)) => CliError {
                code: "UNKNOWN_STEP".to_string(),
                message: format!("Unknown step: {}", step),
                hint: Some("Pass a top-level step identifier with --current".to_string()),
            },
            SurveyCliError::Navigation(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure input matches the task definition format".to_string()),
            },
            SurveyCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            SurveyCliError::InvalidAnswers(msg) => CliError {
                code: "INVALID_ANSWERS".to_string(),
                message: msg,
                hint: Some("Use {\"<step>\": {\"<input field>\": <value>}}".to_string()),
            },
            SurveyCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} issue(s) found", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            SurveyCliError::StepLimit(limit) => CliError {
                code: "STEP_LIMIT".to_string(),
                message: format!("Task did not finish within {} steps", limit),
                hint: Some("Check for navigation loops or raise --max-steps".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    task: String,
    steps: usize,
    errors: Vec<String>,
    warnings: Vec<String>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    task: String,
    status: SessionStatus,
    trace: Vec<SessionState>,
    final_cohorts: BTreeSet<String>,
}
