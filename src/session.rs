//! Task sessions
//!
//! This module provides the driver-facing API. [`next_step_json`] answers a single
//! navigation query over serialized inputs. [`TaskSession`] owns one task run (the
//! result tree and the cohort tracker) and steps through it, descending into sections.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::error::NavigationError;
use crate::navigator::{Navigation, Progress, StepDirection, StepNavigator};
use crate::result::{ResultData, TaskResult};
use crate::rules::cohort::{CohortTrackingRule, TrackingRule};
use crate::step::Step;
use crate::task::Task;

/// Result of a single navigation query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationDecision {
    pub next_step_identifier: Option<String>,
    pub direction: Option<StepDirection>,
    pub exit: bool,
    /// Cohort membership after the transition
    pub cohorts: CohortTrackingRule,
}

/// Decide the step after `current_step` at the top level of a task.
///
/// Commits the transition: the tracker applies the step's cohort assignment.
pub fn decide_next_step(
    task: &Task,
    result: &TaskResult,
    current_step: Option<&str>,
    tracker: &mut CohortTrackingRule,
) -> Result<NavigationDecision, NavigationError> {
    let previous = match current_step {
        Some(identifier) => Some(
            task.navigator
                .step(identifier)
                .ok_or_else(|| NavigationError::UnknownStep(identifier.to_string()))?,
        ),
        None => None,
    };

    let navigation = {
        let mut rules: [&mut dyn TrackingRule; 1] = [&mut *tracker];
        task.navigator
            .navigate_after(previous, result, &mut rules, false, &task.config)
    };

    let (next_step_identifier, direction) = match &navigation {
        Navigation::Step(next) => (Some(next.step.identifier.clone()), Some(next.direction)),
        Navigation::Unresolved(target) => {
            warn!(task = %task.identifier, target = %target, "navigation target does not name a step");
            (None, None)
        }
        _ => (None, None),
    };

    Ok(NavigationDecision {
        next_step_identifier,
        direction,
        exit: navigation == Navigation::Exit,
        cohorts: tracker.clone(),
    })
}

/// Answer one navigation query over JSON inputs.
///
/// # Arguments
/// * `task_json` - Task definition
/// * `result_json` - Task result recorded so far (empty result when `None`)
/// * `current_step` - Identifier of the step that just ran (`None` to start)
/// * `cohorts_json` - Cohort snapshot (the task's initial cohorts when `None`)
///
/// # Returns
/// A [`NavigationDecision`] serialized as JSON
///
/// # Example
/// ```ignore
/// let decision = next_step_json(&task_json, Some(&result_json), Some("age"), None)?;
/// ```
pub fn next_step_json(
    task_json: &str,
    result_json: Option<&str>,
    current_step: Option<&str>,
    cohorts_json: Option<&str>,
) -> Result<String, NavigationError> {
    let task = Task::from_json(task_json)?;
    let result = match result_json {
        Some(json) => serde_json::from_str(json)?,
        None => TaskResult::new(&task.identifier),
    };
    let mut tracker = match cohorts_json {
        Some(json) => CohortTrackingRule::from_json(json)?,
        None => CohortTrackingRule::new(task.initial_cohorts.iter().cloned()),
    };

    let decision = decide_next_step(&task, &result, current_step, &mut tracker)?;
    serde_json::to_string(&decision).map_err(|e| NavigationError::EncodingError(e.to_string()))
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    NotStarted,
    Running,
    Finished,
    Exited,
}

/// Serializable view of a session for drivers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub status: SessionStatus,
    pub current_step: Option<String>,
    pub section_path: Vec<String>,
    pub direction: Option<StepDirection>,
    pub current_cohorts: BTreeSet<String>,
    pub progress: Option<Progress>,
}

enum Outcome {
    Step {
        identifier: String,
        is_section: bool,
        direction: StepDirection,
    },
    /// Leave the current level, carrying a target the level could not resolve
    Leave(Option<String>),
    Exit,
}

/// Stateful driver for one task run.
///
/// The driver records a result for each step it shows, then calls [`advance`](Self::advance).
pub struct TaskSession {
    task: Task,
    result: TaskResult,
    cohorts: CohortTrackingRule,
    section_path: Vec<String>,
    current_step: Option<String>,
    direction: Option<StepDirection>,
    status: SessionStatus,
}

impl TaskSession {
    /// Create a session starting from the task's initial cohorts
    pub fn new(task: Task) -> Self {
        let cohorts = CohortTrackingRule::new(task.initial_cohorts.iter().cloned());
        Self::with_cohorts(task, cohorts)
    }

    /// Create a session with cohort membership carried over from an earlier run
    pub fn with_cohorts(task: Task, cohorts: CohortTrackingRule) -> Self {
        Self {
            result: TaskResult::new(&task.identifier),
            task,
            cohorts,
            section_path: Vec::new(),
            current_step: None,
            direction: None,
            status: SessionStatus::NotStarted,
        }
    }

    pub fn from_json(task_json: &str) -> Result<Self, NavigationError> {
        Ok(Self::new(Task::from_json(task_json)?))
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn result(&self) -> &TaskResult {
        &self.result
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn current_cohorts(&self) -> &BTreeSet<String> {
        self.cohorts.current_cohorts()
    }

    /// Identifiers of the sections the current step is nested in
    pub fn section_path(&self) -> &[String] {
        &self.section_path
    }

    /// Begin a fresh run and move to the first step. Cohort membership is kept.
    pub fn start(&mut self) -> Option<&Step> {
        self.result = TaskResult::new(&self.task.identifier);
        self.section_path.clear();
        self.current_step = None;
        self.direction = None;
        self.status = SessionStatus::Running;
        debug!(task = %self.task.identifier, run = %self.result.task_run_uuid, "started task run");
        self.advance()
    }

    pub fn current_step(&self) -> Option<&Step> {
        let navigator = navigator_at(&self.task, &self.section_path)?;
        navigator.step(self.current_step.as_deref()?)
    }

    /// Append a result to the current section's history (replacing any result with the same identifier)
    pub fn record_result(&mut self, result: impl Into<ResultData>) -> Option<ResultData> {
        let result = result.into();
        match section_result_mut(&mut self.result, &self.section_path) {
            Some(target) => target.append_step_history(result),
            None => {
                warn!(path = ?self.section_path, "missing section result; recording at task level");
                self.result.append_step_history(result)
            }
        }
    }

    /// Record scripted answers, keyed by input field identifier, for the current step
    pub fn record_answers(
        &mut self,
        answers: Option<&Map<String, Value>>,
    ) -> Result<Option<ResultData>, NavigationError> {
        let step = self
            .current_step()
            .ok_or_else(|| NavigationError::UnknownStep("no current step".to_string()))?;
        let result = step.instantiate_result(answers);
        Ok(self.record_result(result))
    }

    /// Commit the transition out of the current step and move to the next one.
    ///
    /// Returns `None` once the task has finished or exited.
    pub fn advance(&mut self) -> Option<&Step> {
        match self.status {
            SessionStatus::Finished | SessionStatus::Exited => return None,
            SessionStatus::NotStarted => self.status = SessionStatus::Running,
            SessionStatus::Running => {}
        }

        // Set once the steps of a section have finished: what ended them
        let mut leaving: Option<Option<String>> = None;
        loop {
            let exit = leaving.take();
            let outcome = {
                let (Some(navigator), Some(result)) = (
                    navigator_at(&self.task, &self.section_path),
                    section_result(&self.result, &self.section_path),
                ) else {
                    warn!(path = ?self.section_path, "section path no longer resolves");
                    self.finish(SessionStatus::Finished);
                    return None;
                };
                let previous = self.current_step.as_deref().and_then(|id| navigator.step(id));
                let mut rules: [&mut dyn TrackingRule; 1] = [&mut self.cohorts];
                let config = &self.task.config;
                let navigation = match (exit, previous) {
                    (Some(exit), Some(section)) => {
                        navigator.navigate_after_section(section, exit, result, &mut rules, false, config)
                    }
                    (_, previous) => navigator.navigate_after(previous, result, &mut rules, false, config),
                };
                match navigation {
                    Navigation::Step(next) => Outcome::Step {
                        identifier: next.step.identifier.clone(),
                        is_section: next.step.is_section(),
                        direction: next.direction,
                    },
                    Navigation::End => Outcome::Leave(None),
                    Navigation::Unresolved(target) => Outcome::Leave(Some(target)),
                    Navigation::Exit => Outcome::Exit,
                }
            };

            match outcome {
                Outcome::Exit => {
                    debug!(task = %self.task.identifier, "task exited");
                    self.finish(SessionStatus::Exited);
                    return None;
                }
                Outcome::Leave(target) => match self.section_path.pop() {
                    Some(section) => {
                        debug!(section = %section, target = ?target, "left section");
                        self.current_step = Some(section);
                        leaving = Some(target);
                    }
                    None => {
                        if let Some(target) = target {
                            warn!(task = %self.task.identifier, target = %target, "navigation target does not name a step");
                        }
                        debug!(task = %self.task.identifier, "task finished");
                        self.finish(SessionStatus::Finished);
                        return None;
                    }
                },
                Outcome::Step {
                    identifier,
                    is_section: true,
                    ..
                } => {
                    let Some(parent) = section_result_mut(&mut self.result, &self.section_path) else {
                        self.finish(SessionStatus::Finished);
                        return None;
                    };
                    if parent.find_section(&identifier).is_some() {
                        parent.node_path.push(identifier.clone());
                    } else {
                        parent.append_step_history(ResultData::Section(TaskResult::new(&identifier)));
                    }
                    debug!(section = %identifier, "entered section");
                    self.section_path.push(identifier);
                    self.current_step = None;
                }
                Outcome::Step {
                    identifier,
                    direction,
                    ..
                } => {
                    self.current_step = Some(identifier);
                    self.direction = Some(direction);
                    return self.current_step();
                }
            }
        }
    }

    /// Look ahead without committing: whether another step would be shown
    pub fn has_next(&mut self) -> bool {
        if matches!(self.status, SessionStatus::Finished | SessionStatus::Exited) {
            return false;
        }
        let mut path = self.section_path.clone();
        let mut current = self.current_step.clone();
        let mut leaving: Option<Option<String>> = None;
        loop {
            let exit = leaving.take();
            let (Some(navigator), Some(result)) =
                (navigator_at(&self.task, &path), section_result(&self.result, &path))
            else {
                return false;
            };
            let previous = current.as_deref().and_then(|id| navigator.step(id));
            let mut rules: [&mut dyn TrackingRule; 1] = [&mut self.cohorts];
            let config = &self.task.config;
            let navigation = match (exit, previous) {
                (Some(exit), Some(section)) => {
                    navigator.navigate_after_section(section, exit, result, &mut rules, true, config)
                }
                (_, previous) => navigator.navigate_after(previous, result, &mut rules, true, config),
            };
            let target = match navigation {
                Navigation::Step(_) => return true,
                Navigation::Exit => return false,
                Navigation::End => None,
                Navigation::Unresolved(target) => Some(target),
            };
            match path.pop() {
                Some(section) => {
                    current = Some(section);
                    leaving = Some(target);
                }
                None => return false,
            }
        }
    }

    /// Move to the previous step along the visited path, within the current section
    pub fn back(&mut self) -> Option<&Step> {
        let previous = {
            let navigator = navigator_at(&self.task, &self.section_path)?;
            let result = section_result(&self.result, &self.section_path)?;
            let current = navigator.step(self.current_step.as_deref()?)?;
            navigator.step_before(current, result)?.identifier.clone()
        };
        self.current_step = Some(previous);
        self.direction = Some(StepDirection::Reverse);

        // A section is re-entered at the last step it showed
        while let Some(section) = self.current_step().filter(|s| s.is_section()).map(|s| s.identifier.clone()) {
            let mut inner_path = self.section_path.clone();
            inner_path.push(section);
            let Some(last) = section_result(&self.result, &inner_path)
                .and_then(|r| r.visited_path().last().map(|id| id.to_string()))
            else {
                break;
            };
            self.section_path = inner_path;
            self.current_step = Some(last);
        }

        if self.status != SessionStatus::Running {
            self.status = SessionStatus::Running;
        }
        self.current_step()
    }

    pub fn progress(&self) -> Option<Progress> {
        let navigator = navigator_at(&self.task, &self.section_path)?;
        let step = navigator.step(self.current_step.as_deref()?)?;
        navigator.progress(step, section_result(&self.result, &self.section_path))
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            status: self.status,
            current_step: self.current_step.clone(),
            section_path: self.section_path.clone(),
            direction: self.direction,
            current_cohorts: self.cohorts.current_cohorts().clone(),
            progress: self.progress(),
        }
    }

    /// Load cohort membership from JSON
    pub fn load_cohorts(&mut self, json: &str) -> Result<(), NavigationError> {
        self.cohorts =
            CohortTrackingRule::from_json(json).map_err(|e| NavigationError::ParseError(e.to_string()))?;
        Ok(())
    }

    /// Save cohort membership to JSON
    pub fn save_cohorts(&self) -> Result<String, NavigationError> {
        self.cohorts
            .to_json()
            .map_err(|e| NavigationError::EncodingError(e.to_string()))
    }

    fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.section_path.clear();
        self.current_step = None;
        self.direction = None;
    }
}

fn navigator_at<'a>(task: &'a Task, path: &[String]) -> Option<&'a StepNavigator> {
    let mut navigator = &task.navigator;
    for identifier in path {
        navigator = navigator.step(identifier)?.section_navigator()?;
    }
    Some(navigator)
}

fn section_result<'a>(root: &'a TaskResult, path: &[String]) -> Option<&'a TaskResult> {
    let mut current = root;
    for identifier in path {
        current = current.find_section(identifier)?;
    }
    Some(current)
}

fn section_result_mut<'a>(root: &'a mut TaskResult, path: &[String]) -> Option<&'a mut TaskResult> {
    let mut current = root;
    for identifier in path {
        current = current.find_section_mut(identifier)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::AnswerType;
    use crate::result::StepResult;
    use crate::rules::cohort::{CohortNavigationRule, CohortRuleOperator};
    use crate::rules::survey::{SurveyRule, SurveyRuleOperator};
    use crate::step::InputField;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn smoking_task() -> Task {
        Task::new(
            "smoking",
            vec![
                Step::instruction("intro"),
                Step::form(
                    "smokes",
                    vec![InputField::new("smokes", AnswerType::Boolean).with_rules(vec![
                        SurveyRule::new(SurveyRuleOperator::Equal)
                            .with_matching_answer(json!(true))
                            .with_cohort("smoker"),
                        SurveyRule::new(SurveyRuleOperator::Skip).with_skip_to("exit"),
                    ])],
                ),
                Step::section(
                    "habits",
                    vec![
                        Step::form("packs", vec![InputField::new("packs", AnswerType::Integer)]),
                        Step::instruction("quitting"),
                    ],
                )
                .with_before_cohort_rules(vec![
                    CohortNavigationRule::new(["nonSmoker", "smoker"]).with_skip_to("nextStep"),
                ]),
                Step::instruction("done").with_after_cohort_rules(vec![
                    CohortNavigationRule::new(["smoker"]).with_operator(CohortRuleOperator::Any),
                ]),
            ],
        )
        .with_initial_cohorts(["nonSmoker"])
    }

    fn walk(session: &mut TaskSession, answers: &[(&str, Value)]) -> Vec<String> {
        let mut visited = Vec::new();
        let mut step = session.start().map(|s| s.identifier.clone());
        while let Some(identifier) = step {
            let scripted = answers.iter().find(|(id, _)| *id == identifier).map(|(_, v)| v.clone());
            session
                .record_answers(scripted.as_ref().and_then(Value::as_object))
                .unwrap();
            visited.push(identifier);
            step = session.advance().map(|s| s.identifier.clone());
        }
        visited
    }

    #[test]
    fn test_walk_with_section_and_cohorts() {
        let mut session = TaskSession::with_cohorts(smoking_task(), CohortTrackingRule::default());
        let visited = walk(&mut session, &[("smokes", json!({"smokes": true}))]);

        assert_eq!(visited, vec!["intro", "smokes", "packs", "quitting", "done"]);
        assert_eq!(session.status(), SessionStatus::Finished);
        assert_eq!(session.current_cohorts(), &BTreeSet::from(["smoker".to_string()]));
        assert!(session.result().find_section("habits").is_some());
    }

    #[test]
    fn test_before_rule_skips_section() {
        // Both cohorts present: the section is skipped
        let task = smoking_task();
        let mut session = TaskSession::new(task);
        let visited = walk(&mut session, &[("smokes", json!({"smokes": true}))]);

        assert_eq!(visited, vec!["intro", "smokes", "done"]);
        assert_eq!(
            session.current_cohorts(),
            &BTreeSet::from(["nonSmoker".to_string(), "smoker".to_string()])
        );
    }

    #[test]
    fn test_skip_rule_exits_task() {
        let mut session = TaskSession::new(smoking_task());
        let visited = walk(&mut session, &[]);

        assert_eq!(visited, vec!["intro", "smokes"]);
        assert_eq!(session.status(), SessionStatus::Exited);
        assert!(session.advance().is_none());
        assert!(!session.has_next());
    }

    #[test]
    fn test_skip_rule_leaves_only_its_section() {
        let task = Task::new(
            "sections",
            vec![
                Step::section(
                    "sectionA",
                    vec![
                        Step::form(
                            "q1",
                            vec![InputField::new("q1", AnswerType::Boolean)
                                .with_rules(vec![SurveyRule::new(SurveyRuleOperator::Skip)])],
                        ),
                        Step::instruction("a2"),
                    ],
                ),
                Step::section("sectionB", vec![Step::instruction("b1")]),
                Step::instruction("done"),
            ],
        );
        assert!(task.validate().is_empty());

        let mut session = TaskSession::new(task);
        let visited = walk(&mut session, &[]);

        assert_eq!(visited, vec!["q1", "b1", "done"]);
        assert_eq!(session.status(), SessionStatus::Finished);
    }

    #[test]
    fn test_after_rule_default_leaves_section() {
        let task = Task::new(
            "sections",
            vec![
                Step::section(
                    "part1",
                    vec![
                        Step::instruction("inner1")
                            .with_after_cohort_rules(vec![CohortNavigationRule::new(["x"])]),
                        Step::instruction("inner2"),
                    ],
                ),
                Step::instruction("part2"),
            ],
        )
        .with_initial_cohorts(["x"]);

        let mut session = TaskSession::new(task);
        assert_eq!(walk(&mut session, &[]), vec!["inner1", "part2"]);
    }

    #[test]
    fn test_cohort_rule_jumps_out_of_section() {
        let task = Task::new(
            "sections",
            vec![
                Step::section(
                    "sectionA",
                    vec![
                        Step::instruction("inner1").with_after_cohort_rules(vec![
                            CohortNavigationRule::new(["x"]).with_skip_to("outro"),
                        ]),
                        Step::instruction("inner2"),
                    ],
                ),
                Step::instruction("part2"),
                Step::instruction("outro"),
            ],
        )
        .with_initial_cohorts(["x"]);
        assert!(task.validate().is_empty());

        let mut session = TaskSession::new(task);
        session.start();
        session.record_result(StepResult::new("inner1"));
        assert!(session.has_next());
        assert_eq!(session.current_step().map(|s| s.identifier.as_str()), Some("inner1"));

        assert_eq!(session.advance().map(|s| s.identifier.as_str()), Some("outro"));
        assert!(session.section_path().is_empty());
    }

    #[test]
    fn test_outer_targets_from_nested_sections() {
        let task = Task::new(
            "nested",
            vec![
                Step::section(
                    "outer",
                    vec![
                        Step::section(
                            "inner",
                            vec![
                                Step::form(
                                    "q",
                                    vec![InputField::new("q", AnswerType::Boolean).with_rules(vec![
                                        SurveyRule::new(SurveyRuleOperator::Equal)
                                            .with_matching_answer(json!(true))
                                            .with_skip_to("done"),
                                    ])],
                                ),
                                Step::instruction("afterQ"),
                            ],
                        ),
                        Step::instruction("outerTail").with_before_cohort_rules(vec![
                            CohortNavigationRule::new(["x"]).with_skip_to("done"),
                        ]),
                        Step::instruction("outerEnd"),
                    ],
                ),
                Step::instruction("middle"),
                Step::instruction("done"),
            ],
        );
        assert!(task.validate().is_empty());

        let mut jumping = TaskSession::new(task.clone());
        assert_eq!(walk(&mut jumping, &[("q", json!({"q": true}))]), vec!["q", "done"]);

        let mut before_rule = TaskSession::new(task.with_initial_cohorts(["x"]));
        assert_eq!(
            walk(&mut before_rule, &[("q", json!({"q": false}))]),
            vec!["q", "afterQ", "done"]
        );
    }

    #[test]
    fn test_has_next_does_not_mutate() {
        let mut session = TaskSession::with_cohorts(smoking_task(), CohortTrackingRule::default());
        session.start();
        session.advance();
        session.record_answers(json!({"smokes": true}).as_object()).unwrap();

        assert!(session.has_next());
        assert!(session.current_cohorts().is_empty());

        assert_eq!(session.advance().map(|s| s.identifier.as_str()), Some("packs"));
        assert_eq!(session.section_path(), ["habits".to_string()]);
        assert!(session.current_cohorts().contains("smoker"));
    }

    #[test]
    fn test_back_navigation() {
        let mut session = TaskSession::with_cohorts(smoking_task(), CohortTrackingRule::default());
        session.start();
        session.record_result(StepResult::new("intro"));
        session.advance();
        session.record_answers(json!({"smokes": true}).as_object()).unwrap();
        session.advance();
        session.record_answers(json!({"packs": 2}).as_object()).unwrap();
        session.advance();
        session.record_result(StepResult::new("quitting"));
        session.advance();

        assert_eq!(session.current_step().map(|s| s.identifier.as_str()), Some("done"));
        // Back into the section at the last step it showed
        assert_eq!(session.back().map(|s| s.identifier.as_str()), Some("quitting"));
        assert_eq!(session.section_path(), ["habits".to_string()]);
        assert_eq!(session.back().map(|s| s.identifier.as_str()), Some("packs"));
        assert_eq!(session.state().direction, Some(StepDirection::Reverse));
    }

    #[test]
    fn test_record_replaces_answer() {
        let mut session = TaskSession::new(smoking_task());
        session.start();
        session.advance();
        session.record_answers(json!({"smokes": false}).as_object()).unwrap();
        let replaced = session.record_answers(json!({"smokes": true}).as_object()).unwrap();

        assert!(replaced.is_some());
        assert_eq!(session.result().step_history.len(), 1);
        assert_eq!(
            crate::result::AnswerResultFinder::find_answer_result(session.result(), "smokes")
                .and_then(|a| a.value()),
            Some(&json!(true))
        );
    }

    #[test]
    fn test_progress_and_state() {
        let mut session = TaskSession::new(smoking_task());
        session.start();
        session.record_result(StepResult::new("intro"));
        session.advance();

        let state = session.state();
        assert_eq!(state.status, SessionStatus::Running);
        assert_eq!(state.current_step.as_deref(), Some("smokes"));
        assert_eq!(
            state.progress,
            Some(Progress {
                current: 2,
                total: 4,
                is_estimated: true
            })
        );
    }

    #[test]
    fn test_cohort_snapshot() {
        let mut session = TaskSession::new(smoking_task());
        let saved = session.save_cohorts().unwrap();
        assert_eq!(saved, r#"{"initialCohorts":["nonSmoker"],"currentCohorts":["nonSmoker"]}"#);

        session
            .load_cohorts(r#"{"initialCohorts":[],"currentCohorts":["smoker"]}"#)
            .unwrap();
        assert_eq!(session.current_cohorts(), &BTreeSet::from(["smoker".to_string()]));
        assert!(session.load_cohorts("not json").is_err());
    }

    #[test]
    fn test_next_step_json() {
        let task_json = smoking_task().to_json().unwrap();
        let mut result = TaskResult::new("smoking");
        result.append_step_history(StepResult::new("intro"));
        let result_json = serde_json::to_string(&result).unwrap();

        let decision: NavigationDecision =
            serde_json::from_str(&next_step_json(&task_json, Some(&result_json), Some("intro"), None).unwrap())
                .unwrap();
        assert_eq!(decision.next_step_identifier.as_deref(), Some("smokes"));
        assert!(!decision.exit);

        let start: NavigationDecision =
            serde_json::from_str(&next_step_json(&task_json, None, None, None).unwrap()).unwrap();
        assert_eq!(start.next_step_identifier.as_deref(), Some("intro"));

        assert!(matches!(
            next_step_json(&task_json, None, Some("missing"), None),
            Err(NavigationError::UnknownStep(_))
        ));
    }
}
