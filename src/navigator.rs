//! Ordered conditional step navigation
//!
//! The navigator walks an ordered list of steps. Each transition asks, in order:
//! the step's own rules (survey rules, recorded skip target, static next step), and
//! the active tracking rules. The candidate step then passes through the tracking
//! before-rules and its own skip condition.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::identifier::ReservedIdentifier;
use crate::result::TaskResult;
use crate::rules::cohort::TrackingRule;
use crate::step::Step;

/// Whether a transition moves forward or returns to an answered step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepDirection {
    Forward,
    Reverse,
}

/// A navigation decision pointing at a step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavigationStep<'a> {
    pub step: &'a Step,
    pub direction: StepDirection,
}

/// Outcome of a forward navigation query
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation<'a> {
    Step(NavigationStep<'a>),
    /// Ran past the last step, or a rule asked for `nextSection`
    End,
    /// A rule named a step outside these steps; an enclosing navigator resolves it
    Unresolved(String),
    /// A rule asked to end the whole task
    Exit,
}

impl<'a> Navigation<'a> {
    pub fn step(self) -> Option<NavigationStep<'a>> {
        match self {
            Navigation::Step(step) => Some(step),
            _ => None,
        }
    }
}

/// Position within the task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    /// The total is a guess because navigation may branch
    pub is_estimated: bool,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

/// Ordered steps of a task or section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepNavigator {
    #[serde(default)]
    steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress_markers: Option<Vec<String>>,
}

impl StepNavigator {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            progress_markers: None,
        }
    }

    pub fn with_progress_markers(mut self, markers: Vec<String>) -> Self {
        self.progress_markers = Some(markers);
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn progress_markers(&self) -> Option<&[String]> {
        self.progress_markers.as_deref()
    }

    pub fn step(&self, identifier: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.identifier == identifier)
    }

    fn index_of(&self, identifier: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.identifier == identifier)
    }

    fn step_following(&self, step: &Step) -> Option<&Step> {
        let index = self.index_of(&step.identifier)?;
        self.steps.get(index + 1)
    }

    fn following(&self, step: Option<&Step>) -> Option<&Step> {
        match step {
            Some(previous) => self.step_following(previous),
            None => self.steps.first(),
        }
    }

    /// Next identifier decided by the tracking rules after `previous` ran.
    ///
    /// Tracking rules are consulted on every transition so a committed one updates
    /// their state exactly once.
    fn tracked_identifier(
        &self,
        previous: &Step,
        result: &TaskResult,
        tracking_rules: &mut [&mut dyn TrackingRule],
        is_peeking: bool,
        config: &EngineConfig,
    ) -> Option<String> {
        for rule in tracking_rules.iter_mut() {
            if let Some(target) = rule.next_step_identifier(Some(previous), Some(result), is_peeking, config) {
                return Some(target);
            }
        }
        None
    }

    /// Next identifier decided by the step that just ran, or by the tracking rules.
    /// The step's own decision takes precedence.
    fn next_identifier_after(
        &self,
        previous: &Step,
        result: &TaskResult,
        tracking_rules: &mut [&mut dyn TrackingRule],
        is_peeking: bool,
        config: &EngineConfig,
    ) -> Option<String> {
        let own = match previous.section_navigator() {
            Some(section) => section
                .exit_identifier(previous, result, is_peeking, config)
                .or_else(|| previous.next_step_identifier(Some(result), is_peeking, config)),
            None => previous.next_step_identifier(Some(result), is_peeking, config),
        };
        let tracked = self.tracked_identifier(previous, result, tracking_rules, is_peeking, config);
        own.or(tracked)
    }

    /// Navigation out of a section: the decision of the last step run inside it.
    ///
    /// `nextSection` is spent on leaving the section and never escapes it.
    fn exit_identifier(
        &self,
        section: &Step,
        parent: &TaskResult,
        is_peeking: bool,
        config: &EngineConfig,
    ) -> Option<String> {
        let inner = parent.find_section(&section.identifier)?;
        let last = inner.visited_path().last().copied()?;
        let last_step = self.step(last)?;
        let decided = match last_step.section_navigator() {
            Some(nested) => nested.exit_identifier(last_step, inner, is_peeking, config),
            None => last_step.next_step_identifier(Some(inner), is_peeking, config),
        };
        decided.filter(|target| *target != ReservedIdentifier::NextSection)
    }

    fn before_identifier(
        &self,
        candidate: &Step,
        result: &TaskResult,
        tracking_rules: &mut [&mut dyn TrackingRule],
        is_peeking: bool,
    ) -> Option<String> {
        tracking_rules
            .iter_mut()
            .find_map(|rule| rule.skip_to_step_identifier(candidate, Some(result), is_peeking))
    }

    /// Navigate forward from `step` (`None` to start).
    pub fn navigate_after(
        &self,
        step: Option<&Step>,
        result: &TaskResult,
        tracking_rules: &mut [&mut dyn TrackingRule],
        is_peeking: bool,
        config: &EngineConfig,
    ) -> Navigation<'_> {
        let decided = step.and_then(|previous| {
            self.next_identifier_after(previous, result, tracking_rules, is_peeking, config)
        });
        self.navigate_to(step, decided, result, tracking_rules, is_peeking)
    }

    /// Navigate forward after the steps of `section` have finished.
    ///
    /// `exit` is what ended the section: `None` when its steps ran out or a rule asked
    /// for `nextSection`, otherwise a target that names no step inside it. Without an
    /// exit target the section step's own rules and the tracking rules decide.
    pub fn navigate_after_section(
        &self,
        section: &Step,
        exit: Option<String>,
        result: &TaskResult,
        tracking_rules: &mut [&mut dyn TrackingRule],
        is_peeking: bool,
        config: &EngineConfig,
    ) -> Navigation<'_> {
        let own = exit.or_else(|| section.next_step_identifier(Some(result), is_peeking, config));
        let tracked = self.tracked_identifier(section, result, tracking_rules, is_peeking, config);
        self.navigate_to(Some(section), own.or(tracked), result, tracking_rules, is_peeking)
    }

    fn navigate_to(
        &self,
        step: Option<&Step>,
        decided: Option<String>,
        result: &TaskResult,
        tracking_rules: &mut [&mut dyn TrackingRule],
        is_peeking: bool,
    ) -> Navigation<'_> {
        let mut direction = StepDirection::Forward;

        let mut candidate = match decided {
            Some(target) => match ReservedIdentifier::parse(&target) {
                Some(ReservedIdentifier::Exit) => {
                    debug!(from = ?step.map(|s| s.identifier.as_str()), "exit requested");
                    return Navigation::Exit;
                }
                Some(ReservedIdentifier::NextSection) => {
                    debug!(from = ?step.map(|s| s.identifier.as_str()), "leaving section");
                    return Navigation::End;
                }
                Some(ReservedIdentifier::NextStep) => self.following(step),
                None => match self.step(&target) {
                    Some(next) => {
                        if result.find_result(&target).is_some() {
                            direction = StepDirection::Reverse;
                        }
                        debug!(target = %target, ?direction, "rule selected next step");
                        Some(next)
                    }
                    None => {
                        debug!(target = %target, "target lies outside these steps");
                        return Navigation::Unresolved(target);
                    }
                },
            },
            None => self.following(step),
        };

        let mut visited: HashSet<&str> = HashSet::new();
        while let Some(current) = candidate {
            if !visited.insert(current.identifier.as_str()) {
                warn!(step = %current.identifier, "skip rules form a cycle; showing step");
                return Navigation::Step(NavigationStep { step: current, direction });
            }

            if let Some(target) = self.before_identifier(current, result, tracking_rules, is_peeking) {
                debug!(step = %current.identifier, target = %target, "skipped before showing");
                candidate = match ReservedIdentifier::parse(&target) {
                    Some(ReservedIdentifier::NextStep) => self.step_following(current),
                    Some(ReservedIdentifier::NextSection) => return Navigation::End,
                    Some(ReservedIdentifier::Exit) => return Navigation::Exit,
                    None => match self.step(&target) {
                        Some(next) => Some(next),
                        None => return Navigation::Unresolved(target),
                    },
                };
                continue;
            }

            if current.should_skip(Some(result)) {
                debug!(step = %current.identifier, "skip condition met");
                candidate = self.step_following(current);
                continue;
            }

            return Navigation::Step(NavigationStep { step: current, direction });
        }

        Navigation::End
    }

    /// Next step to show after `step`, or `None` at the end of the steps or on exit
    pub fn step_after(
        &self,
        step: Option<&Step>,
        result: &TaskResult,
        tracking_rules: &mut [&mut dyn TrackingRule],
        config: &EngineConfig,
    ) -> Option<NavigationStep<'_>> {
        self.navigate_after(step, result, tracking_rules, false, config).step()
    }

    /// Look ahead without committing; tracking rules keep their state
    pub fn has_step_after(
        &self,
        step: Option<&Step>,
        result: &TaskResult,
        tracking_rules: &mut [&mut dyn TrackingRule],
        config: &EngineConfig,
    ) -> bool {
        matches!(
            self.navigate_after(step, result, tracking_rules, true, config),
            Navigation::Step(_)
        )
    }

    /// Whether the step's own rules end the task after it. Tracking rules are not consulted.
    pub fn should_exit(&self, step: &Step, result: &TaskResult, config: &EngineConfig) -> bool {
        matches!(
            self.next_identifier_after(step, result, &mut [], false, config),
            Some(target) if target == ReservedIdentifier::Exit
        )
    }

    /// Previous step along the visited path
    pub fn step_before(&self, step: &Step, result: &TaskResult) -> Option<&Step> {
        if !step.allows_back_navigation {
            return None;
        }
        let path = result.visited_path();
        let previous = match path.iter().position(|id| *id == step.identifier) {
            Some(0) => return None,
            Some(index) => path[index - 1],
            None => *path.last()?,
        };
        self.step(previous)
    }

    pub fn has_step_before(&self, step: &Step, result: &TaskResult) -> bool {
        self.step_before(step, result).is_some()
    }

    /// Progress of `step` within these steps
    pub fn progress(&self, step: &Step, result: Option<&TaskResult>) -> Option<Progress> {
        let history: Vec<&str> = result
            .map(|r| r.step_history.iter().map(|s| s.identifier()).collect())
            .unwrap_or_default();

        if let Some(markers) = self.progress_markers.as_deref().filter(|m| !m.is_empty()) {
            let mut visited = history.clone();
            visited.push(step.identifier.as_str());
            let index = markers
                .iter()
                .rposition(|marker| visited.contains(&marker.as_str()))?;
            let current = index + 1;
            if current == markers.len() && !markers.contains(&step.identifier) {
                return None;
            }
            return Some(Progress {
                current,
                total: markers.len(),
                is_estimated: false,
            });
        }

        let mut known: Vec<&str> = self.steps.iter().map(|s| s.identifier.as_str()).collect();
        for id in &history {
            if !known.contains(id) {
                known.push(*id);
            }
        }
        let completed = history
            .iter()
            .filter(|id| **id != step.identifier)
            .collect::<HashSet<_>>()
            .len();
        Some(Progress {
            current: completed + 1,
            total: known.len(),
            is_estimated: true,
        })
    }
}
