//! Cohort navigation rules and cohort tracking
//!
//! The tracker owns the participant's cohort membership for one task run. It is
//! consulted around every committed step transition: before-rules first, then the
//! step's cohort assignment, then after-rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::NavigationError;
use crate::identifier::ReservedIdentifier;
use crate::result::TaskResult;
use crate::step::Step;

/// How the required cohorts of a rule are matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CohortRuleOperator {
    /// Every required cohort must be active
    #[default]
    All,
    /// At least one required cohort must be active
    Any,
}

/// Navigation rule gated on cohort membership
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortNavigationRule {
    #[serde(default)]
    pub required_cohorts: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "operator")]
    pub cohort_operator: Option<CohortRuleOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to_identifier: Option<String>,
}

impl CohortNavigationRule {
    pub fn new<I, S>(required_cohorts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_cohorts: required_cohorts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_operator(mut self, operator: CohortRuleOperator) -> Self {
        self.cohort_operator = Some(operator);
        self
    }

    pub fn with_skip_to(mut self, identifier: impl Into<String>) -> Self {
        self.skip_to_identifier = Some(identifier.into());
        self
    }

    pub fn operator(&self) -> CohortRuleOperator {
        self.cohort_operator.unwrap_or_default()
    }

    /// Whether the rule fires for the given membership. Rules without required cohorts never fire.
    pub fn is_satisfied_by(&self, cohorts: &BTreeSet<String>) -> bool {
        if self.required_cohorts.is_empty() {
            return false;
        }
        let matched = self
            .required_cohorts
            .iter()
            .filter(|c| cohorts.contains(*c))
            .count();
        match self.operator() {
            CohortRuleOperator::All => matched == self.required_cohorts.len(),
            CohortRuleOperator::Any => matched > 0,
        }
    }
}

/// Cohorts a step adds to and removes from the current membership
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortDelta {
    pub add: BTreeSet<String>,
    pub remove: BTreeSet<String>,
}

impl CohortDelta {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Stateful navigation participant consulted by the step navigator.
///
/// Both calls return `None` when peeking and must not change state in that case.
pub trait TrackingRule {
    /// Redirect before `step` is shown
    fn skip_to_step_identifier(
        &mut self,
        before: &Step,
        result: Option<&TaskResult>,
        is_peeking: bool,
    ) -> Option<String>;

    /// Update state after `step` ran and optionally redirect
    fn next_step_identifier(
        &mut self,
        after: Option<&Step>,
        result: Option<&TaskResult>,
        is_peeking: bool,
        config: &EngineConfig,
    ) -> Option<String>;
}

/// Tracks the participant's cohort membership for one task run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortTrackingRule {
    #[serde(default)]
    initial_cohorts: BTreeSet<String>,
    #[serde(default)]
    current_cohorts: BTreeSet<String>,
}

impl CohortTrackingRule {
    pub fn new<I, S>(initial_cohorts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let initial_cohorts: BTreeSet<String> = initial_cohorts.into_iter().map(Into::into).collect();
        Self {
            current_cohorts: initial_cohorts.clone(),
            initial_cohorts,
        }
    }

    pub fn initial_cohorts(&self) -> &BTreeSet<String> {
        &self.initial_cohorts
    }

    pub fn current_cohorts(&self) -> &BTreeSet<String> {
        &self.current_cohorts
    }

    /// Union `add` into the membership, then subtract `remove`
    pub fn apply_cohorts(&mut self, delta: &CohortDelta) {
        self.current_cohorts.extend(delta.add.iter().cloned());
        self.current_cohorts.retain(|c| !delta.remove.contains(c));
    }

    /// Evaluate cohort rules in declaration order; the first rule to fire decides.
    ///
    /// A fired rule without a skip target goes to the next step before a step and
    /// leaves the section after it.
    pub fn apply_rules(&self, rules: &[CohortNavigationRule], is_before: bool) -> Option<String> {
        let rule = rules.iter().find(|r| r.is_satisfied_by(&self.current_cohorts))?;
        let target = rule.skip_to_identifier.clone().unwrap_or_else(|| {
            if is_before {
                ReservedIdentifier::NextStep.to_string()
            } else {
                ReservedIdentifier::NextSection.to_string()
            }
        });
        debug!(
            required = ?rule.required_cohorts,
            is_before,
            target = %target,
            "cohort rule fired"
        );
        Some(target)
    }

    /// Serialize the membership so a driver can carry it between sessions
    pub fn to_json(&self) -> Result<String, NavigationError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, NavigationError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl TrackingRule for CohortTrackingRule {
    fn skip_to_step_identifier(
        &mut self,
        before: &Step,
        _result: Option<&TaskResult>,
        is_peeking: bool,
    ) -> Option<String> {
        if is_peeking || before.before_cohort_rules.is_empty() {
            return None;
        }
        self.apply_rules(&before.before_cohort_rules, true)
    }

    fn next_step_identifier(
        &mut self,
        after: Option<&Step>,
        result: Option<&TaskResult>,
        is_peeking: bool,
        config: &EngineConfig,
    ) -> Option<String> {
        if is_peeking {
            return None;
        }
        let step = after?;

        if let Some(delta) = result.and_then(|r| step.cohorts_to_apply(r, config)) {
            self.apply_cohorts(&delta);
            debug!(
                step = %step.identifier,
                add = ?delta.add,
                remove = ?delta.remove,
                current = ?self.current_cohorts,
                "applied cohorts"
            );
        }

        if step.after_cohort_rules.is_empty() {
            return None;
        }
        self.apply_rules(&step.after_cohort_rules, false)
    }
}
