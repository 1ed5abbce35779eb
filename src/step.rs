//! Step definitions
//!
//! Steps are a closed set of kinds. Capabilities that drive navigation (survey rules
//! on input fields, cohort rules, skip conditions) are plain optional fields, so the
//! navigator pattern-matches instead of probing for them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::answer::AnswerType;
use crate::config::{ConflictPolicy, EngineConfig};
use crate::navigator::StepNavigator;
use crate::result::{AnswerResult, AnswerResultFinder, CollectionResult, ResultData, StepResult, TaskResult};
use crate::rules::cohort::{CohortDelta, CohortNavigationRule};
use crate::rules::survey::SurveyRule;

/// One question of a form step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputField {
    pub identifier: String,
    pub answer_type: AnswerType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub survey_rules: Vec<SurveyRule>,
}

impl InputField {
    pub fn new(identifier: impl Into<String>, answer_type: AnswerType) -> Self {
        Self {
            identifier: identifier.into(),
            answer_type,
            survey_rules: Vec::new(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<SurveyRule>) -> Self {
        self.survey_rules = rules;
        self
    }
}

/// What a step shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepKind {
    /// Informational screen without answers
    Instruction,
    /// Question step with one or more input fields
    #[serde(rename_all = "camelCase")]
    Form {
        #[serde(default)]
        input_fields: Vec<InputField>,
    },
    /// Nested ordered steps
    Section(StepNavigator),
}

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// A unit of task execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub identifier: String,
    #[serde(flatten)]
    pub kind: StepKind,
    /// Static navigation target used when no rule decides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_identifier: Option<String>,
    /// Target used when there is no result yet, or when every answer is null
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to_if_nil: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before_cohort_rules: Vec<CohortNavigationRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after_cohort_rules: Vec<CohortNavigationRule>,
    /// Skip the step while this answer is missing or null
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_if_missing: Option<String>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub allows_back_navigation: bool,
}

impl Step {
    fn with_kind(identifier: impl Into<String>, kind: StepKind) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            next_step_identifier: None,
            skip_to_if_nil: None,
            before_cohort_rules: Vec::new(),
            after_cohort_rules: Vec::new(),
            skip_if_missing: None,
            allows_back_navigation: true,
        }
    }

    pub fn instruction(identifier: impl Into<String>) -> Self {
        Self::with_kind(identifier, StepKind::Instruction)
    }

    pub fn form(identifier: impl Into<String>, input_fields: Vec<InputField>) -> Self {
        Self::with_kind(identifier, StepKind::Form { input_fields })
    }

    pub fn section(identifier: impl Into<String>, steps: Vec<Step>) -> Self {
        Self::with_kind(identifier, StepKind::Section(StepNavigator::new(steps)))
    }

    pub fn with_next_step(mut self, identifier: impl Into<String>) -> Self {
        self.next_step_identifier = Some(identifier.into());
        self
    }

    pub fn with_skip_to_if_nil(mut self, identifier: impl Into<String>) -> Self {
        self.skip_to_if_nil = Some(identifier.into());
        self
    }

    pub fn with_before_cohort_rules(mut self, rules: Vec<CohortNavigationRule>) -> Self {
        self.before_cohort_rules = rules;
        self
    }

    pub fn with_after_cohort_rules(mut self, rules: Vec<CohortNavigationRule>) -> Self {
        self.after_cohort_rules = rules;
        self
    }

    pub fn with_skip_if_missing(mut self, identifier: impl Into<String>) -> Self {
        self.skip_if_missing = Some(identifier.into());
        self
    }

    pub fn without_back_navigation(mut self) -> Self {
        self.allows_back_navigation = false;
        self
    }

    pub fn input_fields(&self) -> &[InputField] {
        match &self.kind {
            StepKind::Form { input_fields } => input_fields,
            _ => &[],
        }
    }

    pub fn section_navigator(&self) -> Option<&StepNavigator> {
        match &self.kind {
            StepKind::Section(navigator) => Some(navigator),
            _ => None,
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self.kind, StepKind::Section(_))
    }

    /// Answer for one of this step's fields, preferring the step's own result over the
    /// rest of the task result
    fn answer_for<'r>(&self, field: &InputField, result: &'r TaskResult) -> Option<&'r AnswerResult> {
        result
            .find_result(&self.identifier)
            .and_then(|own| own.find_answer_result(&field.identifier))
            .or_else(|| result.find_answer_result(&field.identifier))
    }

    /// Survey-rule navigation decision for this step.
    ///
    /// Peeking never decides. Without any result the `skip_to_if_nil` fallback applies.
    /// A single distinct target wins; with no target or conflicting targets the
    /// fallback applies only when every answer was null.
    pub fn evaluate_survey_rules(
        &self,
        result: Option<&TaskResult>,
        is_peeking: bool,
        config: &EngineConfig,
    ) -> Option<String> {
        if is_peeking {
            return None;
        }
        let Some(result) = result else {
            return self.skip_to_if_nil.clone();
        };

        let mut all_answers_nil = true;
        let mut targets: Vec<String> = Vec::new();

        for field in self.input_fields() {
            let answer = self.answer_for(field, result);
            if answer.and_then(|a| a.value()).is_some() {
                all_answers_nil = false;
            }
            for rule in &field.survey_rules {
                if let Some(target) = rule.evaluate(answer, config) {
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
        }

        if targets.len() > 1 {
            debug!(step = %self.identifier, targets = ?targets, policy = ?config.conflict_policy, "conflicting survey rule targets");
            if config.conflict_policy == ConflictPolicy::FirstMatch {
                return targets.into_iter().next();
            }
        }

        if targets.len() == 1 {
            return targets.pop();
        }
        if all_answers_nil {
            self.skip_to_if_nil.clone()
        } else {
            None
        }
    }

    /// Cohorts added and removed by the survey rules that name a cohort
    pub fn cohorts_to_apply(&self, result: &TaskResult, config: &EngineConfig) -> Option<CohortDelta> {
        let mut delta = CohortDelta::default();
        for field in self.input_fields() {
            let answer = self.answer_for(field, result);
            for rule in &field.survey_rules {
                let Some(cohort) = &rule.cohort else {
                    continue;
                };
                if rule.matches(answer, config) {
                    delta.add.insert(cohort.clone());
                } else {
                    delta.remove.insert(cohort.clone());
                }
            }
        }
        if delta.is_empty() {
            None
        } else {
            Some(delta)
        }
    }

    /// The step's own navigation decision: survey rules, then a skip target recorded on
    /// its result (not while peeking), then the static next step.
    pub fn next_step_identifier(
        &self,
        result: Option<&TaskResult>,
        is_peeking: bool,
        config: &EngineConfig,
    ) -> Option<String> {
        if let Some(target) = self.evaluate_survey_rules(result, is_peeking, config) {
            return Some(target);
        }
        if !is_peeking {
            let recorded = result
                .and_then(|r| r.find_result(&self.identifier))
                .and_then(|r| r.skip_to_identifier());
            if let Some(target) = recorded {
                return Some(target.to_string());
            }
        }
        self.next_step_identifier.clone()
    }

    /// Whether the step should be skipped for the current result
    pub fn should_skip(&self, result: Option<&TaskResult>) -> bool {
        let Some(identifier) = &self.skip_if_missing else {
            return false;
        };
        result
            .and_then(|r| r.find_answer_result(identifier))
            .and_then(|a| a.value())
            .is_none()
    }

    /// Build the result this step records for scripted answers keyed by field identifier
    pub fn instantiate_result(&self, answers: Option<&Map<String, Value>>) -> ResultData {
        match &self.kind {
            StepKind::Form { input_fields } => {
                let mut collection = CollectionResult::new(&self.identifier);
                for field in input_fields {
                    let value = answers.and_then(|a| a.get(&field.identifier)).cloned();
                    collection.append_input_result(AnswerResult::new(
                        &field.identifier,
                        field.answer_type.clone(),
                        value,
                    ));
                }
                ResultData::Collection(collection)
            }
            StepKind::Section(_) => ResultData::Section(TaskResult::new(&self.identifier)),
            StepKind::Instruction => ResultData::Base(StepResult::new(&self.identifier)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::BaseType;
    use crate::rules::survey::SurveyRuleOperator;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(step: &Step, answers: Value) -> TaskResult {
        let mut result = TaskResult::new("task");
        result.append_step_history(step.instantiate_result(answers.as_object()));
        result
    }

    fn age_step() -> Step {
        Step::form(
            "age",
            vec![InputField::new("age", AnswerType::Integer).with_rules(vec![
                SurveyRule::new(SurveyRuleOperator::GreaterThanEqual)
                    .with_matching_answer(json!(18))
                    .with_skip_to("adultFlow"),
            ])],
        )
    }

    fn conflicting_step() -> Step {
        Step::form(
            "pair",
            vec![
                InputField::new("a", AnswerType::Boolean).with_rules(vec![
                    SurveyRule::new(SurveyRuleOperator::Equal)
                        .with_matching_answer(json!(true))
                        .with_skip_to("flowA"),
                ]),
                InputField::new("b", AnswerType::Boolean).with_rules(vec![
                    SurveyRule::new(SurveyRuleOperator::Equal)
                        .with_matching_answer(json!(true))
                        .with_skip_to("flowB"),
                ]),
            ],
        )
    }

    #[test]
    fn test_no_result_uses_skip_to_if_nil() {
        let step = Step::instruction("welcome").with_skip_to_if_nil("intro");
        let config = EngineConfig::default();
        assert_eq!(step.evaluate_survey_rules(None, false, &config), Some("intro".to_string()));
    }

    #[test]
    fn test_single_target_wins() {
        let step = age_step();
        let result = record(&step, json!({"age": 25}));
        assert_eq!(
            step.evaluate_survey_rules(Some(&result), false, &EngineConfig::default()),
            Some("adultFlow".to_string())
        );
    }

    #[test]
    fn test_conflicting_targets_do_not_override() {
        let step = conflicting_step().with_skip_to_if_nil("fallback");
        let result = record(&step, json!({"a": true, "b": true}));
        assert_eq!(
            step.evaluate_survey_rules(Some(&result), false, &EngineConfig::default()),
            None
        );
    }

    #[test]
    fn test_first_match_policy_is_opt_in() {
        let step = conflicting_step();
        let result = record(&step, json!({"a": true, "b": true}));
        let config = EngineConfig::default().with_conflict_policy(ConflictPolicy::FirstMatch);
        assert_eq!(
            step.evaluate_survey_rules(Some(&result), false, &config),
            Some("flowA".to_string())
        );
    }

    #[test]
    fn test_all_nil_answers_fall_back() {
        let step = age_step().with_skip_to_if_nil("noAge");
        let result = record(&step, json!({}));
        assert_eq!(
            step.evaluate_survey_rules(Some(&result), false, &EngineConfig::default()),
            Some("noAge".to_string())
        );

        let answered = record(&step, json!({"age": 12}));
        assert_eq!(
            step.evaluate_survey_rules(Some(&answered), false, &EngineConfig::default()),
            None
        );
    }

    #[test]
    fn test_answer_recorded_elsewhere_is_found() {
        let step = Step::form(
            "confirmAge",
            vec![InputField::new("age", AnswerType::Integer).with_rules(vec![
                SurveyRule::new(SurveyRuleOperator::GreaterThanEqual)
                    .with_matching_answer(json!(18))
                    .with_skip_to("adultFlow"),
            ])],
        );

        let mut profile = CollectionResult::new("profile");
        profile.append_input_result(AnswerResult::new("age", AnswerType::Integer, Some(json!(25))));
        let mut result = TaskResult::new("task");
        result.append_step_history(profile);
        result.append_step_history(CollectionResult::new("confirmAge"));

        assert_eq!(
            step.evaluate_survey_rules(Some(&result), false, &EngineConfig::default()),
            Some("adultFlow".to_string())
        );
    }

    #[test]
    fn test_peeking_returns_none() {
        let step = age_step().with_skip_to_if_nil("noAge");
        let result = record(&step, json!({"age": 25}));
        let config = EngineConfig::default();
        assert_eq!(step.evaluate_survey_rules(Some(&result), true, &config), None);
        assert_eq!(step.evaluate_survey_rules(None, true, &config), None);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let step = age_step();
        let result = record(&step, json!({"age": 30}));
        let config = EngineConfig::default();
        let first = step.evaluate_survey_rules(Some(&result), false, &config);
        let second = step.evaluate_survey_rules(Some(&result), false, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_step_navigation_order() {
        let step = age_step().with_next_step("static");
        let config = EngineConfig::default();

        let minor = record(&step, json!({"age": 12}));
        assert_eq!(step.next_step_identifier(Some(&minor), false, &config), Some("static".to_string()));

        let mut declined = TaskResult::new("task");
        let mut collection = CollectionResult::new("age");
        collection.skip_to_identifier = Some("declined".to_string());
        declined.append_step_history(collection);
        assert_eq!(
            step.next_step_identifier(Some(&declined), false, &config),
            Some("declined".to_string())
        );
        // The recorded override is ignored while peeking
        assert_eq!(
            step.next_step_identifier(Some(&declined), true, &config),
            Some("static".to_string())
        );
    }

    #[test]
    fn test_should_skip() {
        let step = Step::instruction("followUp").with_skip_if_missing("age");
        let form = age_step();
        assert!(step.should_skip(None));
        assert!(step.should_skip(Some(&record(&form, json!({})))));
        assert!(!step.should_skip(Some(&record(&form, json!({"age": 40})))));
        assert!(!Step::instruction("plain").should_skip(None));
    }

    #[test]
    fn test_step_wire_format() {
        let step: Step = serde_json::from_value(json!({
            "identifier": "choices",
            "type": "form",
            "inputFields": [{
                "identifier": "choices",
                "answerType": {"type": "array", "baseType": "integer"},
                "surveyRules": [{"ruleOperator": "ot", "matchingAnswer": [0, 3], "skipToIdentifier": "done"}]
            }],
            "afterCohortRules": [{"requiredCohorts": ["smoker"], "operator": "any"}],
            "allowsBackNavigation": false
        }))
        .unwrap();

        assert_eq!(step.input_fields().len(), 1);
        assert_eq!(step.input_fields()[0].answer_type, AnswerType::array(BaseType::Integer));
        assert_eq!(step.after_cohort_rules.len(), 1);
        assert!(!step.allows_back_navigation);

        let section: Step = serde_json::from_value(json!({
            "identifier": "part1",
            "type": "section",
            "steps": [{"identifier": "a", "type": "instruction"}]
        }))
        .unwrap();
        assert!(section.is_section());
        assert_eq!(section.section_navigator().map(|n| n.steps().len()), Some(1));
    }
}
