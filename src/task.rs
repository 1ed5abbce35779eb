//! Task definitions
//!
//! A task is the top-level ordered list of steps plus the starting cohort membership
//! and engine configuration. Definitions are validated when loaded so navigation
//! itself never has to fail.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

use crate::answer::AnswerType;
use crate::config::EngineConfig;
use crate::error::{NavigationError, ValidationError};
use crate::identifier::ReservedIdentifier;
use crate::navigator::StepNavigator;
use crate::rules::cohort::CohortNavigationRule;
use crate::rules::survey::SurveyRule;
use crate::step::{InputField, Step};

/// A complete task definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub identifier: String,
    #[serde(flatten)]
    pub navigator: StepNavigator,
    /// Cohorts the participant starts the run with
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub initial_cohorts: BTreeSet<String>,
    #[serde(default)]
    pub config: EngineConfig,
}

impl Task {
    pub fn new(identifier: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            identifier: identifier.into(),
            navigator: StepNavigator::new(steps),
            initial_cohorts: BTreeSet::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_initial_cohorts<I, S>(mut self, cohorts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initial_cohorts = cohorts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Parse and validate a task definition.
    ///
    /// Warning-level issues are logged; any other issue rejects the task.
    pub fn from_json(json: &str) -> Result<Self, NavigationError> {
        let task: Task = serde_json::from_str(json)?;
        let (warnings, errors): (Vec<_>, Vec<_>) =
            task.validate().into_iter().partition(ValidationError::is_warning);

        for warning in &warnings {
            warn!(task = %task.identifier, issue = %warning, "task definition warning");
        }
        if !errors.is_empty() {
            return Err(NavigationError::InvalidTask(errors));
        }

        debug!(task = %task.identifier, steps = task.navigator.steps().len(), "loaded task");
        Ok(task)
    }

    pub fn to_json(&self) -> Result<String, NavigationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn steps(&self) -> &[Step] {
        self.navigator.steps()
    }

    /// Find a step anywhere in the task, including inside sections
    pub fn find_step(&self, identifier: &str) -> Option<&Step> {
        fn search<'a>(steps: &'a [Step], identifier: &str) -> Option<&'a Step> {
            steps.iter().find_map(|step| {
                if step.identifier == identifier {
                    return Some(step);
                }
                step.section_navigator()
                    .and_then(|nav| search(nav.steps(), identifier))
            })
        }
        search(self.steps(), identifier)
    }

    /// Collect every authoring problem in the definition
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut answer_ids = HashSet::new();
        collect_answer_ids(self.steps(), &mut answer_ids);

        let mut issues = Vec::new();
        let mut scopes: Vec<HashSet<&str>> = Vec::new();
        validate_scope(&self.identifier, self.steps(), &mut scopes, &answer_ids, &mut issues);
        issues
    }
}

fn collect_answer_ids<'a>(steps: &'a [Step], ids: &mut HashSet<&'a str>) {
    for step in steps {
        for field in step.input_fields() {
            ids.insert(field.identifier.as_str());
        }
        if let Some(section) = step.section_navigator() {
            collect_answer_ids(section.steps(), ids);
        }
    }
}

fn validate_scope<'a>(
    scope: &str,
    steps: &'a [Step],
    scopes: &mut Vec<HashSet<&'a str>>,
    answer_ids: &HashSet<&str>,
    issues: &mut Vec<ValidationError>,
) {
    let mut known = HashSet::new();
    for step in steps {
        if !known.insert(step.identifier.as_str()) {
            issues.push(ValidationError::DuplicateStep {
                scope: scope.to_string(),
                identifier: step.identifier.clone(),
            });
        }
    }
    scopes.push(known);

    for step in steps {
        // Targets may name a step in this scope or any enclosing one
        for target in skip_targets(step) {
            let resolvable = ReservedIdentifier::is_reserved(target)
                || scopes.iter().any(|s| s.contains(target));
            if !resolvable {
                issues.push(ValidationError::UnknownSkipTarget {
                    step: step.identifier.clone(),
                    target: target.to_string(),
                });
            }
        }

        for field in step.input_fields() {
            for rule in &field.survey_rules {
                validate_rule(field, rule, issues);
            }
        }

        if step
            .before_cohort_rules
            .iter()
            .chain(&step.after_cohort_rules)
            .any(|r| r.required_cohorts.is_empty())
        {
            issues.push(ValidationError::EmptyRequiredCohorts {
                step: step.identifier.clone(),
            });
        }

        if let Some(identifier) = &step.skip_if_missing {
            if !answer_ids.contains(identifier.as_str()) {
                issues.push(ValidationError::UnknownSkipCondition {
                    step: step.identifier.clone(),
                    identifier: identifier.clone(),
                });
            }
        }

        if let Some(section) = step.section_navigator() {
            validate_scope(&step.identifier, section.steps(), scopes, answer_ids, issues);
        }
    }

    scopes.pop();
}

fn skip_targets(step: &Step) -> Vec<&str> {
    let mut targets: Vec<&str> = Vec::new();
    targets.extend(step.next_step_identifier.as_deref());
    targets.extend(step.skip_to_if_nil.as_deref());
    targets.extend(
        step.before_cohort_rules
            .iter()
            .chain(&step.after_cohort_rules)
            .filter_map(|r: &CohortNavigationRule| r.skip_to_identifier.as_deref()),
    );
    for field in step.input_fields() {
        targets.extend(
            field
                .survey_rules
                .iter()
                .filter_map(|r| r.skip_to_identifier.as_deref()),
        );
    }
    targets
}

fn validate_rule(field: &InputField, rule: &SurveyRule, issues: &mut Vec<ValidationError>) {
    let operator = rule.operator();
    let answer_type = &field.answer_type;

    let unsupported = match answer_type {
        AnswerType::Object => operator.needs_matching_answer(),
        AnswerType::Boolean | AnswerType::Array { .. } => operator.is_ordering(),
        _ => false,
    };
    if unsupported {
        issues.push(ValidationError::UnsupportedOperator {
            field: field.identifier.clone(),
            operator: operator.code().to_string(),
            answer_type: answer_type.describe(),
        });
        return;
    }

    if !operator.needs_matching_answer() {
        return;
    }
    match rule.matching_answer.as_ref().filter(|v| !v.is_null()) {
        None => issues.push(ValidationError::MissingMatchingAnswer {
            field: field.identifier.clone(),
            operator: operator.code().to_string(),
        }),
        Some(value) if answer_type.interpret(value).is_none() => {
            issues.push(ValidationError::MismatchedMatchingAnswer {
                field: field.identifier.clone(),
                answer_type: answer_type.describe(),
            })
        }
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn survey_json() -> serde_json::Value {
        json!({
            "identifier": "smoking",
            "initialCohorts": ["study"],
            "steps": [
                {"identifier": "intro", "type": "instruction"},
                {
                    "identifier": "smokes",
                    "type": "form",
                    "inputFields": [{
                        "identifier": "smokes",
                        "answerType": {"type": "boolean"},
                        "surveyRules": [
                            {"matchingAnswer": true, "cohort": "smoker"},
                            {"ruleOperator": "de", "skipToIdentifier": "exit"}
                        ]
                    }]
                },
                {
                    "identifier": "habits",
                    "type": "section",
                    "beforeCohortRules": [{"requiredCohorts": ["smoker"], "operator": "any", "skipToIdentifier": "habits"}],
                    "steps": [
                        {"identifier": "packs", "type": "form", "nextStepIdentifier": "done",
                         "inputFields": [{"identifier": "packs", "answerType": {"type": "integer"}}]}
                    ]
                },
                {"identifier": "done", "type": "instruction"}
            ]
        })
    }

    #[test]
    fn test_load_valid_task() {
        let task = Task::from_json(&survey_json().to_string()).unwrap();
        assert_eq!(task.steps().len(), 4);
        assert_eq!(task.initial_cohorts, BTreeSet::from(["study".to_string()]));
        assert!(task.find_step("packs").is_some());
        assert!(task.validate().is_empty());
    }

    #[test]
    fn test_duplicate_and_unknown_targets() {
        let task = Task::new(
            "task",
            vec![
                Step::instruction("a").with_next_step("missing"),
                Step::instruction("a"),
                Step::section("s", vec![Step::instruction("inner").with_next_step("a")]),
            ],
        );

        let issues = task.validate();
        assert_eq!(
            issues,
            vec![
                ValidationError::DuplicateStep {
                    scope: "task".into(),
                    identifier: "a".into()
                },
                ValidationError::UnknownSkipTarget {
                    step: "a".into(),
                    target: "missing".into()
                },
            ]
        );
    }

    #[test]
    fn test_rule_validation() {
        let task = Task::new(
            "task",
            vec![Step::form(
                "form",
                vec![
                    InputField::new("flag", AnswerType::Boolean).with_rules(vec![
                        SurveyRule::new(crate::rules::SurveyRuleOperator::LessThan)
                            .with_matching_answer(json!(true)),
                    ]),
                    InputField::new("count", AnswerType::Integer).with_rules(vec![
                        SurveyRule::new(crate::rules::SurveyRuleOperator::Equal),
                        SurveyRule::new(crate::rules::SurveyRuleOperator::Equal)
                            .with_matching_answer(json!("three")),
                    ]),
                ],
            )],
        );

        let issues = task.validate();
        assert_eq!(issues.len(), 3);
        assert!(matches!(issues[0], ValidationError::UnsupportedOperator { .. }));
        assert!(matches!(issues[1], ValidationError::MissingMatchingAnswer { .. }));
        assert!(matches!(issues[2], ValidationError::MismatchedMatchingAnswer { .. }));
    }

    #[test]
    fn test_warnings_do_not_reject() {
        let mut value = survey_json();
        value["steps"][0]["afterCohortRules"] = json!([{"requiredCohorts": []}]);
        value["steps"][3]["skipIfMissing"] = json!("unknownAnswer");

        let task = Task::from_json(&value.to_string()).unwrap();
        let issues = task.validate();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(ValidationError::is_warning));
    }

    #[test]
    fn test_invalid_task_is_rejected() {
        let mut value = survey_json();
        value["steps"][0]["nextStepIdentifier"] = json!("nowhere");

        match Task::from_json(&value.to_string()) {
            Err(NavigationError::InvalidTask(issues)) => assert_eq!(issues.len(), 1),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }
}
