//! Survey rules
//!
//! A survey rule compares one answer against a matching value. When it fires it
//! either redirects navigation to a skip target or, when it names a cohort, decides
//! whether the participant joins that cohort.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::answer::{AnswerValue, BaseType, Comparable};
use crate::config::EngineConfig;
use crate::identifier::ReservedIdentifier;
use crate::result::AnswerResult;

/// Comparison applied by a survey rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurveyRuleOperator {
    /// Fires when the answer is missing or null
    #[serde(rename = "de", alias = "skip")]
    Skip,
    #[serde(rename = "eq", alias = "equal")]
    Equal,
    #[serde(rename = "ne", alias = "notEqual")]
    NotEqual,
    #[serde(rename = "lt", alias = "lessThan")]
    LessThan,
    #[serde(rename = "gt", alias = "greaterThan")]
    GreaterThan,
    #[serde(rename = "le", alias = "lessThanEqual")]
    LessThanEqual,
    #[serde(rename = "ge", alias = "greaterThanEqual")]
    GreaterThanEqual,
    /// Fires when the answer contains none of the matching values
    #[serde(rename = "ot", alias = "otherThan")]
    OtherThan,
    #[serde(rename = "always")]
    Always,
}

impl SurveyRuleOperator {
    pub fn code(&self) -> &'static str {
        match self {
            SurveyRuleOperator::Skip => "de",
            SurveyRuleOperator::Equal => "eq",
            SurveyRuleOperator::NotEqual => "ne",
            SurveyRuleOperator::LessThan => "lt",
            SurveyRuleOperator::GreaterThan => "gt",
            SurveyRuleOperator::LessThanEqual => "le",
            SurveyRuleOperator::GreaterThanEqual => "ge",
            SurveyRuleOperator::OtherThan => "ot",
            SurveyRuleOperator::Always => "always",
        }
    }

    /// Whether the operator compares against a matching answer
    pub fn needs_matching_answer(&self) -> bool {
        !matches!(self, SurveyRuleOperator::Skip | SurveyRuleOperator::Always)
    }

    /// Whether the operator orders values (lt/gt/le/ge)
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            SurveyRuleOperator::LessThan
                | SurveyRuleOperator::GreaterThan
                | SurveyRuleOperator::LessThanEqual
                | SurveyRuleOperator::GreaterThanEqual
        )
    }
}

/// Declarative condition on one answer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching_answer: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "operator")]
    pub rule_operator: Option<SurveyRuleOperator>,
    /// Cohort assigned when the rule matches and removed when it does not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohort: Option<String>,
    /// Tolerance for decimal `equal`, overriding the engine default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl SurveyRule {
    pub fn new(operator: SurveyRuleOperator) -> Self {
        Self {
            rule_operator: Some(operator),
            ..Self::default()
        }
    }

    pub fn with_matching_answer(mut self, value: Value) -> Self {
        self.matching_answer = Some(value);
        self
    }

    pub fn with_skip_to(mut self, identifier: impl Into<String>) -> Self {
        self.skip_to_identifier = Some(identifier.into());
        self
    }

    pub fn with_cohort(mut self, cohort: impl Into<String>) -> Self {
        self.cohort = Some(cohort.into());
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Effective operator: `equal` when only a matching answer is given, `skip` when neither is
    pub fn operator(&self) -> SurveyRuleOperator {
        match (self.rule_operator, self.matching_value()) {
            (Some(operator), _) => operator,
            (None, Some(_)) => SurveyRuleOperator::Equal,
            (None, None) => SurveyRuleOperator::Skip,
        }
    }

    fn matching_value(&self) -> Option<&Value> {
        self.matching_answer.as_ref().filter(|v| !v.is_null())
    }

    /// Skip target returned when the rule fires.
    ///
    /// Rules that only assign a cohort never navigate.
    pub fn skip_target(&self) -> Option<String> {
        match (&self.skip_to_identifier, &self.cohort) {
            (Some(target), _) => Some(target.clone()),
            (None, Some(_)) => None,
            (None, None) => Some(ReservedIdentifier::NextSection.to_string()),
        }
    }

    /// Evaluate the rule, returning the skip target when it fires
    pub fn evaluate(&self, answer: Option<&AnswerResult>, config: &EngineConfig) -> Option<String> {
        if self.matches(answer, config) {
            self.skip_target()
        } else {
            None
        }
    }

    /// Whether the rule's condition holds for the answer.
    ///
    /// Values that cannot be compared under the operator never match.
    pub fn matches(&self, answer: Option<&AnswerResult>, config: &EngineConfig) -> bool {
        let operator = self.operator();
        let recorded = answer.and_then(|a| a.value().map(|v| (a, v)));

        match operator {
            SurveyRuleOperator::Always => return true,
            SurveyRuleOperator::Skip => return recorded.is_none(),
            _ => {}
        }

        let Some((answer, value)) = recorded else {
            return false;
        };
        let Some(matching) = self.matching_value() else {
            trace!(field = %answer.identifier, operator = operator.code(), "rule has no matching answer");
            return false;
        };

        let answer_type = &answer.answer_type;
        let (Some(lhs), Some(rhs)) = (answer_type.interpret(value), answer_type.interpret(matching)) else {
            trace!(
                field = %answer.identifier,
                answer_type = %answer_type.describe(),
                "answer or matching value cannot be compared"
            );
            return false;
        };

        let accuracy = if answer_type.base_type() == BaseType::Decimal {
            Some(self.accuracy.unwrap_or(config.decimal_accuracy).abs())
        } else {
            None
        };

        compare(operator, &lhs, &rhs, accuracy)
    }
}

fn compare(operator: SurveyRuleOperator, lhs: &AnswerValue, rhs: &AnswerValue, accuracy: Option<f64>) -> bool {
    match (lhs, rhs) {
        (AnswerValue::List(answer), AnswerValue::List(matching)) => match operator {
            SurveyRuleOperator::Equal => intersects(answer, matching),
            SurveyRuleOperator::OtherThan => !intersects(answer, matching),
            SurveyRuleOperator::NotEqual => answer != matching,
            _ => false,
        },
        (AnswerValue::Scalar(answer), AnswerValue::Scalar(matching)) => match operator {
            SurveyRuleOperator::Equal => scalar_equal(answer, matching, accuracy),
            SurveyRuleOperator::NotEqual | SurveyRuleOperator::OtherThan => {
                !scalar_equal(answer, matching, accuracy)
            }
            SurveyRuleOperator::LessThan => answer < matching,
            SurveyRuleOperator::GreaterThan => answer > matching,
            SurveyRuleOperator::LessThanEqual => answer <= matching,
            SurveyRuleOperator::GreaterThanEqual => answer >= matching,
            SurveyRuleOperator::Skip | SurveyRuleOperator::Always => false,
        },
        _ => false,
    }
}

fn scalar_equal(answer: &Comparable, matching: &Comparable, accuracy: Option<f64>) -> bool {
    match (answer, matching, accuracy) {
        (Comparable::Number(a), Comparable::Number(b), Some(accuracy)) => (a - b).abs() <= accuracy,
        _ => answer == matching,
    }
}

fn intersects(answer: &[Comparable], matching: &[Comparable]) -> bool {
    answer.iter().any(|value| matching.contains(value))
}
