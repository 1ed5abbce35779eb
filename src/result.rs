//! Result tree
//!
//! A task run produces an ordered, appendable tree of per-step outcomes. Every list in
//! the tree keeps one live result per identifier: appending a result whose identifier
//! already exists replaces the earlier one in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::answer::AnswerType;

/// Any node in the result tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResultData {
    /// Result of a step that records no answers (instructions, completion screens)
    Base(StepResult),
    Answer(AnswerResult),
    Collection(CollectionResult),
    /// Step history of a nested section
    Section(TaskResult),
    File(FileResult),
}

impl ResultData {
    pub fn identifier(&self) -> &str {
        match self {
            ResultData::Base(r) => &r.identifier,
            ResultData::Answer(r) => &r.identifier,
            ResultData::Collection(r) => &r.identifier,
            ResultData::Section(r) => &r.identifier,
            ResultData::File(r) => &r.identifier,
        }
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        match self {
            ResultData::Base(r) => r.start_date,
            ResultData::Answer(r) => r.start_date,
            ResultData::Collection(r) => r.start_date,
            ResultData::Section(r) => r.start_date,
            ResultData::File(r) => r.start_date,
        }
    }

    pub fn end_date(&self) -> DateTime<Utc> {
        match self {
            ResultData::Base(r) => r.end_date,
            ResultData::Answer(r) => r.end_date,
            ResultData::Collection(r) => r.end_date,
            ResultData::Section(r) => r.end_date,
            ResultData::File(r) => r.end_date,
        }
    }

    /// Navigation override recorded by the step itself (for example "prefer not to answer")
    pub fn skip_to_identifier(&self) -> Option<&str> {
        match self {
            ResultData::Base(r) => r.skip_to_identifier.as_deref(),
            ResultData::Collection(r) => r.skip_to_identifier.as_deref(),
            _ => None,
        }
    }
}

impl From<AnswerResult> for ResultData {
    fn from(result: AnswerResult) -> Self {
        ResultData::Answer(result)
    }
}

impl From<CollectionResult> for ResultData {
    fn from(result: CollectionResult) -> Self {
        ResultData::Collection(result)
    }
}

impl From<StepResult> for ResultData {
    fn from(result: StepResult) -> Self {
        ResultData::Base(result)
    }
}

/// Plain step outcome with timestamps only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub identifier: String,
    #[serde(default = "Utc::now")]
    pub start_date: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to_identifier: Option<String>,
}

impl StepResult {
    pub fn new(identifier: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identifier: identifier.into(),
            start_date: now,
            end_date: now,
            skip_to_identifier: None,
        }
    }

    pub fn with_skip_to(mut self, identifier: impl Into<String>) -> Self {
        self.skip_to_identifier = Some(identifier.into());
        self
    }
}

/// A single typed answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub identifier: String,
    pub answer_type: AnswerType,
    /// Raw answer value; `None` when the participant skipped the question
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default = "Utc::now")]
    pub start_date: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub end_date: DateTime<Utc>,
}

impl AnswerResult {
    pub fn new(identifier: impl Into<String>, answer_type: AnswerType, value: Option<Value>) -> Self {
        let now = Utc::now();
        Self {
            identifier: identifier.into(),
            answer_type,
            value: value.filter(|v| !v.is_null()),
            start_date: now,
            end_date: now,
        }
    }

    /// The recorded value, treating an explicit JSON null as absent
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref().filter(|v| !v.is_null())
    }
}

/// Ordered results of one multi-field step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResult {
    pub identifier: String,
    #[serde(default = "Utc::now")]
    pub start_date: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub input_results: Vec<ResultData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to_identifier: Option<String>,
}

impl CollectionResult {
    pub fn new(identifier: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identifier: identifier.into(),
            start_date: now,
            end_date: now,
            input_results: Vec::new(),
            skip_to_identifier: None,
        }
    }

    /// Append a child result, replacing (in place) any child with the same identifier.
    ///
    /// Returns the replaced result.
    pub fn append_input_result(&mut self, result: impl Into<ResultData>) -> Option<ResultData> {
        replace_or_push(&mut self.input_results, result.into())
    }

    /// Remove the child with the given identifier
    pub fn remove_input_result(&mut self, identifier: &str) -> Option<ResultData> {
        let index = self
            .input_results
            .iter()
            .position(|r| r.identifier() == identifier)?;
        Some(self.input_results.remove(index))
    }

    pub fn find_result(&self, identifier: &str) -> Option<&ResultData> {
        self.input_results
            .iter()
            .find(|r| r.identifier() == identifier)
    }
}

/// Step history of a task or section run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub identifier: String,
    #[serde(default = "Uuid::new_v4")]
    pub task_run_uuid: Uuid,
    #[serde(default = "Utc::now")]
    pub start_date: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub step_history: Vec<ResultData>,
    /// Side-channel results (recorders, background uploads)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub async_results: Vec<ResultData>,
    /// Identifiers of the steps in the order they were visited
    #[serde(default)]
    pub node_path: Vec<String>,
}

impl TaskResult {
    pub fn new(identifier: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identifier: identifier.into(),
            task_run_uuid: Uuid::new_v4(),
            start_date: now,
            end_date: now,
            step_history: Vec::new(),
            async_results: Vec::new(),
            node_path: Vec::new(),
        }
    }

    /// Append a step result to the history and record the visit in the node path.
    ///
    /// A result with an identifier already in the history replaces the earlier entry
    /// at the same position. Returns the replaced result.
    pub fn append_step_history(&mut self, result: impl Into<ResultData>) -> Option<ResultData> {
        let result = result.into();
        self.node_path.push(result.identifier().to_string());
        self.end_date = self.end_date.max(result.end_date());
        replace_or_push(&mut self.step_history, result)
    }

    /// Remove the result with the given identifier and every result after it.
    ///
    /// Returns the removed results in history order, or `None` when the identifier is
    /// not in the history.
    pub fn remove_step_history(&mut self, from_identifier: &str) -> Option<Vec<ResultData>> {
        let index = self
            .step_history
            .iter()
            .position(|r| r.identifier() == from_identifier)?;
        Some(self.step_history.split_off(index))
    }

    pub fn append_async_result(&mut self, result: impl Into<ResultData>) -> Option<ResultData> {
        replace_or_push(&mut self.async_results, result.into())
    }

    /// Top-level step result with the given identifier
    pub fn find_result(&self, identifier: &str) -> Option<&ResultData> {
        self.step_history
            .iter()
            .find(|r| r.identifier() == identifier)
    }

    /// Nested section result with the given identifier
    pub fn find_section(&self, identifier: &str) -> Option<&TaskResult> {
        match self.find_result(identifier) {
            Some(ResultData::Section(section)) => Some(section),
            _ => None,
        }
    }

    pub fn find_section_mut(&mut self, identifier: &str) -> Option<&mut TaskResult> {
        match self
            .step_history
            .iter_mut()
            .find(|r| r.identifier() == identifier)
        {
            Some(ResultData::Section(section)) => Some(section),
            _ => None,
        }
    }

    /// Identifiers of the visited steps, falling back to the step history order
    pub fn visited_path(&self) -> Vec<&str> {
        if self.node_path.is_empty() {
            self.step_history.iter().map(|r| r.identifier()).collect()
        } else {
            self.node_path.iter().map(String::as_str).collect()
        }
    }
}

/// Pointer to a file written by a recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    pub identifier: String,
    #[serde(default = "Utc::now")]
    pub start_date: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

fn replace_or_push(list: &mut Vec<ResultData>, result: ResultData) -> Option<ResultData> {
    match list
        .iter()
        .position(|r| r.identifier() == result.identifier())
    {
        Some(index) => Some(std::mem::replace(&mut list[index], result)),
        None => {
            list.push(result);
            None
        }
    }
}

/// Recursive lookup of answer results
///
/// The node itself is checked first, then its children depth-first in insertion
/// order; the first match wins. A result with the identifier that is not an answer
/// does not stop the search.
pub trait AnswerResultFinder {
    fn find_answer_result(&self, identifier: &str) -> Option<&AnswerResult>;
}

impl AnswerResultFinder for ResultData {
    fn find_answer_result(&self, identifier: &str) -> Option<&AnswerResult> {
        match self {
            ResultData::Answer(answer) if answer.identifier == identifier => Some(answer),
            ResultData::Collection(collection) => collection.find_answer_result(identifier),
            ResultData::Section(section) => section.find_answer_result(identifier),
            _ => None,
        }
    }
}

impl AnswerResultFinder for CollectionResult {
    fn find_answer_result(&self, identifier: &str) -> Option<&AnswerResult> {
        self.input_results
            .iter()
            .find_map(|r| r.find_answer_result(identifier))
    }
}

impl AnswerResultFinder for TaskResult {
    fn find_answer_result(&self, identifier: &str) -> Option<&AnswerResult> {
        self.step_history
            .iter()
            .find_map(|r| r.find_answer_result(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn answer(identifier: &str, value: Value) -> AnswerResult {
        AnswerResult::new(identifier, AnswerType::Integer, Some(value))
    }

    #[test]
    fn test_append_replaces_in_place() {
        let mut result = TaskResult::new("task");
        result.append_step_history(answer("q1", json!(1)));
        result.append_step_history(StepResult::new("q2"));

        let previous = result.append_step_history(answer("q1", json!(2)));

        match previous {
            Some(ResultData::Answer(replaced)) => assert_eq!(replaced.value(), Some(&json!(1))),
            other => panic!("expected replaced answer, got {:?}", other),
        }
        let ids: Vec<&str> = result.step_history.iter().map(|r| r.identifier()).collect();
        assert_eq!(ids, vec!["q1", "q2"]);
        assert_eq!(
            result.find_answer_result("q1").and_then(|a| a.value()),
            Some(&json!(2))
        );
        assert_eq!(result.node_path, vec!["q1", "q2", "q1"]);
    }

    #[test]
    fn test_find_answer_result_recurses() {
        let mut form = CollectionResult::new("form");
        form.append_input_result(answer("age", json!(25)));

        let mut section = TaskResult::new("section");
        section.append_step_history(form);

        let mut task = TaskResult::new("task");
        task.append_step_history(StepResult::new("intro"));
        task.append_step_history(ResultData::Section(section));

        let found = task.find_answer_result("age").unwrap();
        assert_eq!(found.value(), Some(&json!(25)));
        assert!(task.find_answer_result("missing").is_none());
    }

    #[test]
    fn test_find_answer_result_skips_wrong_kind() {
        let mut form = CollectionResult::new("q1");
        form.append_input_result(answer("q1", json!(7)));

        let mut task = TaskResult::new("task");
        task.append_step_history(form);

        // The collection shares the identifier but the search continues into its children
        assert_eq!(
            task.find_answer_result("q1").and_then(|a| a.value()),
            Some(&json!(7))
        );
        assert!(task.find_result("q1").is_some());
    }

    #[test]
    fn test_first_match_wins() {
        let mut first = CollectionResult::new("a");
        first.append_input_result(answer("dup", json!(1)));
        let mut second = CollectionResult::new("b");
        second.append_input_result(answer("dup", json!(2)));

        let mut task = TaskResult::new("task");
        task.append_step_history(first);
        task.append_step_history(second);

        assert_eq!(
            task.find_answer_result("dup").and_then(|a| a.value()),
            Some(&json!(1))
        );
    }

    #[test]
    fn test_remove_step_history() {
        let mut task = TaskResult::new("task");
        for id in ["a", "b", "c"] {
            task.append_step_history(StepResult::new(id));
        }

        let removed = task.remove_step_history("b").unwrap();
        let removed_ids: Vec<&str> = removed.iter().map(|r| r.identifier()).collect();
        assert_eq!(removed_ids, vec!["b", "c"]);
        assert_eq!(task.step_history.len(), 1);
        assert!(task.remove_step_history("missing").is_none());
    }

    #[test]
    fn test_null_answer_is_absent() {
        let parsed: AnswerResult = serde_json::from_value(json!({
            "identifier": "q1",
            "answerType": {"type": "string"},
            "value": null
        }))
        .unwrap();
        assert!(parsed.value().is_none());

        let built = AnswerResult::new("q2", AnswerType::String, Some(Value::Null));
        assert!(built.value.is_none());
    }

    #[test]
    fn test_result_tree_from_json() {
        let task: TaskResult = serde_json::from_value(json!({
            "identifier": "task",
            "stepHistory": [
                {"type": "base", "identifier": "intro"},
                {
                    "type": "collection",
                    "identifier": "demographics",
                    "inputResults": [
                        {"type": "answer", "identifier": "age",
                         "answerType": {"type": "integer"}, "value": 42}
                    ]
                }
            ]
        }))
        .unwrap();

        assert_eq!(task.step_history.len(), 2);
        assert!(task.node_path.is_empty());
        assert_eq!(task.visited_path(), vec!["intro", "demographics"]);
        assert_eq!(
            task.find_answer_result("age").and_then(|a| a.value()),
            Some(&json!(42))
        );
    }
}
