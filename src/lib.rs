//! Survey Navigation - Task navigation and survey-rule evaluation engine
//!
//! Decides which step of a data-collection task runs next, from the answers
//! recorded so far and the participant's cohort membership:
//! recorded results → survey rules → cohort tracking → step navigator.
//!
//! ## Modules
//!
//! - **Results**: Tree of step results with depth-first answer lookup
//! - **Rules**: Survey rule evaluation and cohort tracking
//! - **Navigation**: Ordered step navigator with section support and a stateful session driver

pub mod answer;
pub mod config;
pub mod error;
pub mod identifier;
pub mod navigator;
pub mod result;
pub mod rules;
pub mod session;
pub mod step;
pub mod task;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use answer::{AnswerType, BaseType};
pub use config::{ConflictPolicy, EngineConfig};
pub use error::{NavigationError, ValidationError};
pub use identifier::ReservedIdentifier;
pub use navigator::{Navigation, Progress, StepDirection, StepNavigator};
pub use result::{AnswerResult, AnswerResultFinder, CollectionResult, ResultData, StepResult, TaskResult};
pub use session::{decide_next_step, next_step_json, NavigationDecision, TaskSession};
pub use step::{InputField, Step, StepKind};
pub use task::Task;

// Rule exports
pub use rules::{
    CohortNavigationRule, CohortRuleOperator, CohortTrackingRule, SurveyRule, SurveyRuleOperator,
    TrackingRule,
};

/// Engine version reported by the CLI and FFI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
