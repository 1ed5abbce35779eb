//! Declarative navigation rules
//!
//! - `survey`: rules on a single answer value (skip-to targets, cohort assignment)
//! - `cohort`: rules on the participant's cohort membership, and the stateful tracker

pub mod cohort;
pub mod survey;

pub use cohort::{CohortDelta, CohortNavigationRule, CohortRuleOperator, CohortTrackingRule, TrackingRule};
pub use survey::{SurveyRule, SurveyRuleOperator};
