// SPDX-License-Identifier: GPL-3.0-or-later
//! Rule framework shared by the grab-time and import-time rule sets.
//!
//! Rules are assembled once into a [`DecisionEngine`], which orders them by
//! [`Priority`] so cheap in-memory checks run before anything touching history
//! or the disk. Rules never mutate shared state; they only read the
//! collaborators they were built with.

pub mod delay;
pub mod grab;
pub mod import;
pub mod multipart;

use mediarr_domain::{Decision, RejectionKind, SearchContext};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::CollaboratorError;

/// Execution tier. Lower tiers run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Priority {
    Default,
    Parsing,
    Database,
    Disk,
}

pub trait Rule<C>: Send + Sync {
    fn name(&self) -> &'static str;

    fn priority(&self) -> Priority {
        Priority::Default
    }

    fn evaluate(&self, candidate: &C, context: Option<&SearchContext>) -> Decision;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub rule: &'static str,
    pub decision: Decision,
}

pub struct DecisionEngine<C> {
    rules: Vec<Box<dyn Rule<C>>>,
}

impl<C> DecisionEngine<C> {
    pub fn new(mut rules: Vec<Box<dyn Rule<C>>>) -> Self {
        // Stable, so rules within a tier keep their registration order.
        rules.sort_by_key(|rule| rule.priority());
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Admission check. Stops at the first rejection.
    pub fn decide(&self, candidate: &C, context: Option<&SearchContext>) -> Decision {
        for rule in &self.rules {
            let decision = rule.evaluate(candidate, context);
            if let Decision::Rejected(rejection) = &decision {
                debug!(
                    target: "decision",
                    rule = rule.name(),
                    kind = ?rejection.kind,
                    reason = %rejection.message,
                    "rule rejected candidate"
                );
                return decision;
            }
        }
        Decision::Accepted
    }

    /// Diagnostic path. Runs every rule and reports each verdict.
    pub fn explain(&self, candidate: &C, context: Option<&SearchContext>) -> Vec<RuleOutcome> {
        self.rules
            .iter()
            .map(|rule| RuleOutcome {
                rule: rule.name(),
                decision: rule.evaluate(candidate, context),
            })
            .collect()
    }
}

impl<C> std::fmt::Debug for DecisionEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("rules", &self.rule_names())
            .finish()
    }
}

/// Only the rejected outcomes of an `explain` run.
pub fn rejections(outcomes: &[RuleOutcome]) -> Vec<&RuleOutcome> {
    outcomes
        .iter()
        .filter(|outcome| !outcome.decision.is_accepted())
        .collect()
}

pub(crate) fn collaborator_unavailable(rule: &'static str, error: &CollaboratorError) -> Decision {
    warn!(target: "decision", rule, %error, "collaborator unavailable during rule evaluation");
    Decision::reject(
        RejectionKind::CollaboratorUnavailable,
        format!("Unable to evaluate {rule}: {error}"),
    )
}
