//! Rule engine.
//!
//! The rule set is fixed and ordered. Rules never see each other's results
//! and never perform I/O, so any subset can run in any order.

mod checklist;

pub use checklist::{
    MAX_LAYERS, REQUIRED_LABELS, check_base_image_provenance, check_layer_count, check_licenses,
    check_required_labels, check_tags,
};

use crate::models::{CheckResult, ImageFacts};

/// Selection name that evaluates every rule
pub const ALL_RULES: &str = "all";

/// One certification rule
pub struct RuleDefinition {
    /// Identifier used on the command line
    pub id: &'static str,
    pub description: &'static str,
    pub evaluate: fn(&ImageFacts) -> CheckResult,
}

/// The ordered collection of certification rules
pub struct RuleSet {
    pub rules: Vec<RuleDefinition>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            rules: vec![
                RuleDefinition {
                    id: "is_rhel",
                    description: "Image must be built on an unmodified Red Hat base image",
                    evaluate: check_base_image_provenance,
                },
                RuleDefinition {
                    id: "has_labels",
                    description: "Image must define name, vendor, version, release, summary and description labels",
                    evaluate: check_required_labels,
                },
                RuleDefinition {
                    id: "has_under_40_layers",
                    description: "Image must have fewer than 40 layers",
                    evaluate: check_layer_count,
                },
                RuleDefinition {
                    id: "good_tags",
                    description: "Image must have a tag other than latest",
                    evaluate: check_tags,
                },
                RuleDefinition {
                    id: "has_licenses",
                    description: "Image must include a /licenses directory",
                    evaluate: check_licenses,
                },
            ],
        }
    }
}

/// What the command line asked for
pub enum Selection<'a> {
    One(&'a RuleDefinition),
    All,
    Unknown(String),
}

impl Selection<'_> {
    /// Whether facts are needed to answer this selection
    pub fn needs_facts(&self) -> bool {
        !matches!(self, Selection::Unknown(_))
    }
}

impl RuleSet {
    pub fn get(&self, id: &str) -> Option<&RuleDefinition> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id).collect()
    }

    pub fn select(&self, name: &str) -> Selection<'_> {
        if name == ALL_RULES {
            return Selection::All;
        }
        match self.get(name) {
            Some(rule) => Selection::One(rule),
            None => Selection::Unknown(name.to_string()),
        }
    }

    /// Run every rule in registry order
    pub fn run_all(&self, facts: &ImageFacts) -> Vec<CheckResult> {
        self.rules.iter().map(|rule| (rule.evaluate)(facts)).collect()
    }

    /// Evaluate a selection. An unknown name ignores the facts and produces a
    /// single failing result listing the valid rule names.
    pub fn evaluate(&self, selection: &Selection<'_>, facts: &ImageFacts) -> Vec<CheckResult> {
        match selection {
            Selection::One(rule) => vec![(rule.evaluate)(facts)],
            Selection::All => self.run_all(facts),
            Selection::Unknown(name) => vec![self.unknown_rule(name)],
        }
    }

    /// Failing result that tells the user which rule names exist
    pub fn unknown_rule(&self, name: &str) -> CheckResult {
        let mut r = CheckResult::new("Unknown Rule");
        r.error(format!("No rule named '{}'.", name));
        r.error(format!(
            "Valid tests for this image include: {} {}",
            self.ids().join(" "),
            ALL_RULES
        ));
        r
    }
}
