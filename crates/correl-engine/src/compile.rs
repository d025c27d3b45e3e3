//! Rule compilation: resolve per-condition defaults at load time.
//!
//! A parsed rule may omit `window` and `count` on any condition; the
//! compiled form carries the fully-resolved values so the evaluation hot
//! path never consults configuration.

use correl_rules::{AlertTemplate, CountPredicate, FieldFilter, Rule, Severity};

use crate::correlator::CorrelatorConfig;
use crate::event::EventKind;

/// A rule with all per-condition defaults resolved.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub confidence: Option<f64>,
    pub mitre_techniques: Vec<String>,
    pub conditions: Vec<CompiledCondition>,
    /// Template of the first alert action; the alert generator resolves
    /// its fallback chain against the rule and engine defaults.
    pub template: AlertTemplate,
}

/// A condition with resolved window and count threshold.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    pub event_type: EventKind,
    pub window_secs: u64,
    pub count: CountPredicate,
    pub field_filter: Vec<FieldFilter>,
    pub group_by: Vec<String>,
    pub same_user: bool,
    pub after_previous: bool,
    pub within: Option<u64>,
}

/// Compile a parsed rule against the engine configuration.
pub fn compile_rule(rule: &Rule, config: &CorrelatorConfig) -> CompiledRule {
    let conditions = rule
        .conditions
        .iter()
        .map(|cond| CompiledCondition {
            event_type: EventKind::from_tag(&cond.event_type),
            window_secs: cond.window.unwrap_or(config.default_window),
            count: cond.count.unwrap_or(config.default_count),
            field_filter: cond.field_filter.clone(),
            group_by: cond.group_by.clone(),
            same_user: cond.same_user,
            after_previous: cond.after_previous,
            within: cond.within,
        })
        .collect();

    // Rule loading guarantees at least one action; the first alert action
    // carries the template.
    let template = rule
        .actions
        .first()
        .map(|action| action.template().clone())
        .unwrap_or_default();

    CompiledRule {
        id: rule.id.clone(),
        name: rule.name.clone(),
        description: rule.description.clone(),
        severity: rule.severity,
        confidence: rule.confidence,
        mitre_techniques: rule.mitre_techniques.clone(),
        conditions,
        template,
    }
}
