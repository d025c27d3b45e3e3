//! Decision graph records: the per-evaluation trace that explains why a
//! rule did or did not fire.
//!
//! Every evaluation pass — matched or not — yields one graph. Graphs hold
//! their own event references (`Arc` clones), so they stay valid after the
//! window store expires the underlying entries. A graph serializes to a
//! GraphViz DOT chain for visualization: rule → C₁ → … → terminal.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;

use crate::event::Event;

/// Outcome of evaluating one condition during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionTrace {
    /// 1-based position in the rule's condition sequence.
    pub index: usize,
    /// Event type the condition binds to.
    pub event_type: String,
    pub matched: bool,
    /// Events that satisfied the condition (empty when it failed).
    pub bound_events: Vec<Arc<Event>>,
}

/// The trace of one rule evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionGraph {
    pub rule_id: String,
    pub rule_name: String,
    /// The event whose admission caused this evaluation pass.
    pub trigger_event: Arc<Event>,
    /// Per-condition results in evaluation order. Evaluation stops at the
    /// first failure, so a non-match carries traces only up to that point.
    pub conditions_evaluated: Vec<ConditionTrace>,
    pub matched: bool,
    /// 1-based index of the first failing condition; absent on a match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at_condition: Option<usize>,
}

impl DecisionGraph {
    /// Render the graph in GraphViz DOT format.
    ///
    /// Layout: one lightblue root node for the rule, one box per condition
    /// (lightgreen on match, lightcoral on failure), and a terminal
    /// ellipse (green `MATCHED` or red `NO MATCH`), chained left to right.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph CorrelationGraph {{");
        let _ = writeln!(out, "    rankdir=LR;");
        let _ = writeln!(out, "    node [shape=box, style=rounded];");
        let _ = writeln!(out);

        let _ = writeln!(
            out,
            "    rule [label=\"{}\\n{}\", fillcolor=lightblue, style=filled];",
            escape_label(&self.rule_id),
            escape_label(&self.rule_name)
        );

        for trace in &self.conditions_evaluated {
            let color = if trace.matched { "lightgreen" } else { "lightcoral" };
            let _ = writeln!(
                out,
                "    cond{} [label=\"Condition {}\\n{}\", fillcolor={color}, style=filled];",
                trace.index,
                trace.index,
                escape_label(&trace.event_type)
            );
            if trace.index == 1 {
                let _ = writeln!(out, "    rule -> cond1;");
            } else {
                let _ = writeln!(out, "    cond{} -> cond{};", trace.index - 1, trace.index);
            }
        }

        let (label, color) = if self.matched {
            ("MATCHED\\nAlert Generated", "green")
        } else {
            ("NO MATCH", "red")
        };
        let _ = writeln!(
            out,
            "    result [label=\"{label}\", fillcolor={color}, style=filled, shape=ellipse];"
        );
        if let Some(last) = self.conditions_evaluated.last() {
            let _ = writeln!(out, "    cond{} -> result;", last.index);
        } else {
            let _ = writeln!(out, "    rule -> result;");
        }

        out.push_str("}\n");
        out
    }
}

fn escape_label(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
