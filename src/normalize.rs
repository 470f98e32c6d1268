//! Schema normalization.
//!
//! Documents arrive from three generations of storage: legacy bare-string
//! goals, structured `{text, completed}` goals, and documents whose declared
//! `goalColumnsCount` disagrees with the goal sequences they carry. Every
//! read from any tier passes through here before it touches the grid, so the
//! rest of the crate only ever sees the canonical invariant: count >= 1 and
//! every sequence exactly that long.

use serde_json::Value;

use crate::types::{
    GoalRecord, RawGoal, RawRoleEntry, RawWeekDocument, RoleEntry, StructureTemplate, WeekDocument,
};

/// Convert a goal from any stored shape to the canonical record.
///
/// Legacy documents stored a bare string; it reads as not-completed.
pub fn normalize_goal(raw: RawGoal) -> GoalRecord {
    match raw {
        RawGoal::Legacy(text) => GoalRecord {
            text,
            completed: false,
        },
        RawGoal::Structured(record) => record,
    }
}

/// Pad with empty records or truncate so `goals.len() == count`.
fn fit_to_count(mut goals: Vec<GoalRecord>, count: usize) -> Vec<GoalRecord> {
    goals.truncate(count);
    while goals.len() < count {
        goals.push(GoalRecord::empty());
    }
    goals
}

fn normalize_role(raw: RawRoleEntry, count: usize) -> RoleEntry {
    let goals = raw.goals.into_iter().map(normalize_goal).collect();
    RoleEntry {
        name: raw.name,
        color: raw.color,
        goals: fit_to_count(goals, count),
    }
}

/// Normalize a raw week document into the canonical form.
///
/// The document's declared column count wins: sequences are padded or
/// truncated to match it. A missing count falls back to the longest
/// sequence present, floor 1.
pub fn normalize_document(raw: RawWeekDocument) -> WeekDocument {
    let longest = raw
        .roles
        .iter()
        .map(|r| r.goals.len())
        .chain(std::iter::once(raw.sharpen_data.len()))
        .max()
        .unwrap_or(0);
    let count = raw.goal_columns_count.unwrap_or(longest).max(1);

    let roles = raw
        .roles
        .into_iter()
        .map(|r| normalize_role(r, count))
        .collect();
    let sharpen: Vec<GoalRecord> = raw.sharpen_data.into_iter().map(normalize_goal).collect();

    WeekDocument {
        roles,
        sharpen_data: fit_to_count(sharpen, count),
        goal_columns_count: count,
        week_start: raw.week_start.unwrap_or_default(),
        last_modified: raw.last_modified,
        version: raw.version,
    }
}

/// Parse and normalize a JSON document from any tier.
///
/// Malformed payloads read as absent; the caller falls through to the next
/// tier.
pub fn document_from_value(value: Value) -> Option<WeekDocument> {
    match serde_json::from_value::<RawWeekDocument>(value) {
        Ok(raw) => Some(normalize_document(raw)),
        Err(e) => {
            log::warn!("Discarding malformed week document: {e}");
            None
        }
    }
}

/// Parse and normalize a JSON structure template.
pub fn template_from_value(value: Value) -> Option<StructureTemplate> {
    match serde_json::from_value::<StructureTemplate>(value) {
        Ok(mut template) => {
            template.goal_columns_count = template.goal_columns_count.max(1);
            for role in &mut template.roles {
                // Templates carry shape only.
                role.goals.clear();
            }
            Some(template)
        }
        Err(e) => {
            log::warn!("Discarding malformed structure template: {e}");
            None
        }
    }
}
