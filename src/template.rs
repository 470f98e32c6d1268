//! Structure template policy.
//!
//! The template is the reusable shape (role names, colors, column count)
//! that seeds weeks with no saved document. It is deliberately sticky:
//! adding or removing a role is structural and propagates; editing goal
//! text, toggling completion, or changing this week's column count is not
//! and must not retroactively reshape other weeks.

use crate::types::{RoleEntry, StructureTemplate, WeekDocument};

/// Whether a just-saved week should replace the stored template.
///
/// True iff no template exists yet or the role cardinality changed.
pub fn should_update_template(roles: &[RoleEntry], stored: Option<&StructureTemplate>) -> bool {
    match stored {
        None => true,
        Some(template) => template.roles.len() != roles.len(),
    }
}

/// Derive a template from a week document: the role shape with empty
/// goals, plus the document's column count.
pub fn template_from_document(doc: &WeekDocument) -> StructureTemplate {
    StructureTemplate {
        roles: doc
            .roles
            .iter()
            .map(|role| RoleEntry {
                name: role.name.clone(),
                color: role.color.clone(),
                goals: Vec::new(),
            })
            .collect(),
        goal_columns_count: doc.goal_columns_count,
        last_modified: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GoalRecord;

    fn doc_with_roles(names: &[&str]) -> WeekDocument {
        WeekDocument {
            roles: names
                .iter()
                .map(|name| RoleEntry {
                    name: name.to_string(),
                    color: "#a8c8ec".to_string(),
                    goals: vec![GoalRecord {
                        text: "something".to_string(),
                        completed: true,
                    }],
                })
                .collect(),
            sharpen_data: vec![GoalRecord::empty()],
            goal_columns_count: 1,
            week_start: "2024-06-09T00:00:00Z".to_string(),
            last_modified: None,
            version: None,
        }
    }

    #[test]
    fn test_missing_template_always_updates() {
        let doc = doc_with_roles(&["A"]);
        assert!(should_update_template(&doc.roles, None));
    }

    #[test]
    fn test_same_cardinality_does_not_update() {
        let doc = doc_with_roles(&["A", "B"]);
        let stored = template_from_document(&doc_with_roles(&["X", "Y"]));
        assert!(!should_update_template(&doc.roles, Some(&stored)));
    }

    #[test]
    fn test_role_count_change_updates() {
        let doc = doc_with_roles(&["A", "B", "C"]);
        let stored = template_from_document(&doc_with_roles(&["X", "Y"]));
        assert!(should_update_template(&doc.roles, Some(&stored)));
    }

    #[test]
    fn test_template_strips_goals() {
        let template = template_from_document(&doc_with_roles(&["A"]));
        assert!(template.roles[0].goals.is_empty());
        assert_eq!(template.goal_columns_count, 1);
        assert_eq!(template.roles[0].name, "A");
    }
}
