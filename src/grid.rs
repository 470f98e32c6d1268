//! In-memory planner grid.
//!
//! The grid is the single in-memory source of truth while a session is
//! open: role rows crossed with goal columns, plus the singleton "sharpen
//! the saw" reflection row. User intents mutate the model; rendering is a
//! projection of it and lives outside this crate. Serialization walks the
//! model in row order, which is why ordering is load-bearing throughout.

use rand::RngExt;

use crate::types::{GoalRecord, RoleEntry, StructureTemplate, WeekDocument};

/// Pastel palette for new role rows.
const ROLE_COLORS: [&str; 10] = [
    "#a8c8ec", "#b8d4b8", "#c8a8d8", "#f4d1a4", "#d8c8e8", "#f4a4a4", "#e8d4b8", "#d4e8b8",
    "#e8b8d4", "#b8e8d4",
];

/// Default number of goal columns for a fresh board.
const DEFAULT_GOAL_COLUMNS: usize = 4;

/// Pick a palette color for a new role.
pub fn random_role_color() -> String {
    let idx = rand::rng().random_range(0..ROLE_COLORS.len());
    ROLE_COLORS[idx].to_string()
}

/// Display slug for a role name: lowercase, whitespace collapsed to
/// hyphens. Used only for addressing, never as a key (names may repeat).
pub fn role_slug(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRow {
    pub name: String,
    pub color: String,
    pub cells: Vec<GoalRecord>,
}

impl RoleRow {
    fn new(name: &str, color: &str, columns: usize) -> Self {
        Self {
            name: name.to_string(),
            color: color.to_string(),
            cells: vec![GoalRecord::empty(); columns],
        }
    }
}

/// The editable board: ordered role rows, the reflection row, and the
/// current goal-column count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerGrid {
    rows: Vec<RoleRow>,
    sharpen: Vec<GoalRecord>,
    goal_columns: usize,
}

impl PlannerGrid {
    /// An empty grid with no roles and `columns` goal columns (floor 1).
    pub fn new(columns: usize) -> Self {
        let columns = columns.max(1);
        Self {
            rows: Vec::new(),
            sharpen: vec![GoalRecord::empty(); columns],
            goal_columns: columns,
        }
    }

    /// The default board shape used when no document and no template exist.
    pub fn default_board() -> Self {
        let mut grid = Self::new(DEFAULT_GOAL_COLUMNS);
        for (name, color) in [
            ("Individual", ROLE_COLORS[0]),
            ("Professional", ROLE_COLORS[1]),
            ("Family", ROLE_COLORS[2]),
            ("Community", ROLE_COLORS[3]),
        ] {
            grid.rows.push(RoleRow::new(name, color, DEFAULT_GOAL_COLUMNS));
        }
        grid
    }

    /// Seed a grid from a structure template: its roles, its column count,
    /// all goals empty.
    pub fn from_template(template: &StructureTemplate) -> Self {
        let columns = template.goal_columns_count.max(1);
        let mut grid = Self::new(columns);
        for role in &template.roles {
            grid.rows.push(RoleRow::new(&role.name, &role.color, columns));
        }
        grid
    }

    pub fn goal_columns(&self) -> usize {
        self.goal_columns
    }

    pub fn roles(&self) -> &[RoleRow] {
        &self.rows
    }

    pub fn sharpen_row(&self) -> &[GoalRecord] {
        &self.sharpen
    }

    // -- role operations ---------------------------------------------------

    /// Append a role with a random palette color.
    pub fn add_role(&mut self, name: &str) {
        let color = random_role_color();
        self.rows.push(RoleRow::new(name, &color, self.goal_columns));
    }

    pub fn add_role_with_color(&mut self, name: &str, color: &str) {
        self.rows.push(RoleRow::new(name, color, self.goal_columns));
    }

    /// Remove the last role row. Refuses to remove the only remaining role.
    pub fn remove_last_role(&mut self) -> bool {
        if self.rows.len() > 1 {
            self.rows.pop();
            true
        } else {
            false
        }
    }

    /// Delete a role row by position. Refuses to empty the board.
    pub fn delete_role(&mut self, index: usize) -> bool {
        if self.rows.len() > 1 && index < self.rows.len() {
            self.rows.remove(index);
            true
        } else {
            false
        }
    }

    pub fn rename_role(&mut self, index: usize, name: &str) {
        if let Some(row) = self.rows.get_mut(index) {
            row.name = name.to_string();
        }
    }

    pub fn set_role_color(&mut self, index: usize, color: &str) {
        if let Some(row) = self.rows.get_mut(index) {
            row.color = color.to_string();
        }
    }

    /// Duplicate a role row directly below the original, copying cell text
    /// and completion.
    pub fn duplicate_role(&mut self, index: usize, new_name: &str) -> bool {
        let Some(original) = self.rows.get(index) else {
            return false;
        };
        let mut copy = original.clone();
        copy.name = new_name.to_string();
        self.rows.insert(index + 1, copy);
        true
    }

    // -- cell operations ---------------------------------------------------

    pub fn edit_goal(&mut self, role: usize, column: usize, text: &str) {
        if let Some(cell) = self
            .rows
            .get_mut(role)
            .and_then(|row| row.cells.get_mut(column))
        {
            cell.text = text.to_string();
        }
    }

    pub fn toggle_completion(&mut self, role: usize, column: usize) {
        if let Some(cell) = self
            .rows
            .get_mut(role)
            .and_then(|row| row.cells.get_mut(column))
        {
            cell.completed = !cell.completed;
        }
    }

    pub fn edit_sharpen_goal(&mut self, column: usize, text: &str) {
        if let Some(cell) = self.sharpen.get_mut(column) {
            cell.text = text.to_string();
        }
    }

    pub fn toggle_sharpen_completion(&mut self, column: usize) {
        if let Some(cell) = self.sharpen.get_mut(column) {
            cell.completed = !cell.completed;
        }
    }

    /// Clear every goal cell (text and completion) across all rows.
    pub fn clear_goals(&mut self) {
        for row in &mut self.rows {
            for cell in &mut row.cells {
                *cell = GoalRecord::empty();
            }
        }
        for cell in &mut self.sharpen {
            *cell = GoalRecord::empty();
        }
    }

    // -- column operations -------------------------------------------------

    pub fn add_goal_column(&mut self) {
        self.reconcile_column_count(self.goal_columns + 1);
    }

    /// Remove the last goal column. Refuses to go below one column.
    pub fn remove_goal_column(&mut self) -> bool {
        if self.goal_columns > 1 {
            self.reconcile_column_count(self.goal_columns - 1);
            true
        } else {
            false
        }
    }

    /// Restructure every row (including the reflection row) to exactly
    /// `target` goal columns, floor 1. Existing cells keep their positions;
    /// added columns are empty; removal drops from the end.
    ///
    /// Must run before pouring a loaded document's goals, or indices
    /// misalign.
    pub fn reconcile_column_count(&mut self, target: usize) {
        let target = target.max(1);
        for row in &mut self.rows {
            row.cells.truncate(target);
            while row.cells.len() < target {
                row.cells.push(GoalRecord::empty());
            }
        }
        self.sharpen.truncate(target);
        while self.sharpen.len() < target {
            self.sharpen.push(GoalRecord::empty());
        }
        self.goal_columns = target;
    }

    // -- serialize / hydrate -----------------------------------------------

    /// Walk the grid in row order into a canonical week document.
    ///
    /// Never fails: whatever is structurally present is serialized, with
    /// names and goal text trimmed.
    pub fn serialize(&self, week_start_iso: &str) -> WeekDocument {
        let roles = self
            .rows
            .iter()
            .map(|row| RoleEntry {
                name: row.name.trim().to_string(),
                color: row.color.clone(),
                goals: row
                    .cells
                    .iter()
                    .map(|cell| GoalRecord {
                        text: cell.text.trim().to_string(),
                        completed: cell.completed,
                    })
                    .collect(),
            })
            .collect();

        WeekDocument {
            roles,
            sharpen_data: self
                .sharpen
                .iter()
                .map(|cell| GoalRecord {
                    text: cell.text.trim().to_string(),
                    completed: cell.completed,
                })
                .collect(),
            goal_columns_count: self.goal_columns,
            week_start: week_start_iso.to_string(),
            last_modified: None,
            version: None,
        }
    }

    /// Replace the board contents with a loaded (already normalized)
    /// document: columns are reconciled first, then role rows and the
    /// reflection row are poured in.
    pub fn hydrate(&mut self, doc: &WeekDocument) {
        self.reconcile_column_count(doc.goal_columns_count);
        self.rows = doc
            .roles
            .iter()
            .map(|role| {
                let mut row = RoleRow::new(&role.name, &role.color, self.goal_columns);
                for (i, goal) in role.goals.iter().take(self.goal_columns).enumerate() {
                    row.cells[i] = goal.clone();
                }
                row
            })
            .collect();
        for (i, goal) in doc
            .sharpen_data
            .iter()
            .take(self.goal_columns)
            .enumerate()
        {
            self.sharpen[i] = goal.clone();
        }
    }
}

impl Default for PlannerGrid {
    fn default() -> Self {
        Self::default_board()
    }
}
