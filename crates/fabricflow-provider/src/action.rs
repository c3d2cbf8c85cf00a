//! Planned actions for cluster resources

use serde::{Deserialize, Serialize};

/// What applying a configuration change would do to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// No changes needed
    NoOp,
    /// Change the resource in place
    Update,
    /// Destroy and recreate the resource
    Replace,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::NoOp => write!(f, "no-op"),
            ActionType::Update => write!(f, "update"),
            ActionType::Replace => write!(f, "replace"),
        }
    }
}

/// A planned action and the attributes that caused it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,

    /// Resource type (e.g. "application", "service")
    pub resource_type: String,

    /// Resource identifier
    pub resource_id: String,

    /// Changed attributes, in the order they were detected
    pub changes: Vec<String>,
}

impl Action {
    pub fn no_op(resource_type: &str, resource_id: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::NoOp,
            resource_type: resource_type.to_string(),
            resource_id: resource_id.into(),
            changes: Vec::new(),
        }
    }

    /// Record a changed attribute. A replacing change wins over an in-place one.
    pub fn record(&mut self, attribute: &str, replaces: bool) {
        self.changes.push(attribute.to_string());
        self.action_type = match (self.action_type, replaces) {
            (_, true) | (ActionType::Replace, _) => ActionType::Replace,
            _ => ActionType::Update,
        };
    }

    pub fn has_changes(&self) -> bool {
        self.action_type != ActionType::NoOp
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.action_type, self.resource_type, self.resource_id)?;
        if !self.changes.is_empty() {
            write!(f, " ({})", self.changes.join(", "))?;
        }
        Ok(())
    }
}

/// Plan containing the actions for a set of resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn has_changes(&self) -> bool {
        self.actions.iter().any(Action::has_changes)
    }

    pub fn summary(&self) -> PlanSummary {
        let count = |t: ActionType| self.actions.iter().filter(|a| a.action_type == t).count();
        PlanSummary {
            update: count(ActionType::Update),
            replace: count(ActionType::Replace),
            no_change: count(ActionType::NoOp),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub update: usize,
    pub replace: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to update, {} to replace, {} unchanged",
            self.update, self.replace, self.no_change
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_wins() {
        let mut action = Action::no_op("application", "fabric:/Shop");
        assert!(!action.has_changes());
        action.record("parameters", false);
        assert_eq!(action.action_type, ActionType::Update);
        action.record("type_name", true);
        action.record("type_version", false);
        assert_eq!(action.action_type, ActionType::Replace);
        assert_eq!(
            action.to_string(),
            "replace application fabric:/Shop (parameters, type_name, type_version)"
        );
    }

    #[test]
    fn test_plan_summary() {
        let mut update = Action::no_op("service", "fabric:/Shop/Web");
        update.record("default_move_cost", false);
        let plan = Plan::new(vec![update, Action::no_op("application_type", "Shop/1.0.0")]);
        assert!(plan.has_changes());
        assert_eq!(plan.summary().to_string(), "1 to update, 0 to replace, 1 unchanged");
    }
}
