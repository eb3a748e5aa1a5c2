//! Task definitions: unpersisted descriptions of work.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue, json};

use taskforge_core::{TaskId, UserId};

/// Proficiency assumed for any (user, skill) pair without a record.
pub const DEFAULT_PROFICIENCY: u8 = 50;

/// Named capability an employee can be rated on (0–100).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Inspection,
    Preparation,
    Sales,
    Delivery,
    Cleaning,
    Maintenance,
    Accounting,
}

impl Skill {
    pub const ALL: [Skill; 7] = [
        Skill::Inspection,
        Skill::Preparation,
        Skill::Sales,
        Skill::Delivery,
        Skill::Cleaning,
        Skill::Maintenance,
        Skill::Accounting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Skill::Inspection => "inspection",
            Skill::Preparation => "preparation",
            Skill::Sales => "sales",
            Skill::Delivery => "delivery",
            Skill::Cleaning => "cleaning",
            Skill::Maintenance => "maintenance",
            Skill::Accounting => "accounting",
        }
    }
}

/// Skill → proficiency (0–100) for one user.
pub type SkillProfile = BTreeMap<Skill, u8>;

/// Kind of work; doubles as the key for historical performance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Inspection,
    Preparation,
    Packaging,
    Delivery,
    Cleaning,
    Maintenance,
    Accounting,
    Sales,
    Sticker,
    StockOrder,
    WarrantyInspect,
    WarrantySend,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Inspection => "inspection",
            TaskKind::Preparation => "preparation",
            TaskKind::Packaging => "packaging",
            TaskKind::Delivery => "delivery",
            TaskKind::Cleaning => "cleaning",
            TaskKind::Maintenance => "maintenance",
            TaskKind::Accounting => "accounting",
            TaskKind::Sales => "sales",
            TaskKind::Sticker => "sticker",
            TaskKind::StockOrder => "stock_order",
            TaskKind::WarrantyInspect => "warranty_inspect",
            TaskKind::WarrantySend => "warranty_send",
        }
    }

    /// The skill that dominates this kind of work.
    ///
    /// Used when a task has to be re-ranked without its original definition.
    pub fn primary_skill(&self) -> Skill {
        match self {
            TaskKind::Inspection | TaskKind::WarrantyInspect => Skill::Inspection,
            TaskKind::Preparation | TaskKind::Packaging | TaskKind::Sticker => Skill::Preparation,
            TaskKind::Delivery | TaskKind::WarrantySend => Skill::Delivery,
            TaskKind::Cleaning => Skill::Cleaning,
            TaskKind::Maintenance => Skill::Maintenance,
            TaskKind::Accounting | TaskKind::StockOrder => Skill::Accounting,
            TaskKind::Sales => Skill::Sales,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Only routine work may skip the manager.
    pub fn allows_auto_assign(&self) -> bool {
        matches!(self, Priority::Low | Priority::Normal)
    }
}

/// A description of work before it becomes a tracked task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub task_kind: TaskKind,
    pub title: String,
    pub title_localized: String,
    pub priority: Priority,
    pub required_skills: BTreeSet<Skill>,
    /// Always positive.
    pub estimated_minutes: u32,
    pub source_reference: JsonMap<String, JsonValue>,
    pub requires_approval: bool,
}

impl TaskDefinition {
    /// Start a definition with routine defaults: normal priority, no required
    /// skills, one hour, no approval.
    pub fn new(task_kind: TaskKind, title: impl Into<String>, title_localized: impl Into<String>) -> Self {
        Self {
            task_kind,
            title: title.into(),
            title_localized: title_localized.into(),
            priority: Priority::Normal,
            required_skills: BTreeSet::new(),
            estimated_minutes: 60,
            source_reference: JsonMap::new(),
            requires_approval: false,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_skills(mut self, skills: impl IntoIterator<Item = Skill>) -> Self {
        self.required_skills = skills.into_iter().collect();
        self
    }

    /// Zero is bumped to one minute.
    pub fn with_estimated_minutes(mut self, minutes: u32) -> Self {
        self.estimated_minutes = minutes.max(1);
        self
    }

    pub fn with_source_reference(mut self, reference: JsonMap<String, JsonValue>) -> Self {
        self.source_reference = reference;
        self
    }

    pub fn requiring_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    /// Auto-assign iff priority is low/normal **and** no approval is required,
    /// regardless of how well the best candidate scores.
    pub fn auto_assignable(&self) -> bool {
        self.priority.allows_auto_assign() && !self.requires_approval
    }
}

/// A persisted task that is still open, as reported by task management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTask {
    pub task_id: TaskId,
    pub task_kind: TaskKind,
    pub title: String,
    pub priority: Priority,
    pub estimated_minutes: u32,
}

impl OpenTask {
    /// Rebuild a definition good enough for re-ranking: the kind's primary skill
    /// stands in for the original skill set.
    pub fn to_definition(&self) -> TaskDefinition {
        let mut reference = JsonMap::new();
        reference.insert("task_id".to_string(), json!(self.task_id.to_string()));

        TaskDefinition::new(self.task_kind, self.title.clone(), self.title.clone())
            .with_priority(self.priority)
            .with_skills([self.task_kind.primary_skill()])
            .with_estimated_minutes(self.estimated_minutes)
            .with_source_reference(reference)
    }
}

/// A task that task management has just closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTask {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub task_kind: TaskKind,
    /// Finished no later than its due time; tasks without one count as on time.
    pub on_time: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_assign_requires_routine_priority_and_no_approval() {
        let base = TaskDefinition::new(TaskKind::Cleaning, "t", "t");

        let cases = [
            (Priority::Low, false, true),
            (Priority::Normal, false, true),
            (Priority::High, false, false),
            (Priority::Urgent, false, false),
            (Priority::Low, true, false),
            (Priority::Normal, true, false),
        ];

        for (priority, approval, expected) in cases {
            let def = base.clone().with_priority(priority).requiring_approval(approval);
            assert_eq!(def.auto_assignable(), expected, "{priority:?}/{approval}");
        }
    }

    #[test]
    fn estimated_minutes_stays_positive() {
        let def = TaskDefinition::new(TaskKind::Sticker, "t", "t").with_estimated_minutes(0);
        assert_eq!(def.estimated_minutes, 1);
    }

    #[test]
    fn open_task_rebuilds_with_primary_skill() {
        let open = OpenTask {
            task_id: TaskId::new(),
            task_kind: TaskKind::WarrantySend,
            title: "Send device".to_string(),
            priority: Priority::High,
            estimated_minutes: 30,
        };

        let def = open.to_definition();
        assert_eq!(def.required_skills, BTreeSet::from([Skill::Delivery]));
        assert_eq!(def.priority, Priority::High);
        assert_eq!(def.source_reference["task_id"], open.task_id.to_string());
    }

    #[test]
    fn kinds_serialize_snake_case() {
        let v = serde_json::to_value(TaskKind::StockOrder).unwrap();
        assert_eq!(v, "stock_order");
    }
}
