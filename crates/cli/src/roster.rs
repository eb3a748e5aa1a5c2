//! Team roster file: who can take work, and how good they are at it.
//!
//! ```json
//! [
//!   { "id": "0190f1c2-...", "name": "Sara", "skills": { "delivery": 90 }, "present": true },
//!   { "name": "Omar", "skills": { "inspection": 75, "preparation": 60 } }
//! ]
//! ```
//!
//! `id` is generated when missing; `present` defaults to true.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use taskforge_core::UserId;
use taskforge_distribution::SkillProfile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    #[serde(default = "UserId::new")]
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub skills: SkillProfile,
    #[serde(default = "present_by_default")]
    pub present: bool,
}

fn present_by_default() -> bool {
    true
}

impl RosterEntry {
    pub fn anonymous() -> Self {
        Self {
            id: UserId::new(),
            name: None,
            skills: SkillProfile::new(),
            present: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    pub entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn parse(json: &str) -> anyhow::Result<Self> {
        let roster: Roster = serde_json::from_str(json).context("roster is not a JSON array of employees")?;
        roster.check_unique_ids()?;
        Ok(roster)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path).with_context(|| format!("reading roster {}", path.display()))?;
        Self::parse(&json).with_context(|| format!("parsing roster {}", path.display()))
    }

    /// `count` employees with no recorded skills.
    pub fn anonymous(count: usize) -> Self {
        Self {
            entries: (0..count).map(|_| RosterEntry::anonymous()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_unique_ids(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.id) {
                anyhow::bail!("duplicate employee id {}", entry.id);
            }
        }
        Ok(())
    }
}
