use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DevhubError;

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Feature,
    Release,
    Note,
}

impl EntityKind {
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Project,
            EntityKind::Feature,
            EntityKind::Release,
            EntityKind::Note,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Feature => "feature",
            EntityKind::Release => "release",
            EntityKind::Note => "note",
        }
    }

    /// Remote table (and store collection) name.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::Feature => "features",
            EntityKind::Release => "releases",
            EntityKind::Note => "notes",
        }
    }

    /// Whether rows of this kind hang off a project.
    pub fn is_project_child(self) -> bool {
        !matches!(self, EntityKind::Project)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = DevhubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s || k.table() == s)
            .ok_or_else(|| DevhubError::validation(format!("unknown entity kind '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// FeatureStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureStatus {
    #[default]
    Planned,
    InProgress,
    Done,
}

impl FeatureStatus {
    pub fn all() -> &'static [FeatureStatus] {
        &[
            FeatureStatus::Planned,
            FeatureStatus::InProgress,
            FeatureStatus::Done,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureStatus::Planned => "planned",
            FeatureStatus::InProgress => "in-progress",
            FeatureStatus::Done => "done",
        }
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureStatus {
    type Err = DevhubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureStatus::all()
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DevhubError::validation(format!("unknown feature status '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// ReleaseStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    #[default]
    Planned,
    Upcoming,
    Released,
}

impl ReleaseStatus {
    pub fn all() -> &'static [ReleaseStatus] {
        &[
            ReleaseStatus::Planned,
            ReleaseStatus::Upcoming,
            ReleaseStatus::Released,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseStatus::Planned => "planned",
            ReleaseStatus::Upcoming => "upcoming",
            ReleaseStatus::Released => "released",
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseStatus {
    type Err = DevhubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReleaseStatus::all()
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DevhubError::validation(format!("unknown release status '{s}'")))
    }
}
