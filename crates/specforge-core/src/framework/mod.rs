//! Read-only adapters that present external planning frameworks through
//! one work model.

pub mod bmad;
pub mod model;
pub mod native;

use std::path::Path;

pub use model::{
    map_bmad_status, map_native_status, Checkpoint, Glossary, ProjectStatus, Task,
    UnifiedStatus, WorkUnit,
};

use crate::error::{ForgeError, Result};

/// Closed set of supported frameworks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    Bmad,
    Native,
}

impl Framework {
    pub fn all() -> &'static [Framework] {
        &[Framework::Bmad, Framework::Native]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Framework::Bmad => "bmad",
            Framework::Native => "native",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Framework::Bmad => "BMAD Method",
            Framework::Native => "Native",
        }
    }

    pub fn glossary(self) -> Glossary {
        match self {
            Framework::Bmad => model::BMAD_GLOSSARY,
            Framework::Native => model::NATIVE_GLOSSARY,
        }
    }

    /// Whether the project carries this framework's planning files.
    pub fn detect(self, project: &Path) -> bool {
        match self {
            Framework::Bmad => bmad::find_sprint_status(project).is_some(),
            Framework::Native => project.join(crate::paths::SPECS_DIR).is_dir(),
        }
    }

    pub fn parse_work_units(self, project: &Path) -> Result<Vec<WorkUnit>> {
        match self {
            Framework::Bmad => bmad::parse_work_units(project),
            Framework::Native => native::parse_work_units(project),
        }
    }

    pub fn parse_tasks(self, project: &Path, work_unit_id: &str) -> Result<Vec<Task>> {
        match self {
            Framework::Bmad => bmad::parse_tasks(project, work_unit_id),
            Framework::Native => native::parse_tasks(project, work_unit_id),
        }
    }

    pub fn get_status(self, project: &Path) -> Result<ProjectStatus> {
        let units = self.parse_work_units(project)?;
        Ok(ProjectStatus::from_units(self.as_str(), units))
    }
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit name lookup over the supported frameworks.
#[derive(Debug, Clone)]
pub struct FrameworkRegistry {
    frameworks: Vec<Framework>,
}

impl Default for FrameworkRegistry {
    fn default() -> Self {
        Self {
            frameworks: Framework::all().to_vec(),
        }
    }
}

impl FrameworkRegistry {
    pub fn names(&self) -> Vec<&'static str> {
        self.frameworks.iter().map(|f| f.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Result<Framework> {
        let wanted = name.trim().to_ascii_lowercase();
        self.frameworks
            .iter()
            .copied()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| ForgeError::UnknownFramework {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    /// First framework whose planning files exist in the project.
    pub fn detect(&self, project: &Path) -> Option<Framework> {
        self.frameworks.iter().copied().find(|f| f.detect(project))
    }
}
