use std::path::{Path, PathBuf};

/// Prompt templates, loaded from `<dir>/<name>.md` when a directory is
/// configured and otherwise taken from the short built-ins below.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    dir: Option<PathBuf>,
}

impl PromptLibrary {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn builtin() -> Self {
        Self { dir: None }
    }

    /// Template text, or the reason it could not be loaded.
    pub fn load(&self, name: &str) -> Result<String, String> {
        match &self.dir {
            Some(dir) => {
                let path = dir.join(format!("{name}.md"));
                std::fs::read_to_string(&path)
                    .map_err(|_| format!("Prompt not found: {}", path.display()))
            }
            None => builtin(name)
                .map(str::to_string)
                .ok_or_else(|| format!("Prompt not found: {name}")),
        }
    }

    /// Template followed by the run's location block and any extra context.
    pub fn render(
        &self,
        name: &str,
        task_dir: &Path,
        project_dir: &Path,
        extra: &str,
    ) -> Result<String, String> {
        let mut prompt = self.load(name)?;
        prompt.push_str("\n\n---\n\n");
        prompt.push_str(&format!("**Spec Directory**: {}\n", task_dir.display()));
        prompt.push_str(&format!("**Project Directory**: {}\n", project_dir.display()));
        if !extra.trim().is_empty() {
            prompt.push('\n');
            prompt.push_str(extra.trim_end());
            prompt.push('\n');
        }
        Ok(prompt)
    }
}

fn builtin(name: &str) -> Option<&'static str> {
    let text = match name {
        "complexity_assessor" => {
            "Assess the complexity of the task described below. Write complexity_assessment.json \
             with complexity (simple|standard|complex), confidence, reasoning, analysis, \
             recommended_phases and flags {needs_research, needs_self_critique}."
        }
        "spec_quick" => {
            "Write a concise spec.md for this small change, then a one-phase \
             implementation_plan.json with a single chunk."
        }
        "spec_researcher" => {
            "Research the external integrations this task depends on and record findings in \
             research.json under integrations_researched."
        }
        "spec_writer" => {
            "Write spec.md from requirements.json and context.json. Include the sections \
             Overview, Workflow Type, Task Scope and Success Criteria."
        }
        "spec_critic" => {
            "Critique spec.md, fix the issues you find in place, and write critique_report.json \
             with issues_found, issues_fixed or no_issues_found, and critique_summary."
        }
        "planner" => {
            "Write implementation_plan.json: ordered phases, each with chunks that have an id, \
             description, service, status and a verification spec."
        }
        "validation_fixer" => "Fix the validation errors listed below in the spec files.",
        "roadmap_discovery" => {
            "Analyse the project and write roadmap_discovery.json with project_name, \
             target_audience, product_vision and current_state."
        }
        "roadmap_features" => {
            "Generate a prioritised feature roadmap and write roadmap.json with vision, phases \
             and at least three features."
        }
        "ideation_low_hanging_fruit" => "Suggest quick wins that build on existing patterns.",
        "ideation_ui_ux" => "Suggest UI and UX improvements.",
        "ideation_high_value" => "Suggest high-value features for the target audience.",
        "ideation_documentation" => "Identify documentation gaps.",
        "ideation_security" => "Identify security hardening opportunities.",
        "ideation_performance" => "Identify performance optimisations.",
        _ => return None,
    };
    Some(text)
}
