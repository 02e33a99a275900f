//! Interactive requirements gathering on a line-oriented reader.

use std::io::{BufRead, BufReader, Stdin, Write};
use std::sync::Mutex;

use specforge_core::pipeline::RequirementsPrompter;
use specforge_core::types::{Requirements, WorkflowType};

pub struct LinePrompter<R> {
    input: Mutex<R>,
}

impl LinePrompter<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(std::io::stdin()))
    }
}

impl<R: BufRead> LinePrompter<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }

    /// `None` at end of input.
    fn ask(input: &mut R, question: &str) -> std::io::Result<Option<String>> {
        print!("{question}");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn ask_list(input: &mut R, question: &str) -> std::io::Result<Vec<String>> {
        println!("{question} (one per line, blank line to finish)");
        let mut items = Vec::new();
        while let Some(line) = Self::ask(input, "  > ")? {
            if line.is_empty() {
                break;
            }
            items.push(line);
        }
        Ok(items)
    }
}

impl<R: BufRead + Send> RequirementsPrompter for LinePrompter<R> {
    fn gather(&self, task: Option<&str>) -> std::io::Result<Option<Requirements>> {
        let mut input = self
            .input
            .lock()
            .map_err(|_| std::io::Error::other("prompter input poisoned"))?;
        let input = &mut *input;

        println!("\n=== Requirements ===");
        let description = match task {
            Some(t) => {
                println!("Task: {t}");
                t.to_string()
            }
            None => match Self::ask(input, "What do you want to build? ")? {
                Some(t) if !t.is_empty() => t,
                _ => return Ok(None),
            },
        };

        let kinds: Vec<&str> = WorkflowType::all().iter().map(|w| w.as_str()).collect();
        let workflow_type = match Self::ask(input, &format!("Workflow type [{}] (feature): ", kinds.join("/")))? {
            None => return Ok(None),
            Some(s) if s.is_empty() => WorkflowType::Feature,
            Some(s) => s.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "using 'feature'");
                WorkflowType::Feature
            }),
        };

        let services = match Self::ask(input, "Services involved (comma separated, blank for none): ")? {
            None => return Ok(None),
            Some(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        };

        let acceptance_criteria = Self::ask_list(input, "Acceptance criteria")?;
        let constraints = Self::ask_list(input, "Constraints")?;

        let mut req = Requirements::from_task(description);
        req.workflow_type = workflow_type;
        req.services_involved = services;
        req.acceptance_criteria = acceptance_criteria;
        req.constraints = constraints;
        Ok(Some(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn gathers_all_fields() {
        let input = "Add CSV export\nbugfix\napi, web\nExports all rows\n\nNo new deps\n\n";
        let p = LinePrompter::new(Cursor::new(input.as_bytes()));
        let req = p.gather(None).unwrap().unwrap();
        assert_eq!(req.task_description, "Add CSV export");
        assert_eq!(req.workflow_type, WorkflowType::Bugfix);
        assert_eq!(req.services_involved, vec!["api", "web"]);
        assert_eq!(req.acceptance_criteria, vec!["Exports all rows"]);
        assert_eq!(req.constraints, vec!["No new deps"]);
    }

    #[test]
    fn task_argument_skips_the_description_question() {
        let p = LinePrompter::new(Cursor::new("\n\n\n\n".as_bytes()));
        let req = p.gather(Some("Fix login")).unwrap().unwrap();
        assert_eq!(req.task_description, "Fix login");
        assert_eq!(req.workflow_type, WorkflowType::Feature);
        assert!(req.services_involved.is_empty());
    }

    #[test]
    fn empty_input_cancels() {
        let p = LinePrompter::new(Cursor::new("".as_bytes()));
        assert!(p.gather(None).unwrap().is_none());
        let p = LinePrompter::new(Cursor::new("\n".as_bytes()));
        assert!(p.gather(None).unwrap().is_none());
    }
}
