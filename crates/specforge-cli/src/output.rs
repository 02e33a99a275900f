use serde::Serialize;
use specforge_core::pipeline::RunSummary;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  "));

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  "));
    }
}

/// Phase table, pipeline details and created files for a finished run.
pub fn print_summary(summary: &RunSummary) {
    let rows = summary
        .results
        .iter()
        .map(|r| {
            let status = match (r.success, r.degraded) {
                (true, false) => "ok",
                (true, true) => "degraded",
                (false, _) => "FAILED",
            };
            vec![
                r.phase.clone(),
                status.to_string(),
                r.retries.to_string(),
                r.items.map(|n| n.to_string()).unwrap_or_default(),
            ]
        })
        .collect();
    println!();
    print_table(&["PHASE", "STATUS", "RETRIES", "ITEMS"], rows);

    if !summary.details.is_empty() {
        println!();
        for (key, value) in &summary.details {
            println!("{key}: {value}");
        }
    }

    println!();
    println!("Directory: {}", summary.task_dir.display());
    let files = summary.files_created();
    if !files.is_empty() {
        println!("Files:");
        for f in files {
            let shown = f.strip_prefix(&summary.task_dir).unwrap_or(f);
            println!("  {}", shown.display());
        }
    }
    if let Some(failed) = summary.failed_phase() {
        println!();
        println!("Phase '{}' failed:", failed.phase);
        for err in &failed.errors {
            println!("  - {err}");
        }
    }
}
