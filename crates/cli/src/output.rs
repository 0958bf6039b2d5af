use etl_runtime::summary::{RunSummary, TableOutcome};

/// Human-oriented end-of-run report, printed after the batch regardless
/// of per-table outcomes.
pub fn print_summary(summary: &RunSummary) {
    println!("============================================================");
    println!("ETL run {}", summary.run_id);
    println!("------------------------------------------------------------");
    println!("{:<16} {}", "Tables", summary.outcomes.len());
    println!("{:<16} {}", "Succeeded", summary.succeeded());
    println!("{:<16} {}", "Skipped", summary.skipped());
    println!("{:<16} {}", "Failed", summary.failed());

    for (table, outcome) in &summary.outcomes {
        match outcome {
            TableOutcome::Succeeded { rows, watermark } => {
                let mark = watermark.as_deref().unwrap_or("-");
                println!("  {table:<24} ok    {rows} rows (watermark {mark})");
            }
            TableOutcome::Skipped => println!("  {table:<24} skip  no new data"),
            TableOutcome::Failed { error } => println!("  {table:<24} FAIL  {error}"),
        }
    }

    if !summary.failed_tables().is_empty() {
        println!("------------------------------------------------------------");
        println!("Failed tables: {}", summary.failed_tables().join(", "));
    }
    println!("============================================================");
}
