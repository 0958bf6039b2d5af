use std::collections::BTreeMap;
use std::fmt;

/// Terminal outcome of one table in a batch run.
#[derive(Debug, Clone)]
pub enum TableOutcome {
    /// The table's staging was promoted; `watermark` is the new mark for
    /// incremental tables.
    Succeeded {
        rows: usize,
        watermark: Option<String>,
    },
    /// No new data; destination and state untouched.
    Skipped,
    /// Failed after exhausting retries (or fatally).
    Failed { error: String },
}

/// Per-table outcome summary for one batch run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run_id: String,
    pub outcomes: BTreeMap<String, TableOutcome>,
}

impl RunSummary {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            outcomes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, dest_table: impl Into<String>, outcome: TableOutcome) {
        self.outcomes.insert(dest_table.into(), outcome);
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, TableOutcome::Succeeded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, TableOutcome::Skipped))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, TableOutcome::Failed { .. }))
            .count()
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TableOutcome::Failed { .. }))
            .map(|(table, _)| table.as_str())
            .collect()
    }

    /// Whether at least one table actually loaded new data — the trigger
    /// condition for downstream cache invalidation.
    pub fn any_loaded(&self) -> bool {
        self.succeeded() > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ETL run {} summary", self.run_id)?;
        writeln!(f, "  tables:    {}", self.outcomes.len())?;
        writeln!(f, "  succeeded: {}", self.succeeded())?;
        writeln!(f, "  skipped:   {}", self.skipped())?;
        writeln!(f, "  failed:    {}", self.failed())?;
        for (table, outcome) in &self.outcomes {
            match outcome {
                TableOutcome::Succeeded { rows, watermark } => {
                    let mark = watermark.as_deref().unwrap_or("-");
                    writeln!(f, "    {table}: ok ({rows} rows, watermark {mark})")?;
                }
                TableOutcome::Skipped => writeln!(f, "    {table}: no new data")?,
                TableOutcome::Failed { error } => writeln!(f, "    {table}: FAILED ({error})")?,
            }
        }
        Ok(())
    }
}
