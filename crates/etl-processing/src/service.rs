use crate::contract::registry::contract_for;
use crate::contract::validator::validate_chunk;
use crate::dead_letter::DeadLetterWriter;
use crate::transform::normalize::TypeNormalization;
use crate::transform::pipeline::TransformPipeline;
use crate::transform::rename_clean::RenameClean;
use crate::transform::time_offset::TimeOffsetCorrection;
use etl_config::{offsets::TimeOffsets, table_spec::TableSpec};
use model::execution::outcome::ChunkOutcome;
use model::execution::rejected_row::{ProcessingStage, RejectedRow};
use model::records::chunk::DataChunk;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, warn};

/// Drives one table's chunks through the transform pipeline and the data
/// contract.
///
/// Failure never escapes as an error: a chunk that violates its contract
/// comes back as `Rejected` with its violating rows already persisted to
/// the dead-letter sink, and an unexpected transform error comes back as
/// `Failed`. The caller just keeps feeding chunks.
pub struct ChunkProcessor {
    dest_table: String,
    run_id: String,
    pipeline: TransformPipeline,
    dead_letter: DeadLetterWriter,
}

impl ChunkProcessor {
    pub fn for_table(
        spec: &TableSpec,
        offsets: &TimeOffsets,
        dead_letter_dir: PathBuf,
        run_id: impl Into<String>,
    ) -> Self {
        let mut pipeline = TransformPipeline::new();
        if let Some(stage) = TimeOffsetCorrection::for_table(spec, offsets) {
            pipeline = pipeline.add_transform(stage);
        }
        let pipeline = pipeline
            .add_transform(RenameClean::for_table(spec))
            .add_transform(TypeNormalization::for_table(spec));

        Self {
            dest_table: spec.dest_table.clone(),
            run_id: run_id.into(),
            pipeline,
            dead_letter: DeadLetterWriter::new(dead_letter_dir),
        }
    }

    /// Transform and validate one chunk.
    pub fn process(&self, chunk: DataChunk) -> ChunkOutcome {
        let transformed = match self.pipeline.apply(chunk) {
            Ok(chunk) => chunk,
            Err(err) => {
                error!(
                    "transform for '{}' failed, discarding chunk: {err}",
                    self.dest_table
                );
                return ChunkOutcome::Failed {
                    message: err.to_string(),
                };
            }
        };

        if transformed.is_empty() {
            return ChunkOutcome::Clean(transformed);
        }

        let Some(contract) = contract_for(&self.dest_table) else {
            warn!(
                "no contract declared for '{}', skipping validation",
                self.dest_table
            );
            return ChunkOutcome::Clean(transformed);
        };

        match validate_chunk(contract, &transformed) {
            Ok(validated) => ChunkOutcome::Clean(validated),
            Err(violation) => {
                error!(
                    "contract validation for '{}' failed: {}",
                    self.dest_table,
                    violation.reasons().join(", ")
                );

                let rejected = self.rejected_rows(&transformed, &violation);
                if let Err(err) = self.dead_letter.write_batch(&self.dest_table, &rejected) {
                    // A broken dead-letter sink must not take the pipeline
                    // down with it.
                    error!("could not persist rejected rows: {err}");
                }

                ChunkOutcome::Rejected {
                    rows: transformed.len(),
                    reasons: violation.reasons(),
                }
            }
        }
    }

    /// One dead-letter record per violating row; structural violations
    /// with no row attribution produce a single chunk-level record.
    fn rejected_rows(
        &self,
        chunk: &DataChunk,
        violation: &crate::error::ContractViolation,
    ) -> Vec<RejectedRow> {
        let rows = violation.violating_rows();
        if rows.is_empty() {
            let case = &violation.cases[0];
            return vec![RejectedRow::new(
                &self.dest_table,
                ProcessingStage::Validation,
                case.rule.clone(),
                case.message.clone(),
                HashMap::new(),
                &self.run_id,
            )];
        }

        rows.into_iter()
            .map(|row_index| {
                let cases = violation.cases_for_row(row_index);
                let rule = cases
                    .iter()
                    .map(|c| c.rule.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                let message = cases
                    .iter()
                    .map(|c| c.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                RejectedRow::new(
                    &self.dest_table,
                    ProcessingStage::Validation,
                    rule,
                    message,
                    chunk.row_map(row_index),
                    &self.run_id,
                )
            })
            .collect()
    }
}
