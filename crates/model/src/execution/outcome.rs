use crate::records::chunk::DataChunk;

/// Result of pushing one chunk through the transform pipeline.
///
/// Rejection is data, not control flow: a chunk that fails its data
/// contract comes back as `Rejected` (rows already written to the
/// dead-letter sink), and an unexpected internal error comes back as
/// `Failed` — in both cases the caller simply moves on to the next chunk.
#[derive(Debug)]
pub enum ChunkOutcome {
    /// The chunk satisfies the destination contract exactly.
    Clean(DataChunk),
    /// The whole chunk was rejected by contract validation.
    Rejected { rows: usize, reasons: Vec<String> },
    /// An unexpected error; the chunk was discarded.
    Failed { message: String },
}

impl ChunkOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, ChunkOutcome::Clean(_))
    }
}
