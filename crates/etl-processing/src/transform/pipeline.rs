use crate::error::TransformError;
use model::records::chunk::DataChunk;
use std::sync::Arc;

/// One pure stage of the chunk transform pipeline.
pub trait ChunkTransform: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, chunk: DataChunk) -> Result<DataChunk, TransformError>;
}

/// Fixed ordered pipeline of chunk transforms.
///
/// Stages run in registration order; an empty chunk short-circuits since
/// no stage has anything to do with it.
#[derive(Clone, Default)]
pub struct TransformPipeline {
    transforms: Vec<Arc<dyn ChunkTransform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
        }
    }

    pub fn add_transform<T: ChunkTransform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn add_if<T, F>(self, condition: bool, factory: F) -> Self
    where
        T: ChunkTransform + 'static,
        F: FnOnce() -> T,
    {
        if condition {
            self.add_transform(factory())
        } else {
            self
        }
    }

    pub fn apply(&self, chunk: DataChunk) -> Result<DataChunk, TransformError> {
        if chunk.is_empty() {
            return Ok(chunk);
        }
        self.transforms
            .iter()
            .try_fold(chunk, |chunk, transform| transform.apply(chunk))
    }
}
