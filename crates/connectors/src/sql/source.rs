use crate::error::ExtractionError;
use crate::sql::decode::{column_names, decode_row};
use crate::sql::query::{build_select, source_columns};
use async_trait::async_trait;
use etl_config::table_spec::TableSpec;
use futures_util::StreamExt;
use model::core::value::parse_timestamp;
use model::core::value::Value;
use model::records::chunk::DataChunk;
use std::pin::Pin;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, RowStream};
use tracing::{error, info};

/// Seam between the orchestrator and a concrete source database.
///
/// `open` starts one extraction pass for one table; the returned stream is
/// finite, yields chunks in source order, and is restartable only by
/// calling `open` again from scratch.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    async fn open(
        &self,
        spec: &TableSpec,
        watermark: &str,
        chunk_size: usize,
    ) -> Result<Box<dyn ChunkStream>, ExtractionError>;
}

/// A lazy sequence of bounded chunks for one table within one pass.
#[async_trait]
pub trait ChunkStream: Send {
    /// The next chunk, or `None` once the pass is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<DataChunk>, ExtractionError>;
}

/// Production source: one Postgres connection per extraction pass, rows
/// streamed through `query_raw` and grouped into fixed-size chunks so
/// memory stays independent of table size.
pub struct PgChunkSource {
    dsn: String,
}

impl PgChunkSource {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self { dsn: dsn.into() }
    }
}

async fn connect_source(dsn: &str) -> Result<Client, ExtractionError> {
    let (client, connection) = tokio_postgres::connect(dsn, NoTls)
        .await
        .map_err(ExtractionError::Connect)?;
    // The connection future drives the socket; it ends when the client is
    // dropped.
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!("source connection error: {err}");
        }
    });
    Ok(client)
}

#[async_trait]
impl ChunkSource for PgChunkSource {
    async fn open(
        &self,
        spec: &TableSpec,
        watermark: &str,
        chunk_size: usize,
    ) -> Result<Box<dyn ChunkStream>, ExtractionError> {
        let client = connect_source(&self.dsn).await?;
        let query = build_select(spec);

        let stream = if query.incremental {
            let since = parse_timestamp(watermark).ok_or_else(|| {
                ExtractionError::InvalidWatermark {
                    table: spec.source_table.clone(),
                    watermark: watermark.to_string(),
                }
            })?;
            info!(
                "extracting incrementally from '{}' with high-water mark > '{watermark}'",
                spec.source_table
            );
            let params: Vec<&(dyn ToSql + Sync)> = vec![&since];
            client
                .query_raw(query.sql.as_str(), params.iter().map(|p| *p as &dyn ToSql))
                .await
                .map_err(|source| ExtractionError::Query {
                    table: spec.source_table.clone(),
                    source,
                })?
        } else {
            info!("extracting full load from '{}'", spec.source_table);
            client
                .query_raw(query.sql.as_str(), std::iter::empty::<&dyn ToSql>())
                .await
                .map_err(|source| ExtractionError::Query {
                    table: spec.source_table.clone(),
                    source,
                })?
        };

        Ok(Box::new(PgChunkStream {
            _client: client,
            stream: Box::pin(stream),
            dest_table: spec.dest_table.clone(),
            source_table: spec.source_table.clone(),
            columns: source_columns(spec),
            chunk_size,
            done: false,
        }))
    }
}

struct PgChunkStream {
    /// Keeps the connection alive for the lifetime of the row stream.
    _client: Client,
    stream: Pin<Box<RowStream>>,
    dest_table: String,
    source_table: String,
    /// Configured column list; replaced by the driver's reported names on
    /// the first row (covers the `SELECT *` fallback).
    columns: Vec<String>,
    chunk_size: usize,
    done: bool,
}

#[async_trait]
impl ChunkStream for PgChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<DataChunk>, ExtractionError> {
        if self.done {
            return Ok(None);
        }

        let mut rows: Vec<Vec<Value>> = Vec::with_capacity(self.chunk_size);
        let mut first_row_names: Option<Vec<String>> = None;

        while rows.len() < self.chunk_size {
            match self.stream.next().await {
                Some(Ok(row)) => {
                    if first_row_names.is_none() {
                        first_row_names = Some(column_names(&row));
                    }
                    rows.push(decode_row(&row));
                }
                Some(Err(source)) => {
                    self.done = true;
                    return Err(ExtractionError::Query {
                        table: self.source_table.clone(),
                        source,
                    });
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if let Some(names) = first_row_names {
            self.columns = names;
        }

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(DataChunk::new(
            self.dest_table.clone(),
            self.columns.clone(),
            rows,
        )))
    }
}
