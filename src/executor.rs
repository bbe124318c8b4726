use tracing::{error, info};

use crate::constants::{bulk, fields, objects};
use crate::factory::RunContext;
use crate::handlers::ObjectHandler;
use crate::row::{FixtureRow, RecordPayload};
use crate::store::RemoteStore;
use crate::types::Alias;

/// One row staged for a bulk request: the payload plus the row metadata
/// post-batch hooks need.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub payload: RecordPayload,
    pub alias: Option<Alias>,
    /// Parsed raw row (directive columns included).
    pub raw: FixtureRow,
    /// 1-based CSV data row index, for diagnostics.
    pub row: usize,
}

/// Bulk operation discriminator for execution and post-batch hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
        }
    }
}

/// Sends one logical batch as bulk requests, updating run state per record.
///
/// Update payloads are sent with the handler's immutable fields stripped
/// (`Id` always survives). Person-account inserts go out in fixed-size
/// chunks; everything else is a single request. A transport failure
/// abandons only its chunk. After every chunk the handler's post-batch
/// hook runs with that chunk's items and outcomes.
pub fn send_batch(
    store: &dyn RemoteStore,
    ctx: &mut RunContext,
    handler: &dyn ObjectHandler,
    mut items: Vec<BatchItem>,
    op: Operation,
) {
    if items.is_empty() {
        return;
    }
    let object = handler.object();

    if op == Operation::Update {
        let immutable = handler.immutable_fields();
        if !immutable.is_empty() {
            for item in &mut items {
                item.payload
                    .retain(|field, _| field == fields::ID || !immutable.contains(&field.as_str()));
            }
        }
    }

    let chunk_size = if object == objects::PERSON_ACCOUNT && op == Operation::Insert {
        bulk::PERSON_ACCOUNT_INSERT_CHUNK
    } else {
        items.len()
    };
    let total_chunks = items.len().div_ceil(chunk_size);

    for (index, chunk) in items.chunks(chunk_size).enumerate() {
        if total_chunks > 1 {
            info!(
                object,
                records = chunk.len(),
                chunk = index + 1,
                total_chunks,
                operation = op.as_str(),
                "sending bulk request"
            );
        } else {
            info!(
                object,
                records = chunk.len(),
                operation = op.as_str(),
                "sending bulk request"
            );
        }

        let payloads: Vec<RecordPayload> = chunk.iter().map(|item| item.payload.clone()).collect();
        let outcome = match op {
            Operation::Insert => store.insert(object, &payloads),
            Operation::Update => store.update(object, &payloads),
        };
        let results = match outcome {
            Ok(results) => results,
            Err(err) => {
                error!(
                    object,
                    operation = op.as_str(),
                    error = %err,
                    "bulk request failed; abandoning this chunk"
                );
                continue;
            }
        };

        let mut successes = 0usize;
        for (item, result) in chunk.iter().zip(&results) {
            if result.success {
                successes += 1;
                if op == Operation::Insert {
                    ctx.created.record(object, &result.id);
                }
                if let Some(alias) = item.alias.as_deref() {
                    ctx.keys.set(alias, &result.id);
                }
            } else {
                error!(
                    object,
                    row = item.row,
                    alias = item.alias.as_deref().unwrap_or("-"),
                    errors = ?result.errors,
                    operation = op.as_str(),
                    "record save failed"
                );
            }
        }
        info!(
            object,
            successes,
            total = results.len(),
            operation = op.as_str(),
            "bulk request complete"
        );

        handler.after_batch(store, ctx, chunk, &results, op);
    }
}
