#![doc = include_str!("../README.md")]

/// Remote analytics backend interface and in-memory fake.
pub mod analytics;
/// Operator-facing command line runner.
pub mod cli;
/// Environment-variable configuration.
pub mod config;
/// Centralized constants: directive grammar, consent columns, poll
/// cadences, chunk sizes, object and field names.
pub mod constants;
/// Batch execution against the remote store.
pub mod executor;
/// Scenario orchestration: seed, upsert, tear down.
pub mod factory;
/// Per-object save and delete strategies.
pub mod handlers;
/// Alias-to-id bookkeeping shared across a run.
pub mod keymap;
/// Upsert matching against existing remote records.
pub mod matcher;
/// Bounded polling for eventually consistent reads.
pub mod poll;
/// Directive-row parsing into remote payloads.
pub mod row;
/// Scenario directory listing and CSV reading.
pub mod scenario;
/// Combined-sheet splitting utility.
pub mod splitter;
/// Remote CRM store interface and in-memory fake.
pub mod store;
/// Shared type aliases.
pub mod types;
/// Post-seed verification against analytics extensions.
pub mod verify;

mod errors;

pub use analytics::{AnalyticsRow, AnalyticsStore, InMemoryAnalytics};
pub use cli::run_cli;
pub use config::{AnalyticsConfig, RemoteConfig};
pub use errors::FactoryError;
pub use executor::{BatchItem, Operation, send_batch};
pub use factory::{CreationLog, DataFactory, RunContext};
pub use handlers::{
    AccountHandler, LocationHandler, ObjectHandler, ParticipantHandler, VehicleHandler,
    handler_for,
};
pub use keymap::KeyMap;
pub use matcher::{ExistingRecords, MatchMode, UpsertSplit, classify, find_existing};
pub use poll::{PollOutcome, PollPolicy};
pub use row::{FieldValue, FixtureRow, ParsedRow, RecordPayload, RowParser};
pub use scenario::SortOrder;
pub use splitter::split_sheet;
pub use store::{
    CallKind, CallRecord, InMemoryStore, PersonAccountSimulation, QueryFilter, RemoteRecord,
    RemoteStore, SaveResult,
};
pub use types::{Alias, CellValue, EnvName, FieldName, IsoDate, ObjectName, RemoteId};
pub use verify::{Verifier, VerifyReport};
