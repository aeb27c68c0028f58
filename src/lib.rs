//! Cross-platform process snapshots built from native tool output
//!
//! ```no_run
//! use procscope::{ProcessService, SnapshotOptions};
//!
//! let snapshot = ProcessService::system(SnapshotOptions::default()).snapshot()?;
//! print!("{}", snapshot.render_tree());
//! # Ok::<(), procscope::ProcscopeError>(())
//! ```

pub mod acquire;
pub mod cli;
pub mod control;
pub mod error;
pub mod executor;
pub mod extra;
pub mod graph;
pub mod normalize;
pub mod parse;
pub mod platform;
pub mod priority;
pub mod record;
pub mod snapshot;

pub use acquire::{ProcessService, SnapshotOptions};
pub use control::{ControlResult, PriorityValue, ProcessController};
pub use error::{ProcscopeError, Result, ReturnCode};
pub use executor::{CommandExecutor, CommandOutput, SystemExecutor};
pub use extra::ProcessExtra;
pub use normalize::{AuxiliaryData, StartTimeFormat};
pub use parse::{FieldMap, ParseOutcome, ParseStrategy, RowParseFailure};
pub use platform::Platform;
pub use priority::PriorityClass;
pub use record::{ProcessRecord, RecordHandle};
pub use snapshot::Snapshot;
