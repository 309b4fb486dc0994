//! filesorter - sort the files of a directory into category folders
//!
//! Files are classified by extension, planned into `root/<Category>/` with
//! collision-safe renaming, moved, and recorded so the most recent sorts can
//! be undone. [`Session`] is the entry point; it can be shared across threads
//! and reports progress through an [`OperationContext`].

pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod mover;
pub mod output;
pub mod planner;
pub mod progress;
pub mod scanner;
pub mod session;

pub use classifier::{CategoryRule, ExtensionTable, OTHER_CATEGORY};
pub use config::{CompiledFilters, ConfigError, SorterConfig};
pub use error::{FileError, FileErrorKind, SortError, SortResult};
pub use history::{History, UndoReport};
pub use mover::{MoveRecord, OperationRecord};
pub use planner::{MovePlan, PlannedMove, Planner};
pub use progress::{CancelToken, OperationContext, Phase, ProgressEvent, ProgressObserver};
pub use scanner::{Inventory, ScanReport};
pub use session::{Session, SortOptions, SortReport};

pub use cli::{SortCommand, run_cli};
