//! Stack management
//!
//! - Ordering of branches inside a stack
//! - Sequential restacking with conflict pause/resume
//! - Importing a stack from commit history
//! - Branch membership, fold and navigation

pub mod history;
pub mod journal;
pub mod manager;
pub mod position;
pub mod rebase;

pub use history::{HistoryImporter, ImportedStack};
pub use journal::{FoldState, Journal, PendingOperation, RestackState};
pub use manager::{BranchGroup, CurrentStack, FoldOutcome, StackManager};
pub use rebase::{ContinueOutcome, RebaseOrchestrator, RestackOutcome, RestackRequest};
