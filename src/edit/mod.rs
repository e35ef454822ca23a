//! Edit execution and rollback tracking.

mod manager;

pub use manager::{
    EditBatch, EditBatchStatus, EditOperation, EditOperationManager, EditStats, MultiEditOutcome,
};
