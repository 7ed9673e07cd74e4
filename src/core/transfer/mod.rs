//! Bulk data-file transfer
//!
//! Completion of a transfer is detected two ways, and either may win:
//!
//! - the poll path, [`TransferCoordinator::wait_for_completion`], lists the
//!   job's operations with a capped exponential backoff
//! - the push path, [`TransferResponder`], consumes completion events from
//!   the transfer service's notification topic
//!
//! Both end in [`ExportJobTracker::mark_transfer_complete`](crate::core::state::ExportJobTracker::mark_transfer_complete),
//! which is idempotent.

pub mod coordinator;
pub mod job_spec;
pub mod responder;

pub use coordinator::{TransferCoordinator, TransferRole};
pub use job_spec::{transfer_job_spec, upload_area_location};
pub use responder::{ResponderDecision, TransferResponder};
