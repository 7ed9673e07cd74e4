//! Staging area writes
//!
//! [`StagingWriter`] implements the conflict-free write-once protocol on top
//! of the object store. [`StagingArea`] maps metadata documents, links and
//! data files onto staging keys and writes them through the writer.

pub mod descriptor;
pub mod layout;
pub mod schema;
pub mod writer;

pub use descriptor::FileDescriptor;
pub use layout::StagingArea;
pub use schema::{DocumentValidator, RequiredFieldsValidator, SchemaService};
pub use writer::{StagingWriter, WriteOutcome, COMPLETION_FLAG};
