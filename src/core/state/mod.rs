//! Export job state tracking

pub mod tracker;

pub use tracker::ExportJobTracker;
