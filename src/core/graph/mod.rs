//! Experiment graph model and crawler

pub mod crawler;
pub mod model;

pub use crawler::GraphCrawler;
pub use model::{
    ExperimentGraph, Link, LinkKind, LinkSet, LinkedEntity, NodeSet, ProcessLink,
    SupplementaryLink,
};
