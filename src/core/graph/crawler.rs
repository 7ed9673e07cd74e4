//! Experiment graph crawler
//!
//! Starting from an assay process, walks upstream through the processes that
//! derived each input until no unvisited process is left. Uses an explicit
//! worklist; the visited set is checked before anything is enqueued, so
//! cyclic metadata terminates.

use super::model::{ExperimentGraph, LinkedEntity, ProcessLink};
use crate::adapters::metadata::MetadataStore;
use crate::domain::{MetadataNode, Relation, Result};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Inputs, outputs and protocols of one process
#[derive(Debug, Clone)]
struct ProcessInfo {
    process: MetadataNode,
    inputs: Vec<MetadataNode>,
    outputs: Vec<MetadataNode>,
    protocols: Vec<MetadataNode>,
}

impl ProcessInfo {
    fn into_graph(self) -> ExperimentGraph {
        let mut link = ProcessLink::new(self.process.uuid.clone(), self.process.concrete_type());
        for input in &self.inputs {
            link.add_input(LinkedEntity::of(input));
        }
        for output in &self.outputs {
            link.add_output(LinkedEntity::of(output));
        }
        for protocol in &self.protocols {
            link.add_protocol(LinkedEntity::of(protocol));
        }

        let mut graph = ExperimentGraph::new();
        graph.nodes.add_node(self.process);
        graph.nodes.add_nodes(self.inputs);
        graph.nodes.add_nodes(self.outputs);
        graph.nodes.add_nodes(self.protocols);
        graph.links.add_link(link);
        graph
    }
}

pub struct GraphCrawler {
    store: Arc<dyn MetadataStore>,
}

impl GraphCrawler {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Complete graph of an experiment: the process closure, the project
    /// and the project's supplementary files
    ///
    /// # Errors
    ///
    /// Any failed relation lookup fails the whole crawl; no partial graph is
    /// returned.
    pub async fn build_graph(
        &self,
        start: &MetadataNode,
        project: &MetadataNode,
    ) -> Result<ExperimentGraph> {
        let mut graph = self.crawl_processes(start).await?;
        graph.nodes.add_node(project.clone());
        graph.extend(self.supplementary_files_graph(project).await?);

        tracing::debug!(
            process_uuid = %start.uuid,
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            "Experiment graph built"
        );
        Ok(graph)
    }

    /// Process closure of `start`, without project or supplementary files
    pub async fn crawl_processes(&self, start: &MetadataNode) -> Result<ExperimentGraph> {
        let mut graph = ExperimentGraph::new();
        let mut visited: HashSet<String> = HashSet::from([start.uuid.clone()]);
        let mut worklist: VecDeque<MetadataNode> = VecDeque::from([start.clone()]);

        while let Some(process) = worklist.pop_front() {
            let info = self.process_info(process).await?;

            for input in &info.inputs {
                if !visited.insert(input.uuid.clone()) {
                    continue;
                }
                let producers = self
                    .store
                    .get_related_entities(Relation::DerivedByProcesses, input)
                    .await?;
                for producer in producers {
                    if visited.insert(producer.uuid.clone()) {
                        worklist.push_back(producer);
                    }
                }
            }

            graph.extend(info.into_graph());
        }

        Ok(graph)
    }

    /// Graph linking `entity` to its supplementary files; empty if it has none
    pub async fn supplementary_files_graph(&self, entity: &MetadataNode) -> Result<ExperimentGraph> {
        let files = self
            .store
            .get_related_entities(Relation::SupplementaryFiles, entity)
            .await?;
        if files.is_empty() {
            return Ok(ExperimentGraph::new());
        }
        Ok(ExperimentGraph::from_supplementary_files(entity, files))
    }

    async fn process_info(&self, process: MetadataNode) -> Result<ProcessInfo> {
        let related = |relation| self.store.get_related_entities(relation, &process);

        let mut inputs = related(Relation::InputBiomaterials).await?;
        inputs.extend(related(Relation::InputFiles).await?);
        let mut outputs = related(Relation::DerivedBiomaterials).await?;
        outputs.extend(related(Relation::DerivedFiles).await?);
        let protocols = related(Relation::Protocols).await?;

        Ok(ProcessInfo {
            process,
            inputs,
            outputs,
            protocols,
        })
    }
}
