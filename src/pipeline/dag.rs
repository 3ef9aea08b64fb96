// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 jobflow contributors

//! DAG (Directed Acyclic Graph) of job dependencies
//!
//! Builds and validates the `needs` graph, ensuring a valid execution
//! order and rejecting cycles before anything runs.

use petgraph::algo::{has_path_connecting, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

use crate::errors::JobflowError;
use crate::pipeline::Pipeline;

/// Job dependency graph; edges point from upstream to downstream
pub struct JobGraph {
    graph: DiGraph<usize, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    index_to_name: HashMap<NodeIndex, String>,
}

impl JobGraph {
    /// Build a DAG from a pipeline
    pub fn build(pipeline: &Pipeline) -> Result<Self, JobflowError> {
        let mut dag = Self {
            graph: DiGraph::new(),
            name_to_index: HashMap::new(),
            index_to_name: HashMap::new(),
        };

        // Add all jobs as nodes
        for (idx, job) in pipeline.jobs.iter().enumerate() {
            if dag.name_to_index.contains_key(&job.name) {
                return Err(JobflowError::InvalidPipeline {
                    reason: format!("Duplicate job name: '{}'", job.name),
                    help: None,
                });
            }
            let node = dag.graph.add_node(idx);
            dag.name_to_index.insert(job.name.clone(), node);
            dag.index_to_name.insert(node, job.name.clone());
        }

        // Add dependency edges
        for job in &pipeline.jobs {
            let job_node = dag.name_to_index[&job.name];

            for dep_name in &job.needs {
                let dep_node = dag.name_to_index.get(dep_name).ok_or_else(|| {
                    JobflowError::UnknownDependency {
                        job: job.name.clone(),
                        dependency: dep_name.clone(),
                    }
                })?;

                if !dag.graph.contains_edge(*dep_node, job_node) {
                    dag.graph.add_edge(*dep_node, job_node, ());
                }
            }
        }

        dag.validate_acyclic()?;

        Ok(dag)
    }

    fn validate_acyclic(&self) -> Result<(), JobflowError> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(_) => Err(JobflowError::CircularDependency {
                jobs: self.find_cycle_members(),
            }),
        }
    }

    /// Names of the jobs in one cycle, closed by repeating the first
    fn find_cycle_members(&self) -> Vec<String> {
        let cyclic = tarjan_scc(&self.graph).into_iter().find(|scc| {
            scc.len() > 1 || (scc.len() == 1 && self.graph.contains_edge(scc[0], scc[0]))
        });

        let Some(mut scc) = cyclic else {
            return vec![];
        };

        // Declaration order reads better than SCC order
        scc.sort_by_key(|n| self.graph[*n]);
        let mut names: Vec<String> = scc.iter().map(|n| self.index_to_name[n].clone()).collect();
        names.push(names[0].clone());
        names
    }

    /// Get topologically sorted job indices
    pub fn topological_order(&self) -> Result<Vec<usize>, JobflowError> {
        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|n| self.graph[n]).collect())
            .map_err(|_| JobflowError::CircularDependency {
                jobs: self.find_cycle_members(),
            })
    }

    /// Get topologically sorted job names
    pub fn topological_order_names(&self) -> Result<Vec<String>, JobflowError> {
        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|n| self.index_to_name[&n].clone()).collect())
            .map_err(|_| JobflowError::CircularDependency {
                jobs: self.find_cycle_members(),
            })
    }

    /// Direct upstream jobs
    pub fn dependencies(&self, job: &str) -> Option<Vec<String>> {
        self.neighbors(job, Direction::Incoming)
    }

    /// Direct downstream jobs
    pub fn dependents(&self, job: &str) -> Option<Vec<String>> {
        self.neighbors(job, Direction::Outgoing)
    }

    fn neighbors(&self, job: &str, direction: Direction) -> Option<Vec<String>> {
        let node = self.name_to_index.get(job)?;
        let mut names: Vec<String> = self
            .graph
            .neighbors_directed(*node, direction)
            .map(|n| self.index_to_name[&n].clone())
            .collect();
        names.sort();
        Some(names)
    }

    /// Every job `job` depends on, directly or transitively
    pub fn upstream_closure(&self, job: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let Some(start) = self.name_to_index.get(job) else {
            return seen;
        };

        let mut stack = vec![*start];
        while let Some(node) = stack.pop() {
            for up in self.graph.neighbors_directed(node, Direction::Incoming) {
                if seen.insert(self.index_to_name[&up].clone()) {
                    stack.push(up);
                }
            }
        }
        seen
    }

    /// Check if job A depends (directly or transitively) on job B
    pub fn depends_on(&self, job_a: &str, job_b: &str) -> bool {
        let Some(node_a) = self.name_to_index.get(job_a) else {
            return false;
        };
        let Some(node_b) = self.name_to_index.get(job_b) else {
            return false;
        };

        node_a != node_b && has_path_connecting(&self.graph, *node_b, *node_a, None)
    }

    /// Generate Mermaid diagram of the DAG
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        let mut names: Vec<&String> = self.name_to_index.keys().collect();
        names.sort();
        for name in names {
            out.push_str(&format!("    {}[{}]\n", name, name));
        }

        for (from, to) in self.edge_names() {
            out.push_str(&format!("    {} --> {}\n", from, to));
        }

        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for (from, to) in self.edge_names() {
            out.push_str(&format!("    \"{}\" -> \"{}\";\n", from, to));
        }

        // Isolated nodes have no edge to introduce them
        let mut isolated: Vec<&String> = self
            .name_to_index
            .iter()
            .filter(|(_, node)| self.graph.neighbors_undirected(**node).count() == 0)
            .map(|(name, _)| name)
            .collect();
        isolated.sort();
        for name in isolated {
            out.push_str(&format!("    \"{}\";\n", name));
        }

        out.push_str("}\n");
        out
    }

    fn edge_names(&self) -> Vec<(&str, &str)> {
        let mut edges: Vec<(&str, &str)> = self
            .graph
            .edge_references()
            .map(|e| {
                (
                    self.index_to_name[&e.source()].as_str(),
                    self.index_to_name[&e.target()].as_str(),
                )
            })
            .collect();
        edges.sort();
        edges
    }

    /// Generate text representation of execution order
    pub fn to_text(&self, pipeline: &Pipeline) -> Result<String, JobflowError> {
        let order = self.topological_order()?;
        let mut out = String::new();

        for (i, idx) in order.iter().enumerate() {
            let job = &pipeline.jobs[*idx];
            let deps = self.dependencies(&job.name).unwrap_or_default();

            out.push_str(&format!(
                "{}. {} ({} step{})",
                i + 1,
                job.name,
                job.steps.len(),
                if job.steps.len() == 1 { "" } else { "s" }
            ));

            if !deps.is_empty() {
                out.push_str(&format!(" [needs: {}]", deps.join(", ")));
            }

            if let Some(ref cond) = job.condition {
                out.push_str(&format!(" [if: {}]", cond));
            }

            out.push('\n');
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Condition, Job};

    fn make_test_pipeline(jobs: Vec<(&str, Vec<&str>)>) -> Pipeline {
        let mut pipeline = Pipeline::from_yaml("name: test\njobs: []\n").unwrap();
        pipeline.jobs = jobs
            .into_iter()
            .map(|(name, needs)| Job {
                name: name.into(),
                description: None,
                runs_on: "local".into(),
                needs: needs.into_iter().map(String::from).collect(),
                condition: None,
                permissions: vec![],
                env: Default::default(),
                steps: vec![],
                outputs: Default::default(),
            })
            .collect();
        pipeline
    }

    #[test]
    fn test_linear_dag() {
        let pipeline = make_test_pipeline(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["b"]),
        ]);

        let dag = JobGraph::build(&pipeline).unwrap();
        assert_eq!(dag.topological_order_names().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_diamond_dag() {
        let pipeline = make_test_pipeline(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a"]),
            ("d", vec!["b", "c"]),
        ]);

        let dag = JobGraph::build(&pipeline).unwrap();
        let order = dag.topological_order_names().unwrap();

        // a must come first, d must come last
        assert_eq!(order[0], "a");
        assert_eq!(order[3], "d");
        assert_eq!(dag.dependencies("d").unwrap(), vec!["b", "c"]);
        assert_eq!(dag.dependents("a").unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn test_circular_dependency_detection() {
        let pipeline = make_test_pipeline(vec![("a", vec!["b"]), ("b", vec!["a"])]);

        match JobGraph::build(&pipeline) {
            Err(JobflowError::CircularDependency { jobs }) => {
                assert_eq!(jobs, vec!["a", "b", "a"]);
            }
            other => panic!("Expected cycle, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let pipeline = make_test_pipeline(vec![("a", vec!["a"])]);

        assert!(matches!(
            JobGraph::build(&pipeline),
            Err(JobflowError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let pipeline = make_test_pipeline(vec![("a", vec!["nonexistent"])]);

        assert!(matches!(
            JobGraph::build(&pipeline),
            Err(JobflowError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let pipeline = make_test_pipeline(vec![("a", vec![]), ("a", vec![])]);

        assert!(matches!(
            JobGraph::build(&pipeline),
            Err(JobflowError::InvalidPipeline { .. })
        ));
    }

    #[test]
    fn test_upstream_closure_and_depends_on() {
        let pipeline = make_test_pipeline(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["b"]),
            ("x", vec![]),
        ]);

        let dag = JobGraph::build(&pipeline).unwrap();

        let closure: Vec<String> = dag.upstream_closure("c").into_iter().collect();
        assert_eq!(closure, vec!["a", "b"]);
        assert!(dag.upstream_closure("x").is_empty());

        assert!(dag.depends_on("c", "a")); // transitive
        assert!(dag.depends_on("b", "a")); // direct
        assert!(!dag.depends_on("a", "c")); // reverse
        assert!(!dag.depends_on("a", "a"));
    }

    #[test]
    fn test_mermaid_and_dot_output() {
        let pipeline = make_test_pipeline(vec![("a", vec![]), ("b", vec!["a"]), ("solo", vec![])]);

        let dag = JobGraph::build(&pipeline).unwrap();
        let mermaid = dag.to_mermaid();
        assert!(mermaid.contains("graph TD"));
        assert!(mermaid.contains("a --> b"));

        let dot = dag.to_dot();
        assert!(dot.contains("\"a\" -> \"b\";"));
        assert!(dot.contains("\"solo\";"));
    }

    #[test]
    fn test_text_output() {
        let mut pipeline = make_test_pipeline(vec![("build", vec![]), ("deploy", vec!["build"])]);
        pipeline.jobs[1].condition = Some(Condition::Branch("main".into()));

        let dag = JobGraph::build(&pipeline).unwrap();
        insta::assert_snapshot!(dag.to_text(&pipeline).unwrap().trim_end(), @r"
        1. build (0 steps)
        2. deploy (0 steps) [needs: build] [if: branch == main]
        ");
    }
}
