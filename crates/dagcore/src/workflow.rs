use crate::{Value, ValueMap};
use serde::{Deserialize, Serialize};

pub type WorkflowId = String;
pub type NodeId = String;

/// Complete workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<WorkflowId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Declare that `target` depends on `source`
    pub fn connect(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) {
        let source = source.into();
        let target = target.into();
        self.edges.push(Edge {
            id: format!("{}->{}", source, target),
            source,
            target,
        });
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Node specification in a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub config: ValueMap,
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config: ValueMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// Directed dependency: `source` must complete before `target` may run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_workflow_json_with_type_field() {
        let workflow: WorkflowDefinition = serde_json::from_value(json!({
            "id": "wf-1",
            "name": "swap",
            "nodes": [
                {"id": "quote", "type": "mock", "config": {"amount": 1}},
                {"id": "swap", "type": "mock"}
            ],
            "edges": [{"source": "quote", "target": "swap"}]
        }))
        .unwrap();

        assert_eq!(workflow.nodes[0].node_type, "mock");
        assert!(workflow.nodes[1].config.is_empty());
        assert_eq!(workflow.edges[0].id, "");
        assert_eq!(workflow.find_node("swap").map(|n| n.id.as_str()), Some("swap"));
    }

    #[test]
    fn connect_names_edges_after_endpoints() {
        let mut workflow = WorkflowDefinition::new("wf", "test");
        let a = workflow.add_node(NodeSpec::new("a", "echo"));
        let b = workflow.add_node(NodeSpec::new("b", "echo").with_config("y", 2i64));
        workflow.connect(a, b);

        assert_eq!(workflow.edges[0].id, "a->b");
        assert_eq!(workflow.nodes[1].config["y"], Value::Integer(2));
    }
}
