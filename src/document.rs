//! Document tree model shared with the host content pipeline.
//!
//! Documents arrive as JSON trees of `{type, attrs?, content?}` nodes, the
//! shape used by Markdoc/ProseMirror-style content collections. The
//! orchestrator only ever reads `type`, `attrs` and `content`, and only ever
//! writes into `attrs`.
//!
//! Attribute maps are `serde_json` maps, which keep keys sorted, so a
//! rewritten document serializes deterministically.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Node type that marks an image reference.
pub const IMAGE_NODE_TYPE: &str = "image";

/// Arbitrary attribute map carried by a node.
pub type Attrs = Map<String, Value>;

/// One node of a document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Attrs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Node>>,
}

/// Position of a node as child indices from the root. The root is `[]`.
pub type NodePath = Vec<usize>;

impl Node {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            attrs: None,
            content: None,
        }
    }

    /// An image node with the given `src`.
    pub fn image(src: &str) -> Self {
        let mut attrs = Attrs::new();
        attrs.insert("src".into(), Value::String(src.into()));
        Self {
            node_type: IMAGE_NODE_TYPE.into(),
            attrs: Some(attrs),
            content: None,
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs
            .get_or_insert_with(Attrs::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.content = Some(children);
        self
    }

    /// The `src` attribute of an image node, if it has a non-empty one.
    pub fn image_src(&self) -> Option<&str> {
        if self.node_type != IMAGE_NODE_TYPE {
            return None;
        }
        self.attrs
            .as_ref()?
            .get("src")?
            .as_str()
            .filter(|src| !src.is_empty())
    }

    pub fn children(&self) -> &[Node] {
        self.content.as_deref().unwrap_or(&[])
    }

    /// Paths of every image node, in document (pre-order) order.
    ///
    /// Uses an explicit stack rather than recursion so deeply nested
    /// documents cannot exhaust the call stack.
    pub fn image_paths(&self) -> Vec<NodePath> {
        let mut found = Vec::new();
        let mut stack: Vec<(&Node, NodePath)> = vec![(self, Vec::new())];
        while let Some((node, path)) = stack.pop() {
            if node.image_src().is_some() {
                found.push(path.clone());
            }
            // Reverse so the first child is popped first
            for (i, child) in node.children().iter().enumerate().rev() {
                let mut child_path = path.clone();
                child_path.push(i);
                stack.push((child, child_path));
            }
        }
        found
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        path.iter()
            .try_fold(self, |node, &i| node.content.as_ref()?.get(i))
    }

    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let mut node = self;
        for &i in path {
            node = node.content.as_mut()?.get_mut(i)?;
        }
        Some(node)
    }

    /// Overlay `computed` onto this node's attributes.
    ///
    /// Every computed key replaces any existing value; all other attributes
    /// pass through untouched.
    pub fn overlay_attrs(&mut self, computed: Attrs) {
        let attrs = self.attrs.get_or_insert_with(Attrs::new);
        for (key, value) in computed {
            attrs.insert(key, value);
        }
    }
}
