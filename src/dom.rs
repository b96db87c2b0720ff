//! In-memory document model.
//!
//! `Document` is a small arena-backed tree built from HTML with `scraper`.
//! Unlike `scraper::Html` it can be mutated: the exporter clones subtrees,
//! rewrites `<img src>` attributes and inserts temporary anchors. Nodes that
//! are detached stay in the arena but are no longer reachable from the root,
//! so lookups such as [`Document::get_element_by_id`] ignore them.

use crate::{Error, Result};
use scraper::Html;

/// Index of a node inside its owning [`Document`]
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Document,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A mutable DOM tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document containing only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parse an HTML document. Comments, doctypes and processing
    /// instructions are dropped.
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut doc = Document::new();

        let root = doc.root();
        let mut stack = Vec::new();
        let top: Vec<_> = parsed.tree.root().children().collect();
        for node in top.into_iter().rev() {
            stack.push((node, root));
        }

        while let Some((node, parent)) = stack.pop() {
            let data = match node.value() {
                scraper::Node::Element(el) => NodeData::Element {
                    tag: el.name().to_ascii_lowercase(),
                    attrs: el
                        .attrs()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                },
                scraper::Node::Text(t) => NodeData::Text(t.text.to_string()),
                _ => continue,
            };
            let id = doc.push(data);
            doc.link(parent, id);
            let children: Vec<_> = node.children().collect();
            for child in children.into_iter().rev() {
                stack.push((child, id));
            }
        }

        doc
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    pub fn root(&self) -> NodeId {
        0
    }

    /// The `<body>` element, if the document has one
    pub fn body(&self) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&id| self.tag(id) == Some("body"))
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id).map(|n| &n.data)
    }

    /// Lowercase tag name for element nodes
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.data(id)? {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.data(id)? {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Set (or replace) an attribute on an element node
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Element { attrs, .. }) => {
                if let Some(slot) = attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                    slot.1 = value.to_string();
                } else {
                    attrs.push((name.to_string(), value.to_string()));
                }
                Ok(())
            }
            _ => Err(Error::InvalidInput(format!("node {} is not an element", id))),
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id)? {
            NodeData::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Create a detached element node
    pub fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.push(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    /// Append `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if parent >= self.nodes.len() || child >= self.nodes.len() {
            return Err(Error::InvalidInput(format!(
                "append_child({}, {}): unknown node",
                parent, child
            )));
        }
        if matches!(self.nodes[parent].data, NodeData::Text(_)) {
            return Err(Error::InvalidInput("text nodes cannot have children".into()));
        }
        // Refuse to create a cycle
        let mut cur = Some(parent);
        while let Some(c) = cur {
            if c == child {
                return Err(Error::InvalidInput(
                    "cannot append a node to its own descendant".into(),
                ));
            }
            cur = self.nodes[c].parent;
        }
        self.detach(child);
        self.link(parent, child);
        Ok(())
    }

    /// Remove a node (and its subtree) from its parent. No-op for nodes that
    /// are already detached.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes.get(id).and_then(|n| n.parent) {
            self.nodes[parent].children.retain(|&c| c != id);
            self.nodes[id].parent = None;
        }
    }

    /// Whether the node is reachable from the document root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == self.root() {
                return true;
            }
            cur = self.nodes.get(c).and_then(|n| n.parent);
        }
        false
    }

    /// Find the first attached element whose `id` attribute equals `id`
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&n| self.attr(n, "id") == Some(id))
    }

    /// Pre-order list of `id` and everything below it
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if id >= self.nodes.len() {
            return out;
        }
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            for &c in self.nodes[n].children.iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    /// All `<img>` elements in the subtree rooted at `id`
    pub fn images_in(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.tag(n) == Some("img"))
            .collect()
    }

    /// Deep-copy a subtree. The copy is detached; attach it with
    /// [`Document::append_child`].
    pub fn deep_clone(&mut self, id: NodeId) -> Result<NodeId> {
        if id >= self.nodes.len() {
            return Err(Error::InvalidInput(format!("unknown node {}", id)));
        }
        let copy = self.push(self.nodes[id].data.clone());
        let mut stack = vec![(id, copy)];
        while let Some((src, dst)) = stack.pop() {
            let children = self.nodes[src].children.clone();
            for c in children {
                let cc = self.push(self.nodes[c].data.clone());
                self.link(dst, cc);
                stack.push((c, cc));
            }
        }
        Ok(copy)
    }

    /// Concatenated text of the subtree
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>t</title></head><body>
        <div id="preview"><p>Hello <b>world</b></p><img src="/a.png"></div>
        <div id="other"></div></body></html>"#;

    #[test]
    fn parse_and_lookup_by_id() {
        let doc = Document::parse(PAGE);
        let preview = doc.get_element_by_id("preview").expect("preview");
        assert_eq!(doc.tag(preview), Some("div"));
        assert_eq!(doc.text_content(preview), "Hello world");
        assert_eq!(doc.images_in(preview).len(), 1);
        assert!(doc.body().is_some());
    }

    #[test]
    fn detached_nodes_are_not_found() {
        let mut doc = Document::parse(PAGE);
        let preview = doc.get_element_by_id("preview").unwrap();
        doc.detach(preview);
        assert!(!doc.is_attached(preview));
        assert!(doc.get_element_by_id("preview").is_none());
        assert!(doc.get_element_by_id("other").is_some());
    }

    #[test]
    fn deep_clone_is_independent() {
        let mut doc = Document::parse(PAGE);
        let preview = doc.get_element_by_id("preview").unwrap();
        let copy = doc.deep_clone(preview).unwrap();
        assert!(!doc.is_attached(copy));

        let img = doc.images_in(copy)[0];
        doc.set_attr(img, "src", "data:image/png;base64,AAAA").unwrap();

        let original_img = doc.images_in(preview)[0];
        assert_eq!(doc.attr(original_img, "src"), Some("/a.png"));
        assert_eq!(doc.text_content(copy), "Hello world");
    }

    #[test]
    fn append_child_rejects_cycles() {
        let mut doc = Document::parse(PAGE);
        let preview = doc.get_element_by_id("preview").unwrap();
        let p = doc.children(preview)[0];
        assert!(doc.append_child(p, preview).is_err());
    }

    #[test]
    fn append_child_moves_nodes() {
        let mut doc = Document::parse(PAGE);
        let body = doc.body().unwrap();
        let anchor = doc.create_element("a", &[("download", "x.png")]);
        doc.append_child(body, anchor).unwrap();
        assert_eq!(doc.parent(anchor), Some(body));
        assert!(doc.is_attached(anchor));
        doc.detach(anchor);
        assert!(!doc.children(body).contains(&anchor));
    }
}
