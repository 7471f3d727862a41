use super::{HostTree, Layout, NodeId};
use crate::position::{Size, Viewport};
use crate::view::WidgetView;
use anyhow::{anyhow, bail};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};

const CREATED_SIZE: Size = Size {
    width: 240.0,
    height: 36.0,
};

/// Attribute carrying the node id through the HTML rendition of the tree.
const NODE_ATTR: &str = "data-node";

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    size: Size,
    hidden: bool,
    layout: Layout,
    view: Option<WidgetView>,
}

impl Element {
    fn new(tag: &str, size: Size) -> Self {
        Self {
            tag: tag.to_string(),
            id: None,
            classes: Vec::new(),
            parent: None,
            children: Vec::new(),
            size,
            hidden: false,
            layout: Layout::Flow,
            view: None,
        }
    }
}

fn is_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Split a builder spec such as `button.comfy-btn#queue-button` into tag, id
/// and classes. The tag defaults to `div`.
fn parse_spec(spec: &str) -> Option<(String, Option<String>, Vec<String>)> {
    let end = spec.find(['#', '.']).unwrap_or(spec.len());
    let tag = if end == 0 { "div" } else { &spec[..end] };
    if !is_name(tag) {
        return None;
    }
    let mut id = None;
    let mut classes = Vec::new();
    let mut rest = &spec[end..];
    while let Some(marker) = rest.chars().next() {
        let body = &rest[marker.len_utf8()..];
        let len = body.find(['#', '.']).unwrap_or(body.len());
        let name = &body[..len];
        if !is_name(name) {
            return None;
        }
        if marker == '#' {
            id = Some(name.to_string());
        } else {
            classes.push(name.to_string());
        }
        rest = &body[len..];
    }
    Some((tag.to_ascii_lowercase(), id, classes))
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

fn node_of(el: ElementRef<'_>) -> Option<NodeId> {
    el.value().attr(NODE_ATTR)?.parse().ok().map(NodeId)
}

#[derive(Debug)]
struct Tree {
    next_id: u64,
    root: NodeId,
    nodes: HashMap<NodeId, Element>,
    viewport: Viewport,
}

impl Tree {
    fn alloc(&mut self, element: Element) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, element);
        id
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.is_ancestor(self.root, node)
    }

    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.nodes.get(&id).and_then(|el| el.parent);
        }
        false
    }

    fn topmost(&self, node: NodeId) -> NodeId {
        let mut top = node;
        while let Some(parent) = self.nodes.get(&top).and_then(|el| el.parent) {
            top = parent;
        }
        top
    }

    fn unlink(&mut self, node: NodeId) {
        let parent = self.nodes.get_mut(&node).and_then(|el| el.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != node);
        }
    }

    fn check_move(&self, target_parent: NodeId, node: NodeId) -> anyhow::Result<()> {
        if !self.nodes.contains_key(&node) {
            bail!("unknown node {:?}", node);
        }
        if node == self.root {
            bail!("cannot move the document root");
        }
        if self.is_ancestor(node, target_parent) {
            bail!("cannot insert {:?} into its own subtree", node);
        }
        Ok(())
    }

    fn preorder(&self, start: NodeId, out: &mut Vec<NodeId>) {
        if let Some(el) = self.nodes.get(&start) {
            out.push(start);
            for child in &el.children {
                self.preorder(*child, out);
            }
        }
    }

    fn write_element(&self, node: NodeId, out: &mut String) {
        let Some(el) = self.nodes.get(&node) else {
            return;
        };
        let tag = if is_name(&el.tag) { el.tag.as_str() } else { "div" };
        let _ = write!(out, "<{tag} {NODE_ATTR}=\"{}\"", node.0);
        if let Some(id) = &el.id {
            let _ = write!(out, " id=\"{}\"", escape_attr(id));
        }
        if !el.classes.is_empty() {
            let _ = write!(out, " class=\"{}\"", escape_attr(&el.classes.join(" ")));
        }
        out.push('>');
        for child in &el.children {
            self.write_element(*child, out);
        }
        let _ = write!(out, "</{tag}>");
    }

    /// HTML rendition of the tree containing `top`. The document root maps
    /// onto `<body>`; a detached subtree is placed inside an anonymous body.
    fn document(&self, top: NodeId) -> Html {
        let mut out = String::from("<!DOCTYPE html><html><head></head>");
        if top == self.root {
            let _ = write!(out, "<body {NODE_ATTR}=\"{}\">", top.0);
            if let Some(root) = self.nodes.get(&top) {
                for child in &root.children {
                    self.write_element(*child, &mut out);
                }
            }
        } else {
            out.push_str("<body>");
            self.write_element(top, &mut out);
        }
        out.push_str("</body></html>");
        Html::parse_document(&out)
    }

    /// First match in document order inside the tree holding `start`,
    /// restricted to `start` and its descendants.
    fn first_match(&self, start: NodeId, selector: &str, include_start: bool) -> Option<NodeId> {
        let selector = match Selector::parse(selector) {
            Ok(selector) => selector,
            Err(err) => {
                tracing::debug!(%selector, ?err, "unsupported selector");
                return None;
            }
        };
        let document = self.document(self.topmost(start));
        let found = document
            .select(&selector)
            .filter_map(node_of)
            .find(|node| (include_start || *node != start) && self.is_ancestor(start, *node));
        found
    }
}

/// Synthetic interface tree. Clones share the same underlying document, so a
/// test can keep a handle and reshape the host while a widget owns another.
///
/// Queries run through an HTML rendition of the tree, so nesting follows HTML
/// parsing rules (void elements such as `input` cannot hold children).
#[derive(Debug, Clone)]
pub struct MemoryHost {
    inner: Arc<Mutex<Tree>>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new(Size::new(1280.0, 720.0))
    }
}

impl MemoryHost {
    pub fn new(viewport: Viewport) -> Self {
        let mut nodes = HashMap::new();
        let root = NodeId(0);
        nodes.insert(root, Element::new("body", viewport));
        Self {
            inner: Arc::new(Mutex::new(Tree {
                next_id: 1,
                root,
                nodes,
                viewport,
            })),
        }
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn root(&self) -> NodeId {
        self.tree().root
    }

    /// Append an element described by a spec such as
    /// `button.comfy-btn#queue-button` under `parent`.
    pub fn add(&self, parent: NodeId, spec: &str, size: Size) -> anyhow::Result<NodeId> {
        let (tag, id, classes) =
            parse_spec(spec.trim()).ok_or_else(|| anyhow!("bad element spec {spec:?}"))?;
        let mut tree = self.tree();
        if !tree.nodes.contains_key(&parent) {
            bail!("unknown parent {:?}", parent);
        }
        let mut el = Element::new(&tag, size);
        el.id = id;
        el.classes = classes;
        el.parent = Some(parent);
        let id = tree.alloc(el);
        if let Some(p) = tree.nodes.get_mut(&parent) {
            p.children.push(id);
        }
        Ok(id)
    }

    pub fn set_hidden(&self, node: NodeId, hidden: bool) {
        if let Some(el) = self.tree().nodes.get_mut(&node) {
            el.hidden = hidden;
        }
    }

    pub fn set_size(&self, node: NodeId, size: Size) {
        if let Some(el) = self.tree().nodes.get_mut(&node) {
            el.size = size;
        }
    }

    /// Remove an element the way a host re-render would.
    pub fn remove(&self, node: NodeId) {
        self.tree().unlink(node);
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        let mut tree = self.tree();
        tree.viewport = viewport;
        let root = tree.root;
        if let Some(el) = tree.nodes.get_mut(&root) {
            el.size = viewport;
        }
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree()
            .nodes
            .get(&node)
            .map(|el| el.children.clone())
            .unwrap_or_default()
    }

    /// Number of attached elements carrying `id`.
    pub fn count_by_id(&self, id: &str) -> usize {
        let tree = self.tree();
        tree.nodes
            .iter()
            .filter(|(node, el)| el.id.as_deref() == Some(id) && tree.is_attached(**node))
            .count()
    }

    /// Last view rendered onto `node`.
    pub fn rendered(&self, node: NodeId) -> Option<WidgetView> {
        self.tree().nodes.get(&node).and_then(|el| el.view.clone())
    }
}

impl HostTree for MemoryHost {
    fn query(&self, selector: &str) -> Option<NodeId> {
        let tree = self.tree();
        let root = tree.root;
        tree.first_match(root, selector, true)
    }

    fn query_within(&self, scope: NodeId, selector: &str) -> Option<NodeId> {
        let tree = self.tree();
        if !tree.nodes.contains_key(&scope) {
            return None;
        }
        tree.first_match(scope, selector, false)
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let tree = self.tree();
        let mut order = Vec::new();
        tree.preorder(tree.root, &mut order);
        order
            .into_iter()
            .find(|node| tree.nodes.get(node).and_then(|el| el.id.as_deref()) == Some(id))
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.tree().is_attached(node)
    }

    fn rendered_size(&self, node: NodeId) -> Option<Size> {
        let tree = self.tree();
        if !tree.is_attached(node) {
            return None;
        }
        tree.nodes.get(&node).map(|el| el.size)
    }

    fn is_hidden(&self, node: NodeId) -> bool {
        let tree = self.tree();
        let mut cur = Some(node);
        while let Some(id) = cur {
            match tree.nodes.get(&id) {
                Some(el) if el.hidden => return true,
                Some(el) => cur = el.parent,
                None => return false,
            }
        }
        false
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree().nodes.get(&node).and_then(|el| el.parent)
    }

    fn viewport(&self) -> Viewport {
        self.tree().viewport
    }

    fn create_element(&mut self, tag: &str, id: Option<&str>) -> NodeId {
        let mut tree = self.tree();
        let mut el = Element::new(tag, CREATED_SIZE);
        el.id = id.map(str::to_string);
        tree.alloc(el)
    }

    fn insert_before(&mut self, reference: NodeId, node: NodeId) -> anyhow::Result<()> {
        let mut tree = self.tree();
        if reference == node {
            bail!("cannot insert {:?} before itself", node);
        }
        let parent = tree
            .nodes
            .get(&reference)
            .and_then(|el| el.parent)
            .ok_or_else(|| anyhow!("reference {:?} is not attached to a parent", reference))?;
        tree.check_move(parent, node)?;
        tree.unlink(node);
        let parent_el = tree
            .nodes
            .get_mut(&parent)
            .ok_or_else(|| anyhow!("unknown parent {:?}", parent))?;
        let index = parent_el
            .children
            .iter()
            .position(|c| *c == reference)
            .unwrap_or(parent_el.children.len());
        parent_el.children.insert(index, node);
        if let Some(el) = tree.nodes.get_mut(&node) {
            el.parent = Some(parent);
        }
        Ok(())
    }

    fn append_child(&mut self, parent: NodeId, node: NodeId) -> anyhow::Result<()> {
        let mut tree = self.tree();
        if !tree.nodes.contains_key(&parent) {
            bail!("unknown parent {:?}", parent);
        }
        tree.check_move(parent, node)?;
        tree.unlink(node);
        if let Some(p) = tree.nodes.get_mut(&parent) {
            p.children.push(node);
        }
        if let Some(el) = tree.nodes.get_mut(&node) {
            el.parent = Some(parent);
        }
        Ok(())
    }

    fn append_to_root(&mut self, node: NodeId) -> anyhow::Result<()> {
        let root = self.root();
        self.append_child(root, node)
    }

    fn detach(&mut self, node: NodeId) {
        self.tree().unlink(node);
    }

    fn set_layout(&mut self, node: NodeId, layout: Layout) {
        if let Some(el) = self.tree().nodes.get_mut(&node) {
            el.layout = layout;
        }
    }

    fn layout(&self, node: NodeId) -> Layout {
        self.tree()
            .nodes
            .get(&node)
            .map(|el| el.layout)
            .unwrap_or(Layout::Flow)
    }

    fn render(&mut self, node: NodeId, view: &WidgetView) {
        if let Some(el) = self.tree().nodes.get_mut(&node) {
            el.view = Some(view.clone());
        }
    }
}
