//! Abstraction over the externally owned interface tree the widget lives in.
//!
//! The host application owns the tree and may reshape it between releases or
//! while running, so the widget only relies on a handful of queries and
//! mutations expressed by [`HostTree`].

pub mod memory;

use crate::position::{Position, Size, Viewport};
use crate::view::WidgetView;

pub use memory::MemoryHost;

/// Opaque handle to an element of the host tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// How an element is laid out relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Layout {
    /// Normal flow inside whatever parent the element is attached to.
    Flow,
    /// Fixed-position overlay at the given viewport offset.
    Floating(Position),
}

pub trait HostTree {
    /// First element in document order matching `selector`.
    fn query(&self, selector: &str) -> Option<NodeId>;
    /// First descendant of `scope` matching `selector`.
    fn query_within(&self, scope: NodeId, selector: &str) -> Option<NodeId>;
    fn element_by_id(&self, id: &str) -> Option<NodeId>;
    /// Whether the element is currently reachable from the document root.
    fn is_attached(&self, node: NodeId) -> bool;
    fn rendered_size(&self, node: NodeId) -> Option<Size>;
    /// Hidden through styling on the element or any ancestor.
    fn is_hidden(&self, node: NodeId) -> bool;
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn viewport(&self) -> Viewport;

    fn create_element(&mut self, tag: &str, id: Option<&str>) -> NodeId;
    fn insert_before(&mut self, reference: NodeId, node: NodeId) -> anyhow::Result<()>;
    fn append_child(&mut self, parent: NodeId, node: NodeId) -> anyhow::Result<()>;
    fn append_to_root(&mut self, node: NodeId) -> anyhow::Result<()>;
    /// Remove the element (and its subtree) from wherever it is attached.
    fn detach(&mut self, node: NodeId);
    fn set_layout(&mut self, node: NodeId, layout: Layout);
    fn layout(&self, node: NodeId) -> Layout;
    /// Present the widget's current state on its element.
    fn render(&mut self, node: NodeId, view: &WidgetView);
}

/// An element counts as visible when it is attached, has a non-zero rendered
/// size and is not hidden by styling.
pub fn is_visible<H: HostTree + ?Sized>(host: &H, node: NodeId) -> bool {
    host.is_attached(node)
        && host
            .rendered_size(node)
            .map(|size| !size.is_empty())
            .unwrap_or(false)
        && !host.is_hidden(node)
}
