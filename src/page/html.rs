use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{NodeHandle, Page, ScrollExtent};

/// A saved copy of the app page. Nothing on it changes: clicks and scrolls are
/// accepted and ignored, and no element reports itself as scrollable.
pub struct HtmlPage {
    html: Html,
    nodes: RefCell<Vec<NodeId>>,
    handles: RefCell<HashMap<NodeId, NodeHandle>>,
}

impl HtmlPage {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
            nodes: RefCell::new(Vec::new()),
            handles: RefCell::new(HashMap::new()),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        Ok(Self::parse(&source))
    }

    fn handle(&self, el: ElementRef<'_>) -> NodeHandle {
        let id = el.id();
        if let Some(h) = self.handles.borrow().get(&id) {
            return *h;
        }
        let mut nodes = self.nodes.borrow_mut();
        let h = NodeHandle(nodes.len());
        nodes.push(id);
        self.handles.borrow_mut().insert(id, h);
        h
    }

    fn element(&self, node: NodeHandle) -> Result<ElementRef<'_>> {
        let id = self
            .nodes
            .borrow()
            .get(node.0)
            .copied()
            .ok_or_else(|| anyhow!("Unknown node handle {}", node.0))?;
        self.html
            .tree
            .get(id)
            .and_then(ElementRef::wrap)
            .ok_or_else(|| anyhow!("Node {} is not an element", node.0))
    }

    fn select_in(&self, scope: Option<NodeHandle>, selector: &str) -> Result<Vec<NodeHandle>> {
        let sel = Selector::parse(selector).map_err(|e| anyhow!("Bad selector {}: {}", selector, e))?;
        let found: Vec<ElementRef<'_>> = match scope {
            Some(h) => self.element(h)?.select(&sel).collect(),
            None => self.html.select(&sel).collect(),
        };
        Ok(found.into_iter().map(|el| self.handle(el)).collect())
    }
}

fn hidden_inline(el: &ElementRef<'_>) -> bool {
    if el.value().attr("hidden").is_some() {
        return true;
    }
    el.value()
        .attr("style")
        .map(|s| s.replace(' ', "").contains("display:none"))
        .unwrap_or(false)
}

#[async_trait(?Send)]
impl Page for HtmlPage {
    async fn query(&self, scope: Option<NodeHandle>, selector: &str) -> Result<Option<NodeHandle>> {
        Ok(self.select_in(scope, selector)?.into_iter().next())
    }

    async fn query_all(&self, scope: Option<NodeHandle>, selector: &str) -> Result<Vec<NodeHandle>> {
        self.select_in(scope, selector)
    }

    async fn attribute(&self, node: NodeHandle, name: &str) -> Result<Option<String>> {
        Ok(self.element(node)?.value().attr(name).map(str::to_string))
    }

    async fn text(&self, node: NodeHandle) -> Result<String> {
        Ok(self.element(node)?.text().collect())
    }

    async fn is_visible(&self, node: NodeHandle) -> Result<bool> {
        let el = self.element(node)?;
        if hidden_inline(&el) {
            return Ok(false);
        }
        Ok(!el.ancestors().filter_map(ElementRef::wrap).any(|a| hidden_inline(&a)))
    }

    async fn parent(&self, node: NodeHandle) -> Result<Option<NodeHandle>> {
        let el = self.element(node)?;
        Ok(el.parent().and_then(ElementRef::wrap).map(|p| self.handle(p)))
    }

    async fn scroll_extent(&self, _node: NodeHandle) -> Result<Option<ScrollExtent>> {
        Ok(None)
    }

    async fn scroll_to_bottom(&self, node: NodeHandle) -> Result<()> {
        debug!("Snapshot page: ignoring scroll on node {}", node.0);
        Ok(())
    }

    async fn click(&self, node: NodeHandle) -> Result<()> {
        debug!("Snapshot page: ignoring click on node {}", node.0);
        Ok(())
    }
}
