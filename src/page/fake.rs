//! Scriptable in-memory page for exercising the pipeline without a browser.
//!
//! Nodes answer to the exact selector strings from [`crate::selectors`] they
//! were built with. Scrolling the list or clicking "show more" reveals the next
//! queued page of items, which is enough to model lazy loading.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{NodeHandle, Page, ScrollExtent};
use crate::selectors as sel;

const ROW_HEIGHT: u64 = 48;

pub fn token(id: &str) -> String {
    format!(r#"186014;BardVeMetadataKey:[null,null,null,null,null,null,null,["c_{id}",null,0]];mutable:true"#)
}

#[derive(Debug, Clone)]
pub struct Item {
    pub title: Option<String>,
    pub token: Option<String>,
}

pub fn item(title: &str, id: &str) -> Item {
    Item {
        title: Some(title.to_string()),
        token: Some(token(id)),
    }
}

#[derive(Debug, Default)]
struct Node {
    matches: Vec<&'static str>,
    attrs: HashMap<String, String>,
    text: String,
    visible: bool,
    parent: Option<usize>,
    children: Vec<usize>,
    scroll: Option<ScrollExtent>,
}

#[derive(Default)]
pub struct FakePage {
    nodes: RefCell<Vec<Node>>,
    pages: RefCell<VecDeque<Vec<Item>>>,
    endless: Cell<bool>,
    next_generated: Cell<usize>,
    sidenav: Cell<Option<usize>>,
    list: Cell<Option<usize>>,
    show_more: Cell<Option<usize>>,
    menu: Cell<Option<usize>>,
    menu_opens: Cell<bool>,
    fail_text: Cell<bool>,
    reveal_period: Cell<u32>,
    pub scrolls: Cell<u32>,
    pub runs_begun: Cell<u32>,
    pub clicks: RefCell<Vec<NodeHandle>>,
    pub revealed: Cell<u32>,
}

impl FakePage {
    /// Sidebar already open with the list and `items` rendered.
    pub fn open_sidebar(items: Vec<Item>) -> Self {
        let page = Self::default();
        let nav = page.add(
            None,
            Node {
                matches: vec![sel::SIDENAV],
                attrs: HashMap::from([(
                    "style".to_string(),
                    format!("width: {}", sel::SIDENAV_OPEN_WIDTH),
                )]),
                visible: true,
                ..Default::default()
            },
        );
        let list = page.add(
            Some(nav),
            Node {
                matches: vec![sel::CONVERSATION_LIST],
                visible: true,
                ..Default::default()
            },
        );
        page.sidenav.set(Some(nav));
        page.list.set(Some(list));
        page.append_items(items);
        page
    }

    /// Sidebar collapsed; `menu_selector` finds the toggle, which opens it
    /// when clicked if `opens` is set.
    pub fn collapsed_sidebar(menu_selector: &'static str, opens: bool, items: Vec<Item>) -> Self {
        let page = Self::open_sidebar(items);
        page.set_sidenav_open(false);
        let menu = page.add(
            None,
            Node {
                matches: vec![menu_selector, "button"],
                text: "Main menu".to_string(),
                visible: true,
                ..Default::default()
            },
        );
        page.menu.set(Some(menu));
        page.menu_opens.set(opens);
        page
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn scrollable(self) -> Self {
        if let Some(list) = self.list.get() {
            let rows = self.nodes.borrow()[list].children.len() as u64;
            self.nodes.borrow_mut()[list].scroll = Some(ScrollExtent {
                scroll_height: rows * ROW_HEIGHT + ROW_HEIGHT,
                client_height: ROW_HEIGHT,
            });
        }
        self
    }

    pub fn with_pages(self, pages: Vec<Vec<Item>>) -> Self {
        *self.pages.borrow_mut() = pages.into();
        self
    }

    pub fn endless(self) -> Self {
        self.endless.set(true);
        self
    }

    /// Only every `period`-th scroll of the list loads anything.
    pub fn revealing_every(self, period: u32) -> Self {
        self.reveal_period.set(period);
        self
    }

    pub fn with_show_more(self, label: &str) -> Self {
        let list = self.list.get().expect("fake page has no list");
        let btn = self.add(
            Some(list),
            Node {
                matches: vec![sel::SHOW_MORE_BUTTON],
                text: label.to_string(),
                visible: true,
                ..Default::default()
            },
        );
        self.show_more.set(Some(btn));
        self
    }

    pub fn with_menu_expanded(self, expanded: bool) -> Self {
        if let Some(menu) = self.menu.get() {
            self.nodes.borrow_mut()[menu]
                .attrs
                .insert("aria-expanded".to_string(), expanded.to_string());
        }
        self
    }

    /// Make text reads fail, as if the tab went away mid-run.
    pub fn failing(self) -> Self {
        self.fail_text.set(true);
        self
    }

    pub fn menu_clicks(&self) -> usize {
        let menu = self.menu.get();
        self.clicks
            .borrow()
            .iter()
            .filter(|h| Some(h.0) == menu)
            .count()
    }

    pub fn show_more_clicks(&self) -> usize {
        let btn = self.show_more.get();
        self.clicks
            .borrow()
            .iter()
            .filter(|h| Some(h.0) == btn)
            .count()
    }

    pub fn set_sidenav_open(&self, open: bool) {
        if let Some(nav) = self.sidenav.get() {
            let mut nodes = self.nodes.borrow_mut();
            let width = if open { sel::SIDENAV_OPEN_WIDTH } else { "0px" };
            nodes[nav].attrs.insert("style".to_string(), format!("width: {}", width));
            nodes[nav].visible = open;
        }
    }

    fn add(&self, parent: Option<usize>, mut node: Node) -> usize {
        let mut nodes = self.nodes.borrow_mut();
        let idx = nodes.len();
        node.parent = parent;
        nodes.push(node);
        if let Some(p) = parent {
            nodes[p].children.push(idx);
        }
        idx
    }

    fn append_items(&self, items: Vec<Item>) {
        let Some(list) = self.list.get() else { return };
        let count = items.len() as u64;
        for it in items {
            let container = self.add(
                Some(list),
                Node {
                    matches: vec![sel::ITEM_CONTAINER],
                    visible: true,
                    ..Default::default()
                },
            );
            let Some(token) = it.token else { continue };
            let conv = self.add(
                Some(container),
                Node {
                    matches: vec![sel::CONVERSATION_ITEM],
                    attrs: HashMap::from([(sel::METADATA_ATTR.to_string(), token)]),
                    visible: true,
                    ..Default::default()
                },
            );
            if let Some(title) = it.title {
                self.add(
                    Some(conv),
                    Node {
                        matches: vec![sel::CONVERSATION_TITLE],
                        text: title,
                        visible: true,
                        ..Default::default()
                    },
                );
            }
        }
        if let Some(extent) = self.nodes.borrow_mut()[list].scroll.as_mut() {
            extent.scroll_height += count * ROW_HEIGHT;
        }
    }

    fn reveal_next(&self) {
        let next = self.pages.borrow_mut().pop_front();
        match next {
            Some(items) => {
                self.revealed.set(self.revealed.get() + 1);
                self.append_items(items);
            }
            None if self.endless.get() => {
                let n = self.next_generated.get();
                self.next_generated.set(n + 1);
                self.revealed.set(self.revealed.get() + 1);
                self.append_items(vec![item(&format!("Generated {n}"), &format!("gen{n}"))]);
            }
            None => {}
        }
        if self.pages.borrow().is_empty() && !self.endless.get() {
            if let Some(btn) = self.show_more.get() {
                self.nodes.borrow_mut()[btn].text = "Show less".to_string();
            }
        }
    }

    fn descendants(&self, root: usize, out: &mut Vec<usize>) {
        let children = self.nodes.borrow()[root].children.clone();
        for c in children {
            out.push(c);
            self.descendants(c, out);
        }
    }

    fn candidates(&self, scope: Option<NodeHandle>) -> Vec<usize> {
        match scope {
            Some(h) => {
                let mut out = Vec::new();
                self.descendants(h.0, &mut out);
                out
            }
            None => (0..self.nodes.borrow().len()).collect(),
        }
    }

    fn check(&self, node: NodeHandle) -> Result<()> {
        if node.0 < self.nodes.borrow().len() {
            Ok(())
        } else {
            Err(anyhow!("Unknown node handle {}", node.0))
        }
    }

    fn full_text(&self, idx: usize) -> String {
        let nodes = self.nodes.borrow();
        let mut text = nodes[idx].text.clone();
        let children = nodes[idx].children.clone();
        drop(nodes);
        for c in children {
            text.push_str(&self.full_text(c));
        }
        text
    }
}

#[async_trait(?Send)]
impl Page for FakePage {
    async fn begin_run(&self) -> Result<()> {
        self.runs_begun.set(self.runs_begun.get() + 1);
        Ok(())
    }

    async fn query(&self, scope: Option<NodeHandle>, selector: &str) -> Result<Option<NodeHandle>> {
        Ok(self.query_all(scope, selector).await?.into_iter().next())
    }

    async fn query_all(&self, scope: Option<NodeHandle>, selector: &str) -> Result<Vec<NodeHandle>> {
        let candidates = self.candidates(scope);
        let nodes = self.nodes.borrow();
        Ok(candidates
            .into_iter()
            .filter(|&i| nodes[i].matches.contains(&selector))
            .map(NodeHandle)
            .collect())
    }

    async fn attribute(&self, node: NodeHandle, name: &str) -> Result<Option<String>> {
        self.check(node)?;
        Ok(self.nodes.borrow()[node.0].attrs.get(name).cloned())
    }

    async fn text(&self, node: NodeHandle) -> Result<String> {
        self.check(node)?;
        if self.fail_text.get() {
            return Err(anyhow!("Target closed"));
        }
        Ok(self.full_text(node.0))
    }

    async fn is_visible(&self, node: NodeHandle) -> Result<bool> {
        self.check(node)?;
        Ok(self.nodes.borrow()[node.0].visible)
    }

    async fn parent(&self, node: NodeHandle) -> Result<Option<NodeHandle>> {
        self.check(node)?;
        Ok(self.nodes.borrow()[node.0].parent.map(NodeHandle))
    }

    async fn scroll_extent(&self, node: NodeHandle) -> Result<Option<ScrollExtent>> {
        self.check(node)?;
        Ok(self.nodes.borrow()[node.0].scroll)
    }

    async fn scroll_to_bottom(&self, node: NodeHandle) -> Result<()> {
        self.check(node)?;
        self.scrolls.set(self.scrolls.get() + 1);
        let period = self.reveal_period.get().max(1);
        if Some(node.0) == self.list.get() && self.scrolls.get() % period == 0 {
            self.reveal_next();
        }
        Ok(())
    }

    async fn click(&self, node: NodeHandle) -> Result<()> {
        self.check(node)?;
        self.clicks.borrow_mut().push(node);
        if Some(node.0) == self.menu.get() && self.menu_opens.get() {
            self.set_sidenav_open(true);
        } else if Some(node.0) == self.show_more.get() {
            self.reveal_next();
        }
        Ok(())
    }
}
