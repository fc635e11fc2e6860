//! Live page backend: a Chrome tab driven over the DevTools protocol.
//!
//! Element handles live in a small registry injected into the page, so each
//! capability call is a single `Runtime.evaluate` round trip. The registry is
//! emptied at the start of every run so detached nodes are not pinned.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::{Browser, Page as Tab};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{NodeHandle, Page, ScrollExtent};

const HELPER_JS: &str = r#"
window.__harvest = window.__harvest || (() => {
  const nodes = [];
  const ids = new Map();
  const reg = (el) => {
    if (!ids.has(el)) { ids.set(el, nodes.length); nodes.push(el); }
    return ids.get(el);
  };
  const at = (n) => {
    const el = nodes[n];
    if (!el) throw new Error('unknown node handle ' + n);
    return el;
  };
  const scope = (s) => (s < 0 ? document : at(s));
  return {
    query: (s, sel) => { const el = scope(s).querySelector(sel); return el ? reg(el) : -1; },
    queryAll: (s, sel) => Array.from(scope(s).querySelectorAll(sel)).map(reg),
    attr: (n, name) => { const v = at(n).getAttribute(name); return v === null ? [] : [v]; },
    text: (n) => at(n).textContent || '',
    visible: (n) => { const el = at(n); return el.offsetParent !== null || getComputedStyle(el).display !== 'none'; },
    parent: (n) => { const p = at(n).parentElement; return p ? reg(p) : -1; },
    extent: (n) => {
      const el = at(n);
      const oy = getComputedStyle(el).overflowY;
      return (oy === 'auto' || oy === 'scroll') ? [el.scrollHeight, el.clientHeight] : [];
    },
    scrollBottom: (n) => { const el = at(n); el.scrollTo(0, el.scrollHeight); return true; },
    click: (n) => { at(n).click(); return true; },
    reset: () => { nodes.length = 0; ids.clear(); return true; },
  };
})();
"#;

pub struct CdpPage {
    _browser: Browser,
    tab: Tab,
    handler: JoinHandle<()>,
}

impl CdpPage {
    /// Connect to a running Chrome (`http://host:port` or a `ws://` debugger
    /// URL) and open `app_url` in a new tab of that browser's session.
    pub async fn attach(remote_url: &str, app_url: &str) -> Result<Self> {
        info!("Connecting to browser at {}", remote_url);
        let (browser, mut handler) = Browser::connect(remote_url)
            .await
            .context("Failed to connect to remote browser")?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let tab = browser
            .new_page(app_url)
            .await
            .with_context(|| format!("Failed to open {}", app_url))?;
        tab.wait_for_navigation()
            .await
            .context("Navigation to app did not finish")?;
        debug!("Opened {}", app_url);

        Ok(Self {
            _browser: browser,
            tab,
            handler,
        })
    }

    /// Close the tab this page opened. The browser itself keeps running.
    pub async fn close(self) -> Result<()> {
        self.tab.clone().close().await.context("Failed to close app tab")?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(&self, expr: String) -> Result<T> {
        let result = self.tab.evaluate(script(&expr)).await?;
        Ok(result.into_value()?)
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

fn script(expr: &str) -> String {
    format!("{}\nwindow.__harvest.{}", HELPER_JS, expr)
}

fn scope_arg(scope: Option<NodeHandle>) -> i64 {
    scope.map(|h| h.0 as i64).unwrap_or(-1)
}

fn to_handle(raw: i64) -> Option<NodeHandle> {
    usize::try_from(raw).ok().map(NodeHandle)
}

#[async_trait(?Send)]
impl Page for CdpPage {
    async fn begin_run(&self) -> Result<()> {
        let _: bool = self.call("reset()".to_string()).await?;
        Ok(())
    }

    async fn query(&self, scope: Option<NodeHandle>, selector: &str) -> Result<Option<NodeHandle>> {
        let sel = serde_json::to_string(selector)?;
        let raw: i64 = self.call(format!("query({}, {})", scope_arg(scope), sel)).await?;
        Ok(to_handle(raw))
    }

    async fn query_all(&self, scope: Option<NodeHandle>, selector: &str) -> Result<Vec<NodeHandle>> {
        let sel = serde_json::to_string(selector)?;
        let raw: Vec<usize> = self.call(format!("queryAll({}, {})", scope_arg(scope), sel)).await?;
        Ok(raw.into_iter().map(NodeHandle).collect())
    }

    async fn attribute(&self, node: NodeHandle, name: &str) -> Result<Option<String>> {
        let name = serde_json::to_string(name)?;
        let raw: Vec<String> = self.call(format!("attr({}, {})", node.0, name)).await?;
        Ok(raw.into_iter().next())
    }

    async fn text(&self, node: NodeHandle) -> Result<String> {
        self.call(format!("text({})", node.0)).await
    }

    async fn is_visible(&self, node: NodeHandle) -> Result<bool> {
        self.call(format!("visible({})", node.0)).await
    }

    async fn parent(&self, node: NodeHandle) -> Result<Option<NodeHandle>> {
        let raw: i64 = self.call(format!("parent({})", node.0)).await?;
        Ok(to_handle(raw))
    }

    async fn scroll_extent(&self, node: NodeHandle) -> Result<Option<ScrollExtent>> {
        let raw: Vec<u64> = self.call(format!("extent({})", node.0)).await?;
        Ok(match raw.as_slice() {
            [scroll_height, client_height] => Some(ScrollExtent {
                scroll_height: *scroll_height,
                client_height: *client_height,
            }),
            _ => None,
        })
    }

    async fn scroll_to_bottom(&self, node: NodeHandle) -> Result<()> {
        let _: bool = self.call(format!("scrollBottom({})", node.0)).await?;
        Ok(())
    }

    async fn click(&self, node: NodeHandle) -> Result<()> {
        let _: bool = self.call(format!("click({})", node.0)).await?;
        Ok(())
    }
}
