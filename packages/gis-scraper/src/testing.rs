//! Testing utilities: an in-memory shadow-DOM tree and a fake browser.
//!
//! These are useful for exercising the navigation state machine without a
//! real browser. Nodes are built up imperatively, support click hooks so a
//! test can model asynchronous content appearing after an activation, and
//! track call counts for assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::dom::{Browser, Element, PageSession};

type ClickHook = Arc<dyn Fn() + Send + Sync>;

/// One fake DOM node. Children are keyed by the exact selector string that
/// finds them; a node's shadow tree is itself a node holding the shadowed
/// children.
#[derive(Default)]
pub struct FakeNode {
    text: Mutex<Option<String>>,
    value: Mutex<Option<String>>,
    attrs: Mutex<HashMap<String, String>>,
    children: Mutex<Vec<(String, Arc<FakeNode>)>>,
    shadow: Mutex<Option<Arc<FakeNode>>>,
    on_click: Mutex<Option<ClickHook>>,
    clicks: AtomicUsize,
    queries: AtomicUsize,
}

impl FakeNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create (or return the existing) shadow tree for this node.
    pub fn attach_shadow(&self) -> Arc<FakeNode> {
        let mut shadow = self.shadow.lock().unwrap();
        shadow.get_or_insert_with(FakeNode::new).clone()
    }

    pub fn add_child(&self, selector: &str, child: Arc<FakeNode>) {
        self.children
            .lock()
            .unwrap()
            .push((selector.to_string(), child));
    }

    pub fn remove_child(&self, selector: &str) {
        self.children
            .lock()
            .unwrap()
            .retain(|(key, _)| key != selector);
    }

    pub fn set_text(&self, text: &str) {
        *self.text.lock().unwrap() = Some(text.to_string());
    }

    pub fn set_value(&self, value: &str) {
        *self.value.lock().unwrap() = Some(value.to_string());
    }

    pub fn set_attr(&self, name: &str, value: &str) {
        self.attrs
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    pub fn on_click(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_click.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn clicks(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }

    /// How many selector lookups were made against this node's subtree.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn find(&self, selector: &str) -> Option<Arc<FakeNode>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.children
            .lock()
            .unwrap()
            .iter()
            .find(|(key, _)| key == selector)
            .map(|(_, node)| node.clone())
    }

    fn find_all(&self, selector: &str) -> Vec<Arc<FakeNode>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.children
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key == selector)
            .map(|(_, node)| node.clone())
            .collect()
    }
}

/// [`Element`] view over a [`FakeNode`].
#[derive(Clone)]
pub struct FakeElement(pub Arc<FakeNode>);

#[async_trait]
impl Element for FakeElement {
    async fn shadow_root(&self) -> Result<Option<Box<dyn Element>>> {
        Ok(self
            .0
            .shadow
            .lock()
            .unwrap()
            .clone()
            .map(|node| Box::new(FakeElement(node)) as Box<dyn Element>))
    }

    async fn query(&self, selector: &str) -> Result<Option<Box<dyn Element>>> {
        Ok(self
            .0
            .find(selector)
            .map(|node| Box::new(FakeElement(node)) as Box<dyn Element>))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Element>>> {
        Ok(self
            .0
            .find_all(selector)
            .into_iter()
            .map(|node| Box::new(FakeElement(node)) as Box<dyn Element>)
            .collect())
    }

    async fn text(&self) -> Result<Option<String>> {
        Ok(self.0.text.lock().unwrap().clone())
    }

    async fn value(&self) -> Result<Option<String>> {
        Ok(self.0.value.lock().unwrap().clone())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        Ok(self.0.attrs.lock().unwrap().get(name).cloned())
    }

    async fn click(&self) -> Result<()> {
        self.0.clicks.fetch_add(1, Ordering::SeqCst);
        let hook = self.0.on_click.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook();
        }
        Ok(())
    }
}

/// A fake page: a map of URL to document root, with optional redirects so a
/// test can model a details URL landing on an explore view.
#[derive(Default)]
pub struct FakePage {
    current: Mutex<String>,
    documents: Mutex<HashMap<String, Arc<FakeNode>>>,
    redirects: Mutex<HashMap<String, String>>,
    navigations: AtomicUsize,
    closed: AtomicBool,
}

impl FakePage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install the document served at `url`. Top-level hosts are the root
    /// node's direct children.
    pub fn install(&self, url: &str, document: Arc<FakeNode>) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), document);
    }

    /// Navigations to `from` land on `to`.
    pub fn redirect(&self, from: &str, to: &str) {
        self.redirects
            .lock()
            .unwrap()
            .insert(from.to_string(), to.to_string());
    }

    pub fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn current_document(&self) -> Option<Arc<FakeNode>> {
        let url = self.current.lock().unwrap().clone();
        self.documents.lock().unwrap().get(&url).cloned()
    }
}

#[async_trait]
impl PageSession for Arc<FakePage> {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        let landed = self
            .redirects
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        *self.current.lock().unwrap() = landed;
        Ok(())
    }

    async fn wait_for(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<Option<Box<dyn Element>>> {
        // The fake renders everything instantly.
        self.find(selector).await
    }

    async fn find(&self, selector: &str) -> Result<Option<Box<dyn Element>>> {
        let Some(document) = self.current_document() else {
            return Ok(None);
        };
        Ok(document
            .find(selector)
            .map(|node| Box::new(FakeElement(node)) as Box<dyn Element>))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A fake browser that hands out the same underlying page and counts how many
/// times a page was requested.
pub struct FakeBrowser {
    page: Arc<FakePage>,
    pages_opened: AtomicUsize,
    fail_new_page: AtomicBool,
}

impl FakeBrowser {
    pub fn new(page: Arc<FakePage>) -> Self {
        Self {
            page,
            pages_opened: AtomicUsize::new(0),
            fail_new_page: AtomicBool::new(false),
        }
    }

    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst)
    }

    /// Make subsequent `new_page` calls fail, to model a lost browser.
    pub fn fail_new_pages(&self) {
        self.fail_new_page.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageSession>> {
        if self.fail_new_page.load(Ordering::SeqCst) {
            bail!("browser connection lost");
        }
        self.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.page.clone()))
    }
}
