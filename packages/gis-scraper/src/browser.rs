//! chromiumoxide-backed implementation of the [`dom`](crate::dom) traits.
//!
//! chromiumoxide exposes no stable shadow-root API on its element handles, so
//! this adapter keeps element identity page-side: a small injected registry
//! maps integer handles to live DOM nodes, and every operation is a JS
//! evaluation against that registry.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::{BrowserConfig, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::dom::{Browser, Element, PageSession};
use crate::resolver::POLL_INTERVAL;

const REGISTRY_JS: &str = r#"
if (!window.__gisDom) {
    window.__gisDom = {
        handles: [],
        keep(el) {
            if (el === null || el === undefined) return null;
            this.handles.push(el);
            return this.handles.length - 1;
        },
        get(i) { return i === null ? document : this.handles[i]; },
    };
}
"#;

/// Build an expression that binds `el` to the registry entry (or the
/// document for `None`) and evaluates `body` against it.
fn script(target: Option<i64>, body: &str) -> String {
    let target = serde_json::json!(target);
    format!("(() => {{ {REGISTRY_JS} const el = window.__gisDom.get({target}); return ({body}); }})()")
}

fn js_string(value: &str) -> String {
    serde_json::json!(value).to_string()
}

/// Headless Chromium owned for the duration of one batch.
pub struct CdpBrowser {
    browser: chromiumoxide::Browser,
    handler_task: JoinHandle<()>,
}

impl CdpBrowser {
    pub async fn launch(headless: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder();
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .build()
            .map_err(|reason| anyhow!(reason))
            .context("invalid browser configuration")?;

        let (browser, mut handler) = chromiumoxide::Browser::launch(config)
            .await
            .context("failed to launch browser")?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .context("failed to close browser")?;
        self.handler_task.abort();
        Ok(())
    }
}

#[async_trait]
impl Browser for CdpBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageSession>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to open a new page")?;
        Ok(Box::new(CdpPage { page }))
    }
}

pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    async fn eval<T: DeserializeOwned>(&self, expression: String) -> Result<T> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .context("script evaluation failed")?;
        result.into_value().context("unexpected script result")
    }

    fn element(&self, handle: i64) -> CdpElement {
        CdpElement {
            page: self.page.clone(),
            handle: Some(handle),
        }
    }
}

#[async_trait]
impl PageSession for CdpPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            anyhow::Ok(())
        };
        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| anyhow!("navigation to {url} timed out"))?
    }

    async fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<Box<dyn Element>>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self.find(selector).await? {
                return Ok(Some(found));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn find(&self, selector: &str) -> Result<Option<Box<dyn Element>>> {
        let body = format!(
            "window.__gisDom.keep(el.querySelector({}))",
            js_string(selector)
        );
        let handle: Option<i64> = self.eval(script(None, &body)).await?;
        match handle {
            Some(handle) => Ok(Some(Box::new(self.element(handle)))),
            None => Ok(None),
        }
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .page
            .url()
            .await
            .context("failed to read page URL")?
            .unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        self.page
            .clone()
            .close()
            .await
            .context("failed to close page")
    }
}

pub struct CdpElement {
    page: Page,
    handle: Option<i64>,
}

impl CdpElement {
    async fn eval<T: DeserializeOwned>(&self, body: &str) -> Result<T> {
        let result = self
            .page
            .evaluate(script(self.handle, body))
            .await
            .context("script evaluation failed")?;
        result.into_value().context("unexpected script result")
    }

    fn wrap(&self, handle: Option<i64>) -> Option<Box<dyn Element>> {
        handle.map(|handle| {
            Box::new(CdpElement {
                page: self.page.clone(),
                handle: Some(handle),
            }) as Box<dyn Element>
        })
    }
}

#[async_trait]
impl Element for CdpElement {
    async fn shadow_root(&self) -> Result<Option<Box<dyn Element>>> {
        let handle: Option<i64> = self.eval("window.__gisDom.keep(el.shadowRoot)").await?;
        Ok(self.wrap(handle))
    }

    async fn query(&self, selector: &str) -> Result<Option<Box<dyn Element>>> {
        let body = format!(
            "window.__gisDom.keep(el.querySelector({}))",
            js_string(selector)
        );
        let handle: Option<i64> = self.eval(&body).await?;
        Ok(self.wrap(handle))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Element>>> {
        let body = format!(
            "Array.from(el.querySelectorAll({})).map(n => window.__gisDom.keep(n))",
            js_string(selector)
        );
        let handles: Vec<i64> = self.eval(&body).await?;
        Ok(handles
            .into_iter()
            .filter_map(|handle| self.wrap(Some(handle)))
            .collect())
    }

    async fn text(&self) -> Result<Option<String>> {
        self.eval("el.textContent ?? null").await
    }

    async fn value(&self) -> Result<Option<String>> {
        self.eval("el.value === undefined ? null : String(el.value)")
            .await
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        let body = format!(
            "el.getAttribute ? el.getAttribute({}) : null",
            js_string(name)
        );
        self.eval(&body).await
    }

    async fn click(&self) -> Result<()> {
        let clicked: bool = self.eval("(el.click(), true)").await?;
        if !clicked {
            return Err(anyhow!("click did not dispatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_quotes_selectors_safely() {
        let body = format!(
            "window.__gisDom.keep(el.querySelector({}))",
            js_string("card[data-test=\"Dams\"]")
        );
        let expression = script(Some(3), &body);
        assert!(expression.contains("window.__gisDom.get(3)"));
        assert!(expression.contains("card[data-test=\\\"Dams\\\"]"));
    }

    #[test]
    fn document_target_serializes_as_null() {
        let expression = script(None, "true");
        assert!(expression.contains("window.__gisDom.get(null)"));
    }
}
