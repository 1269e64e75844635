//! Browser driver for the Rome deposit dApp.
//!
//! Every lookup goes through a capability probe: an ordered list of
//! selectors is tried, each with its own timeout, and the result is either
//! `Probe::Found(handle)` or `Probe::NotFound`. Callers decide whether a
//! missing element is an error.

use anyhow::Result;
use async_trait::async_trait;
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

mod session;
mod webdriver;

pub use session::{first_decimal, DappSession};
pub use webdriver::{WebDriverBrowser, WebDriverPage};

use crate::chain::{BridgeResult, WalletPair};

/// A CSS selector or a text match on elements of a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Css(Cow<'static, str>),
    Text {
        tag: Cow<'static, str>,
        text: Cow<'static, str>,
    },
}

impl Selector {
    pub const fn css(css: &'static str) -> Self {
        Selector::Css(Cow::Borrowed(css))
    }

    pub const fn text(tag: &'static str, text: &'static str) -> Self {
        Selector::Text {
            tag: Cow::Borrowed(tag),
            text: Cow::Borrowed(text),
        }
    }

    /// XPath equivalent of a text match; only the innermost element of `tag`
    /// holding the text matches, never its ancestors
    pub fn to_xpath(&self) -> Option<String> {
        match self {
            Selector::Css(_) => None,
            Selector::Text { tag, text } => {
                let contains = format!("contains(normalize-space(.), '{}')", text.replace('\'', ""));
                Some(format!("//{tag}[{contains} and not(.//{tag}[{contains}])]"))
            }
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(css) => f.write_str(css),
            Selector::Text { tag, text } => write!(f, "{}:has-text(\"{}\")", tag, text),
        }
    }
}

/// Outcome of looking for an element
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<H> {
    Found(H),
    NotFound,
}

impl<H> Probe<H> {
    pub fn is_found(&self) -> bool {
        matches!(self, Probe::Found(_))
    }
}

/// Waits used by the dApp flows
#[derive(Debug, Clone)]
pub struct UiTimings {
    pub probe_timeout: Duration,
    pub short_probe_timeout: Duration,
    pub settle: Duration,
    pub popup_wait: Duration,
    pub bridge_wait: Duration,
    pub success_timeout: Duration,
}

impl Default for UiTimings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            short_probe_timeout: Duration::from_secs(3),
            settle: Duration::from_secs(2),
            popup_wait: Duration::from_secs(5),
            bridge_wait: Duration::from_secs(10),
            success_timeout: Duration::from_secs(15),
        }
    }
}

impl UiTimings {
    #[cfg(test)]
    pub(crate) fn immediate() -> Self {
        Self {
            probe_timeout: Duration::ZERO,
            short_probe_timeout: Duration::ZERO,
            settle: Duration::ZERO,
            popup_wait: Duration::ZERO,
            bridge_wait: Duration::ZERO,
            success_timeout: Duration::ZERO,
        }
    }
}

/// Primitive page operations a browser backend provides
#[async_trait]
pub trait PageSession: Send + Sync {
    type Handle: Send + Sync;

    async fn locate(&self, selector: &Selector, timeout: Duration) -> Result<Probe<Self::Handle>>;
    async fn click(&self, handle: &Self::Handle) -> Result<()>;
    async fn fill(&self, handle: &Self::Handle, value: &str) -> Result<()>;
    async fn text(&self, handle: &Self::Handle) -> Result<String>;
    async fn goto(&self, url: &str) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    /// PNG bytes of the current page
    async fn screenshot(&self) -> Result<Vec<u8>>;
    async fn windows(&self) -> Result<Vec<String>>;
    async fn current_window(&self) -> Result<String>;
    async fn switch_to_window(&self, window: &str) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// dApp-level operations used by the orchestrator and form submission
#[async_trait]
pub trait DappBrowser: Send {
    async fn initialize(&mut self) -> Result<()>;
    async fn navigate(&mut self, url: &str) -> Result<()>;
    async fn connect_wallet(&mut self, pair: &WalletPair) -> Result<bool>;
    async fn perform_bridge(&mut self, amount: f64) -> BridgeResult;
    /// rSOL balance text, "0" when nothing readable is shown
    async fn check_balance(&mut self) -> String;
    async fn screenshot(&mut self, name: &str) -> Result<Option<PathBuf>>;
    /// Click approve buttons in open wallet extension windows; returns how many
    async fn approve_wallet_popups(&mut self) -> Result<usize>;
    /// Fill `fields` (input name, value) on the form at `url` and submit it
    async fn submit_form(&mut self, url: &str, fields: &[(String, String)]) -> Result<bool>;
    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory page: elements are keyed by the selector's display form
    pub struct FakePage {
        pub elements: Mutex<HashMap<String, String>>,
        pub clicks: Mutex<Vec<String>>,
        pub fills: Mutex<Vec<(String, String)>>,
        pub visited: Mutex<Vec<String>>,
        pub windows: Vec<(String, String)>,
        pub active: Mutex<String>,
    }

    impl FakePage {
        pub fn new(elements: &[(&str, &str)]) -> Self {
            Self {
                elements: Mutex::new(
                    elements
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                clicks: Mutex::new(Vec::new()),
                fills: Mutex::new(Vec::new()),
                visited: Mutex::new(Vec::new()),
                windows: vec![("main".to_string(), "https://rome.testnet.romeprotocol.xyz".to_string())],
                active: Mutex::new("main".to_string()),
            }
        }

        pub fn with_window(mut self, id: &str, url: &str) -> Self {
            self.windows.push((id.to_string(), url.to_string()));
            self
        }

        pub fn clicked(&self, selector: &Selector) -> bool {
            self.clicks
                .lock()
                .map(|c| c.contains(&selector.to_string()))
                .unwrap_or(false)
        }

        pub fn click_count(&self) -> usize {
            self.clicks.lock().map(|c| c.len()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl PageSession for FakePage {
        type Handle = String;

        async fn locate(&self, selector: &Selector, _timeout: Duration) -> Result<Probe<String>> {
            let key = selector.to_string();
            let found = self.elements.lock().map(|e| e.contains_key(&key)).unwrap_or(false);
            Ok(if found { Probe::Found(key) } else { Probe::NotFound })
        }

        async fn click(&self, handle: &String) -> Result<()> {
            if let Ok(mut clicks) = self.clicks.lock() {
                clicks.push(handle.clone());
            }
            Ok(())
        }

        async fn fill(&self, handle: &String, value: &str) -> Result<()> {
            if let Ok(mut fills) = self.fills.lock() {
                fills.push((handle.clone(), value.to_string()));
            }
            Ok(())
        }

        async fn text(&self, handle: &String) -> Result<String> {
            Ok(self
                .elements
                .lock()
                .ok()
                .and_then(|e| e.get(handle).cloned())
                .unwrap_or_default())
        }

        async fn goto(&self, url: &str) -> Result<()> {
            if let Ok(mut visited) = self.visited.lock() {
                visited.push(url.to_string());
            }
            Ok(())
        }

        async fn current_url(&self) -> Result<String> {
            let active = self.active.lock().map(|a| a.clone()).unwrap_or_default();
            Ok(self
                .windows
                .iter()
                .find(|(id, _)| *id == active)
                .map(|(_, url)| url.clone())
                .unwrap_or_default())
        }

        async fn screenshot(&self) -> Result<Vec<u8>> {
            Ok(vec![0x89, b'P', b'N', b'G'])
        }

        async fn windows(&self) -> Result<Vec<String>> {
            Ok(self.windows.iter().map(|(id, _)| id.clone()).collect())
        }

        async fn current_window(&self) -> Result<String> {
            Ok(self.active.lock().map(|a| a.clone()).unwrap_or_default())
        }

        async fn switch_to_window(&self, window: &str) -> Result<()> {
            if let Ok(mut active) = self.active.lock() {
                *active = window.to_string();
            }
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }
}
