/// WebDriver (chromedriver) backend built on fantoccini
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use super::{DappBrowser, DappSession, PageSession, Probe, Selector, UiTimings};
use crate::chain::{BridgeResult, WalletPair};
use crate::config::{BrowserConfig, Config};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct WebDriverPage {
    client: Client,
}

impl WebDriverPage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageSession for WebDriverPage {
    type Handle = Element;

    async fn locate(&self, selector: &Selector, timeout: Duration) -> Result<Probe<Element>> {
        let xpath = selector.to_xpath();
        let locator = match (selector, xpath.as_deref()) {
            (_, Some(xpath)) => Locator::XPath(xpath),
            (Selector::Css(css), None) => Locator::Css(css.as_ref()),
            (Selector::Text { .. }, None) => return Ok(Probe::NotFound),
        };

        probe_outcome(self.client.wait().at_most(timeout).for_element(locator).await)
    }

    async fn click(&self, handle: &Element) -> Result<()> {
        handle.click().await?;
        Ok(())
    }

    async fn fill(&self, handle: &Element, value: &str) -> Result<()> {
        handle.clear().await?;
        handle.send_keys(value).await?;
        Ok(())
    }

    async fn text(&self, handle: &Element) -> Result<String> {
        Ok(handle.text().await?)
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.client.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.client.screenshot().await?)
    }

    async fn windows(&self) -> Result<Vec<String>> {
        let windows = self.client.windows().await?;
        Ok(windows.into_iter().map(String::from).collect())
    }

    async fn current_window(&self) -> Result<String> {
        Ok(String::from(self.client.window().await?))
    }

    async fn switch_to_window(&self, window: &str) -> Result<()> {
        let handle = WindowHandle::try_from(window.to_string())
            .map_err(|e| anyhow!("Invalid window handle {}: {}", window, e))?;
        self.client.switch_to_window(handle).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().close().await?;
        Ok(())
    }
}

/// A wait that timed out or a missing element is `NotFound`; anything else is an error
fn probe_outcome<H>(outcome: Result<H, CmdError>) -> Result<Probe<H>> {
    match outcome {
        Ok(handle) => Ok(Probe::Found(handle)),
        Err(CmdError::WaitTimeout) => Ok(Probe::NotFound),
        Err(e) if e.is_no_such_element() => Ok(Probe::NotFound),
        Err(e) => Err(e.into()),
    }
}

/// Browser backed by a running chromedriver; connects on `initialize`
pub struct WebDriverBrowser {
    config: BrowserConfig,
    screenshots_dir: PathBuf,
    timings: UiTimings,
    session: Option<DappSession<WebDriverPage>>,
}

impl WebDriverBrowser {
    pub fn from_config(config: &Config) -> Self {
        Self {
            config: config.browser.clone(),
            screenshots_dir: config.screenshots_dir(),
            timings: UiTimings::default(),
            session: None,
        }
    }

    pub fn capabilities(&self) -> Map<String, Value> {
        let mut args = vec![
            "--disable-web-security".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--window-size=1920,1080".to_string(),
            format!("--user-agent={}", USER_AGENT),
        ];
        if self.config.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(dir) = &self.config.extension_dir {
            args.push(format!("--disable-extensions-except={}", dir));
            args.push(format!("--load-extension={}", dir));
        }

        let mut caps = Map::new();
        caps.insert("browserName".to_string(), json!("chrome"));
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({ "args": args, "excludeSwitches": ["enable-automation"] }),
        );
        caps.insert(
            "timeouts".to_string(),
            json!({ "pageLoad": self.config.timeout_ms, "script": self.config.timeout_ms }),
        );
        caps
    }

    fn session(&self) -> Result<&DappSession<WebDriverPage>> {
        self.session.as_ref().ok_or_else(|| anyhow!("Browser not initialized"))
    }
}

#[async_trait]
impl DappBrowser for WebDriverBrowser {
    async fn initialize(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let client = ClientBuilder::native()
            .capabilities(self.capabilities())
            .connect(&self.config.webdriver_url)
            .await
            .with_context(|| format!("Failed to reach WebDriver at {}", self.config.webdriver_url))?;

        self.session = Some(DappSession::new(
            WebDriverPage::new(client),
            self.timings.clone(),
            self.screenshots_dir.clone(),
            self.config.screenshots,
        ));
        info!("Browser initialized (headless: {})", self.config.headless);
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.session()?.navigate(url).await
    }

    async fn connect_wallet(&mut self, pair: &WalletPair) -> Result<bool> {
        self.session()?.connect_wallet(pair).await
    }

    async fn perform_bridge(&mut self, amount: f64) -> BridgeResult {
        match self.session() {
            Ok(session) => session.perform_bridge(amount).await,
            Err(e) => BridgeResult::failed(e.to_string()),
        }
    }

    async fn check_balance(&mut self) -> String {
        match self.session() {
            Ok(session) => session.check_balance().await,
            Err(_) => "0".to_string(),
        }
    }

    async fn screenshot(&mut self, name: &str) -> Result<Option<PathBuf>> {
        self.session()?.screenshot(name).await
    }

    async fn approve_wallet_popups(&mut self) -> Result<usize> {
        self.session()?.approve_wallet_popups().await
    }

    async fn submit_form(&mut self, url: &str, fields: &[(String, String)]) -> Result<bool> {
        self.session()?.submit_form(url, fields).await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Failed to close browser: {}", e);
                return Err(e);
            }
            info!("Browser closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fantoccini::error::{ErrorStatus, WebDriver};

    #[test]
    fn test_capabilities_follow_config() {
        let mut config = Config::default();
        config.browser.headless = true;
        config.browser.extension_dir = Some("/opt/rabby".to_string());
        let browser = WebDriverBrowser::from_config(&config);

        let caps = browser.capabilities();
        let args: Vec<String> = caps["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--load-extension=/opt/rabby".to_string()));
        assert_eq!(caps["timeouts"]["pageLoad"], json!(config.browser.timeout_ms));
    }

    #[test]
    fn test_missing_element_maps_to_not_found() {
        let missing = CmdError::Standard(WebDriver::new(ErrorStatus::NoSuchElement, "no such element"));
        assert_eq!(probe_outcome::<u8>(Err(missing)).unwrap(), Probe::NotFound);
        assert_eq!(probe_outcome::<u8>(Err(CmdError::WaitTimeout)).unwrap(), Probe::NotFound);
        assert_eq!(probe_outcome(Ok(7u8)).unwrap(), Probe::Found(7));

        let stale = CmdError::Standard(WebDriver::new(ErrorStatus::StaleElementReference, "stale"));
        assert!(probe_outcome::<u8>(Err(stale)).is_err());
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let mut browser = WebDriverBrowser::from_config(&Config::default());
        assert!(browser.navigate("https://example.com").await.is_err());
        assert!(!browser.perform_bridge(1.0).await.success);
        assert_eq!(browser.check_balance().await, "0");
        assert!(browser.close().await.is_ok());
    }
}
