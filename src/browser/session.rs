/// dApp flows (wallet connect, bridge, balance, forms) on top of a page session
use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{DappBrowser, PageSession, Probe, Selector, UiTimings};
use crate::chain::{BridgeResult, WalletPair};

const CONNECT_BUTTONS: &[Selector] = &[
    Selector::text("button", "Connect Wallet"),
    Selector::text("button", "Connect"),
    Selector::css("[data-testid=\"connect-wallet\"]"),
    Selector::css(".connect-wallet-button"),
    Selector::css("button[class*=\"connect\"]"),
];

const WALLET_OPTIONS: &[Selector] = &[
    Selector::text("button", "MetaMask"),
    Selector::text("button", "Rabby"),
    Selector::css("[data-testid=\"metamask\"]"),
    Selector::css("[data-testid=\"rabby\"]"),
];

const CONNECTED_INDICATORS: &[Selector] = &[
    Selector::css("[data-testid=\"wallet-connected\"]"),
    Selector::text("button", "Disconnect"),
    Selector::css(".wallet-address"),
    Selector::css("[class*=\"connected\"]"),
];

const NETWORK_BUTTONS: &[Selector] = &[
    Selector::text("button", "Add Network"),
    Selector::text("button", "Switch Network"),
    Selector::css("[data-testid=\"network-selector\"]"),
];

const ROME_NETWORKS: &[Selector] = &[
    Selector::text("button", "Caelian"),
    Selector::text("button", "Martis"),
    Selector::text("button", "Rome"),
];

const BRIDGE_BUTTONS: &[Selector] = &[
    Selector::text("button", "Bridge $SOL"),
    Selector::text("button", "Bridge SOL"),
    Selector::css("[data-testid=\"bridge-sol\"]"),
    Selector::css(".bridge-button"),
];

const AMOUNT_INPUTS: &[Selector] = &[
    Selector::css("input[placeholder*=\"amount\"]"),
    Selector::css("input[placeholder*=\"SOL\"]"),
    Selector::css("input[type=\"number\"]"),
    Selector::css("[data-testid=\"amount-input\"]"),
];

const CONFIRM_BUTTONS: &[Selector] = &[
    Selector::text("button", "Confirm"),
    Selector::text("button", "Bridge"),
    Selector::text("button", "Continue"),
    Selector::css("[data-testid=\"confirm-bridge\"]"),
];

const SUCCESS_INDICATORS: &[Selector] = &[
    Selector::text("*", "Bridge successful"),
    Selector::text("*", "Success"),
    Selector::text("*", "Completed"),
    Selector::css("[data-testid=\"success\"]"),
];

const BALANCE_ELEMENTS: &[Selector] = &[
    Selector::css("[data-testid=\"rsol-balance\"]"),
    Selector::css(".rsol-balance"),
    Selector::text("*", "rSOL"),
    Selector::css("[class*=\"balance\"]"),
];

const APPROVE_BUTTONS: &[Selector] = &[
    Selector::text("button", "Approve"),
    Selector::text("button", "Confirm"),
    Selector::text("button", "Sign"),
    Selector::text("button", "Connect"),
    Selector::css("[data-testid=\"confirm\"]"),
];

const FORM_SUBMIT_BUTTONS: &[Selector] = &[
    Selector::text("div[@role='button']", "Submit"),
    Selector::css("div[role=\"button\"][jsname]"),
    Selector::css("button[type=\"submit\"]"),
];

const FORM_CONFIRMATIONS: &[Selector] = &[
    Selector::text("*", "response has been recorded"),
    Selector::css(".freebirdFormviewerViewResponseConfirmationMessage"),
];

const EXTENSION_SCHEMES: &[&str] = &["chrome-extension://", "moz-extension://"];

pub struct DappSession<P: PageSession> {
    page: P,
    timings: UiTimings,
    screenshots_dir: PathBuf,
    screenshots: bool,
}

impl<P: PageSession> DappSession<P> {
    pub fn new(page: P, timings: UiTimings, screenshots_dir: PathBuf, screenshots: bool) -> Self {
        Self {
            page,
            timings,
            screenshots_dir,
            screenshots,
        }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// First selector in `selectors` that resolves
    pub async fn probe(&self, selectors: &[Selector], timeout: Duration) -> Result<Probe<P::Handle>> {
        for selector in selectors {
            if let Probe::Found(handle) = self.page.locate(selector, timeout).await? {
                debug!("Found element {}", selector);
                return Ok(Probe::Found(handle));
            }
        }
        Ok(Probe::NotFound)
    }

    /// Click the first matching element; false when none is present
    async fn click_first(&self, selectors: &[Selector], timeout: Duration) -> Result<bool> {
        match self.probe(selectors, timeout).await? {
            Probe::Found(handle) => {
                self.page.click(&handle).await?;
                Ok(true)
            }
            Probe::NotFound => Ok(false),
        }
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        sleep(self.timings.settle).await;
        info!("Navigated to {}", url);
        Ok(())
    }

    pub async fn connect_wallet(&self, pair: &WalletPair) -> Result<bool> {
        info!("Connecting wallet {}", pair.evm.address);
        if !self.click_first(CONNECT_BUTTONS, self.timings.probe_timeout).await? {
            warn!("Connect wallet button not found");
            return Ok(false);
        }
        sleep(self.timings.settle).await;

        if self.click_first(WALLET_OPTIONS, self.timings.short_probe_timeout).await? {
            sleep(self.timings.settle).await;
        }

        sleep(self.timings.popup_wait).await;
        if let Err(e) = self.approve_wallet_popups().await {
            warn!("Wallet popup handling failed: {}", e);
        }

        if self.probe(CONNECTED_INDICATORS, self.timings.probe_timeout).await?.is_found() {
            info!("Wallet connected successfully");
            return Ok(true);
        }

        let switched = self.add_rome_network().await?;
        info!("Wallet connection process completed (network switched: {})", switched);
        Ok(switched)
    }

    async fn add_rome_network(&self) -> Result<bool> {
        if !self.click_first(NETWORK_BUTTONS, self.timings.short_probe_timeout).await? {
            return Ok(false);
        }
        sleep(self.timings.settle).await;
        if self.click_first(ROME_NETWORKS, self.timings.short_probe_timeout).await? {
            sleep(self.timings.settle).await;
            info!("Rome network added/switched");
            return Ok(true);
        }
        warn!("Could not add Rome network automatically");
        Ok(false)
    }

    pub async fn perform_bridge(&self, amount: f64) -> BridgeResult {
        match self.bridge(amount).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Bridge operation failed: {}", e);
                BridgeResult::failed(e.to_string())
            }
        }
    }

    async fn bridge(&self, amount: f64) -> Result<BridgeResult> {
        if !self.click_first(BRIDGE_BUTTONS, self.timings.probe_timeout).await? {
            warn!("Bridge SOL button not found");
            return Ok(BridgeResult::failed("Bridge SOL button not found"));
        }
        sleep(self.timings.settle).await;

        // Amount input is optional on some layouts
        if let Probe::Found(input) = self.probe(AMOUNT_INPUTS, self.timings.short_probe_timeout).await? {
            self.page.fill(&input, &amount.to_string()).await?;
        }

        if self.click_first(CONFIRM_BUTTONS, self.timings.short_probe_timeout).await? {
            sleep(self.timings.settle).await;
        }
        if let Err(e) = self.approve_wallet_popups().await {
            warn!("Wallet popup handling failed: {}", e);
        }

        sleep(self.timings.bridge_wait).await;
        if !self.probe(SUCCESS_INDICATORS, self.timings.success_timeout).await?.is_found() {
            return Ok(BridgeResult::failed("No bridge success indicator shown"));
        }

        info!("Bridge of {} SOL completed", amount);
        let balance = self.check_balance().await;
        Ok(BridgeResult {
            success: true,
            r_sol_balance: Some(balance),
            ..BridgeResult::default()
        })
    }

    pub async fn check_balance(&self) -> String {
        for selector in BALANCE_ELEMENTS {
            let handle = match self.page.locate(selector, self.timings.probe_timeout).await {
                Ok(Probe::Found(handle)) => handle,
                Ok(Probe::NotFound) => continue,
                Err(e) => {
                    warn!("Balance lookup failed: {}", e);
                    continue;
                }
            };
            if let Ok(text) = self.page.text(&handle).await {
                if let Some(balance) = first_decimal(&text) {
                    info!("Found rSOL balance: {}", balance);
                    return balance;
                }
            }
        }
        "0".to_string()
    }

    /// Save a PNG under the screenshots directory when screenshots are enabled
    pub async fn screenshot(&self, name: &str) -> Result<Option<PathBuf>> {
        if !self.screenshots {
            return Ok(None);
        }
        fs::create_dir_all(&self.screenshots_dir)?;
        let file_name = if name.ends_with(".png") {
            name.to_string()
        } else {
            format!("{}.png", name)
        };
        let path = self.screenshots_dir.join(file_name);
        fs::write(&path, self.page.screenshot().await?)?;
        info!("Screenshot saved: {:?}", path);
        Ok(Some(path))
    }

    pub async fn approve_wallet_popups(&self) -> Result<usize> {
        let origin = self.page.current_window().await?;
        let mut approved = 0;

        for window in self.page.windows().await? {
            if window == origin {
                continue;
            }
            self.page.switch_to_window(&window).await?;
            let url = self.page.current_url().await?;
            if !EXTENSION_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
                continue;
            }
            if self.click_first(APPROVE_BUTTONS, self.timings.short_probe_timeout).await? {
                info!("Approved wallet request in {}", url);
                approved += 1;
                sleep(self.timings.settle).await;
            }
        }

        self.page.switch_to_window(&origin).await?;
        Ok(approved)
    }

    pub async fn submit_form(&self, url: &str, fields: &[(String, String)]) -> Result<bool> {
        self.navigate(url).await?;

        for (name, value) in fields {
            let selector = Selector::Css(format!("input[name=\"{}\"], textarea[name=\"{}\"]", name, name).into());
            match self.page.locate(&selector, self.timings.probe_timeout).await? {
                Probe::Found(input) => self.page.fill(&input, value).await?,
                Probe::NotFound => {
                    warn!("Form field {} not found", name);
                    return Ok(false);
                }
            }
        }

        if !self.click_first(FORM_SUBMIT_BUTTONS, self.timings.probe_timeout).await? {
            warn!("Form submit button not found");
            return Ok(false);
        }
        sleep(self.timings.settle).await;
        Ok(self
            .probe(FORM_CONFIRMATIONS, self.timings.probe_timeout)
            .await?
            .is_found())
    }

    pub async fn close(&self) -> Result<()> {
        self.page.close().await
    }
}

#[async_trait]
impl<P: PageSession> DappBrowser for DappSession<P> {
    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        DappSession::navigate(self, url).await
    }

    async fn connect_wallet(&mut self, pair: &WalletPair) -> Result<bool> {
        DappSession::connect_wallet(self, pair).await
    }

    async fn perform_bridge(&mut self, amount: f64) -> BridgeResult {
        DappSession::perform_bridge(self, amount).await
    }

    async fn check_balance(&mut self) -> String {
        DappSession::check_balance(self).await
    }

    async fn screenshot(&mut self, name: &str) -> Result<Option<PathBuf>> {
        DappSession::screenshot(self, name).await
    }

    async fn approve_wallet_popups(&mut self) -> Result<usize> {
        DappSession::approve_wallet_popups(self).await
    }

    async fn submit_form(&mut self, url: &str, fields: &[(String, String)]) -> Result<bool> {
        DappSession::submit_form(self, url, fields).await
    }

    async fn close(&mut self) -> Result<()> {
        DappSession::close(self).await
    }
}

/// First decimal number in `text`, e.g. "Balance: 1.25 rSOL" -> "1.25"
pub fn first_decimal(text: &str) -> Option<String> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let mut end = start;
    let mut seen_dot = false;
    for (offset, c) in text[start..].char_indices() {
        if c.is_ascii_digit() {
            end = start + offset + 1;
        } else if c == '.' && !seen_dot {
            seen_dot = true;
        } else {
            break;
        }
    }
    Some(text[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakePage;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn session(page: FakePage) -> DappSession<FakePage> {
        DappSession::new(page, UiTimings::immediate(), PathBuf::from("screenshots"), false)
    }

    fn key(selector: &Selector) -> String {
        selector.to_string()
    }

    #[test]
    fn test_first_decimal() {
        assert_eq!(first_decimal("Balance: 1.25 rSOL").as_deref(), Some("1.25"));
        assert_eq!(first_decimal("42 rSOL").as_deref(), Some("42"));
        assert_eq!(first_decimal("3. items").as_deref(), Some("3"));
        assert_eq!(first_decimal("no balance"), None);
    }

    #[tokio::test]
    async fn test_connect_without_button_returns_false() {
        let session = session(FakePage::new(&[]));
        let pair = WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap();
        assert!(!session.connect_wallet(&pair).await.unwrap());
        assert_eq!(session.page().click_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_with_indicator() {
        let connect = key(&CONNECT_BUTTONS[1]);
        let rabby = key(&WALLET_OPTIONS[1]);
        let connected = key(&CONNECTED_INDICATORS[2]);
        let page = FakePage::new(&[(&connect, ""), (&rabby, ""), (&connected, "0x9858...")]);
        let session = session(page);
        let pair = WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap();

        assert!(session.connect_wallet(&pair).await.unwrap());
        assert!(session.page().clicked(&CONNECT_BUTTONS[1]));
        assert!(session.page().clicked(&WALLET_OPTIONS[1]));
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_network_switch() {
        let connect = key(&CONNECT_BUTTONS[0]);
        let network = key(&NETWORK_BUTTONS[0]);
        let martis = key(&ROME_NETWORKS[1]);
        let session = session(FakePage::new(&[(&connect, ""), (&network, ""), (&martis, "")]));
        let pair = WalletPair::from_mnemonic(MNEMONIC, "", 0).unwrap();

        assert!(session.connect_wallet(&pair).await.unwrap());
        assert!(session.page().clicked(&ROME_NETWORKS[1]));
    }

    #[tokio::test]
    async fn test_bridge_without_button_fails() {
        let session = session(FakePage::new(&[]));
        let result = session.perform_bridge(1.0).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Bridge SOL button not found"));
    }

    #[tokio::test]
    async fn test_bridge_success_reads_balance() {
        let bridge = key(&BRIDGE_BUTTONS[1]);
        let success = key(&SUCCESS_INDICATORS[0]);
        let balance = key(&BALANCE_ELEMENTS[1]);
        let session = session(FakePage::new(&[
            (&bridge, ""),
            (&success, "Bridge successful"),
            (&balance, "Balance: 0.95 rSOL"),
        ]));

        let result = session.perform_bridge(1.0).await;
        assert!(result.success);
        assert_eq!(result.r_sol_balance.as_deref(), Some("0.95"));
        // Optional amount input was absent
        assert!(session.page().fills.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_balance_defaults_to_zero() {
        let session = session(FakePage::new(&[(&key(&BALANCE_ELEMENTS[3]), "loading")]));
        assert_eq!(session.check_balance().await, "0");
    }

    #[tokio::test]
    async fn test_approve_popups_only_in_extension_windows() {
        let approve = key(&APPROVE_BUTTONS[0]);
        let page = FakePage::new(&[(&approve, "")])
            .with_window("popup", "chrome-extension://abcdef/notification.html")
            .with_window("other", "https://example.com");
        let session = session(page);

        assert_eq!(session.approve_wallet_popups().await.unwrap(), 1);
        assert_eq!(session.page().current_window().await.unwrap(), "main");
    }

    #[tokio::test]
    async fn test_screenshot_disabled_and_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let disabled = DappSession::new(FakePage::new(&[]), UiTimings::immediate(), dir.path().to_path_buf(), false);
        assert_eq!(disabled.screenshot("bridge").await.unwrap(), None);

        let enabled = DappSession::new(FakePage::new(&[]), UiTimings::immediate(), dir.path().to_path_buf(), true);
        let path = enabled.screenshot("bridge").await.unwrap().unwrap();
        assert!(path.ends_with("bridge.png"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_submit_form_fills_fields() {
        let address_field = "input[name=\"entry.1\"], textarea[name=\"entry.1\"]";
        let submit = key(&FORM_SUBMIT_BUTTONS[0]);
        let confirmation = key(&FORM_CONFIRMATIONS[0]);
        let session = session(FakePage::new(&[(address_field, ""), (&submit, ""), (&confirmation, "")]));

        let fields = vec![("entry.1".to_string(), "0xabc".to_string())];
        assert!(session.submit_form("https://forms.example/form", &fields).await.unwrap());
        assert_eq!(
            session.page().fills.lock().unwrap().clone(),
            vec![(address_field.to_string(), "0xabc".to_string())]
        );

        let missing = vec![("entry.2".to_string(), "7".to_string())];
        assert!(!session.submit_form("https://forms.example/form", &missing).await.unwrap());
    }
}
