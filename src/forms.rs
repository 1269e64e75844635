/// Reward form submission (Google Forms style endpoints)
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::browser::DappBrowser;
use crate::config::FormConfig;
use crate::http::HttpPoster;

pub const SUBMISSION_GAP: Duration = Duration::from_secs(2);

pub struct FormSubmitter {
    config: FormConfig,
    http: Arc<dyn HttpPoster>,
    gap: Duration,
}

impl FormSubmitter {
    pub fn new(config: FormConfig, http: Arc<dyn HttpPoster>) -> Self {
        Self {
            config,
            http,
            gap: SUBMISSION_GAP,
        }
    }

    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    fn fields(&self, address: &str, tx_count: u64, extra: &[(String, String)]) -> Vec<(String, String)> {
        let mut fields = vec![
            (self.config.entry_address.clone(), address.to_string()),
            (self.config.entry_tx_count.clone(), tx_count.to_string()),
        ];
        fields.extend(extra.iter().cloned());
        fields
    }

    /// POST the urlencoded form; false when the form is not fully configured
    pub async fn submit_form_api(&self, address: &str, tx_count: u64, extra: &[(String, String)]) -> bool {
        if !self.config.is_complete() {
            warn!("Form configuration not complete, skipping submission");
            return false;
        }

        let fields = self.fields(address, tx_count, extra);
        match self.http.post_form(&self.config.url, &fields).await {
            Ok(reply) if reply.is_success() => {
                info!("Form submitted for {} with {} transactions", address, tx_count);
                true
            }
            Ok(reply) => {
                warn!("Form submission for {} returned status {}", address, reply.status);
                false
            }
            Err(e) => {
                warn!("Failed to submit form via API: {}", e);
                false
            }
        }
    }

    pub async fn submit_form_browser(
        &self,
        browser: &mut dyn DappBrowser,
        address: &str,
        tx_count: u64,
        extra: &[(String, String)],
    ) -> bool {
        if !self.config.is_complete() {
            warn!("Form configuration not complete, skipping submission");
            return false;
        }

        let fields = self.fields(address, tx_count, extra);
        match browser.submit_form(&self.config.url, &fields).await {
            Ok(submitted) => {
                if submitted {
                    info!("Form submitted in browser for {}", address);
                }
                submitted
            }
            Err(e) => {
                warn!("Failed to submit form via browser: {}", e);
                false
            }
        }
    }

    /// Submit one form per address; uses the browser when one is given
    pub async fn submit_multiple_forms(
        &self,
        addresses: &[String],
        tx_counts: &[u64],
        mut browser: Option<&mut dyn DappBrowser>,
    ) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        if addresses.len() != tx_counts.len() {
            warn!(
                "Got {} addresses but {} transaction counts, nothing submitted",
                addresses.len(),
                tx_counts.len()
            );
            return results;
        }

        for (i, (address, count)) in addresses.iter().zip(tx_counts).enumerate() {
            let submitted = match browser.as_deref_mut() {
                Some(browser) => self.submit_form_browser(browser, address, *count, &[]).await,
                None => self.submit_form_api(address, *count, &[]).await,
            };
            results.insert(address.clone(), submitted);
            if i + 1 < addresses.len() {
                sleep(self.gap).await;
            }
        }

        let succeeded = results.values().filter(|ok| **ok).count();
        info!("Form submission completed: {}/{} successful", succeeded, addresses.len());
        results
    }

    /// Reachable form URL answering 200
    pub async fn validate_form_url(&self) -> bool {
        if self.config.url.is_empty() {
            return false;
        }
        match self.http.get(&self.config.url).await {
            Ok(reply) => reply.status == 200,
            Err(e) => {
                warn!("Form URL validation failed: {}", e);
                false
            }
        }
    }
}

pub fn create_reward_data(
    address: &str,
    tx_count: u64,
    contracts: &[String],
    total_volume: Option<&str>,
) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    data.insert("wallet_address".to_string(), address.to_string());
    data.insert("transaction_count".to_string(), tx_count.to_string());
    data.insert("timestamp".to_string(), Utc::now().to_rfc3339());
    if !contracts.is_empty() {
        data.insert("deployed_contracts".to_string(), contracts.join(", "));
        data.insert("contract_count".to_string(), contracts.len().to_string());
    }
    if let Some(volume) = total_volume {
        data.insert("total_volume".to_string(), volume.to_string());
    }
    data.insert("network".to_string(), "Rome Protocol Testnet".to_string());
    data.insert(
        "automation_tool".to_string(),
        format!("rome_automation v{}", env!("CARGO_PKG_VERSION")),
    );
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakePage;
    use crate::browser::{DappSession, UiTimings};
    use crate::faucet::testing::FakeHttp;
    use std::path::PathBuf;

    fn form_config() -> FormConfig {
        FormConfig {
            url: "https://docs.google.com/forms/d/e/abc/formResponse".to_string(),
            entry_address: "entry.111".to_string(),
            entry_tx_count: "entry.222".to_string(),
        }
    }

    #[tokio::test]
    async fn test_incomplete_config_skips_request() {
        let http = Arc::new(FakeHttp::new(vec![200]));
        let mut config = form_config();
        config.entry_tx_count.clear();
        let submitter = FormSubmitter::new(config, http.clone());

        assert!(!submitter.submit_form_api("0xabc", 5, &[]).await);
        assert_eq!(http.request_count(), 0);
    }

    #[tokio::test]
    async fn test_api_submission_encodes_fields() {
        let http = Arc::new(FakeHttp::new(vec![200]));
        let submitter = FormSubmitter::new(form_config(), http.clone());

        let extra = vec![("entry.333".to_string(), "note".to_string())];
        assert!(submitter.submit_form_api("0xabc", 5, &extra).await);
        let requests = http.requests.lock().unwrap().clone();
        assert_eq!(requests[0].0, form_config().url);
        assert_eq!(requests[0].1, "entry.111=0xabc&entry.222=5&entry.333=note");
    }

    #[tokio::test]
    async fn test_multiple_forms() {
        let http = Arc::new(FakeHttp::new(vec![200, 500]));
        let submitter = FormSubmitter::new(form_config(), http.clone()).with_gap(Duration::ZERO);

        let addresses = vec!["0xa".to_string(), "0xb".to_string()];
        let results = submitter.submit_multiple_forms(&addresses, &[3, 4], None).await;
        assert_eq!(results["0xa"], true);
        assert_eq!(results["0xb"], false);

        let mismatched = submitter.submit_multiple_forms(&addresses, &[3], None).await;
        assert!(mismatched.is_empty());
        assert_eq!(http.request_count(), 2);
    }

    #[tokio::test]
    async fn test_browser_submission() {
        let http = Arc::new(FakeHttp::new(vec![200]));
        let submitter = FormSubmitter::new(form_config(), http.clone());
        let address_field = "input[name=\"entry.111\"], textarea[name=\"entry.111\"]";
        let count_field = "input[name=\"entry.222\"], textarea[name=\"entry.222\"]";
        let page = FakePage::new(&[
            (address_field, ""),
            (count_field, ""),
            ("div[@role='button']:has-text(\"Submit\")", ""),
            ("*:has-text(\"response has been recorded\")", ""),
        ]);
        let mut browser = DappSession::new(page, UiTimings::immediate(), PathBuf::from("shots"), false);

        assert!(submitter.submit_form_browser(&mut browser, "0xabc", 9, &[]).await);
        assert_eq!(browser.page().fills.lock().unwrap().len(), 2);
        assert_eq!(http.request_count(), 0);
    }

    #[tokio::test]
    async fn test_validate_form_url() {
        let ok = FormSubmitter::new(form_config(), Arc::new(FakeHttp::new(vec![200])));
        assert!(ok.validate_form_url().await);
        let missing = FormSubmitter::new(form_config(), Arc::new(FakeHttp::new(vec![404])));
        assert!(!missing.validate_form_url().await);
        let mut config = form_config();
        config.url.clear();
        let empty = FormSubmitter::new(config, Arc::new(FakeHttp::new(vec![200])));
        assert!(!empty.validate_form_url().await);
    }

    #[test]
    fn test_reward_data() {
        let contracts = vec!["0x01".to_string(), "0x02".to_string()];
        let data = create_reward_data("0xabc", 12, &contracts, Some("0.5"));
        assert_eq!(data["transaction_count"], "12");
        assert_eq!(data["deployed_contracts"], "0x01, 0x02");
        assert_eq!(data["contract_count"], "2");
        assert_eq!(data["total_volume"], "0.5");

        let bare = create_reward_data("0xabc", 0, &[], None);
        assert!(!bare.contains_key("contract_count"));
        assert!(!bare.contains_key("total_volume"));
    }
}
