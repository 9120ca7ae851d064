//! Run configuration, built once at start-up and passed down explicitly.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8787";
pub const DEFAULT_SID: &str = "smoke-sid";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(50);

/// A labelled real-world page the reachability scenario fetches through `/fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub label: String,
    pub url: String,
}

impl Site {
    pub fn new(label: &str, url: &str) -> Self {
        Self {
            label: label.to_string(),
            url: url.to_string(),
        }
    }
}

impl std::str::FromStr for Site {
    type Err = String;

    /// Parses `label=url`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, url) = s
            .split_once('=')
            .ok_or_else(|| format!("expected label=url, got {s:?}"))?;
        if label.trim().is_empty() || url.trim().is_empty() {
            return Err(format!("expected label=url, got {s:?}"));
        }
        Ok(Site::new(label.trim(), url.trim()))
    }
}

pub fn default_sites() -> Vec<Site> {
    vec![
        Site::new("bilibili", "https://www.bilibili.com/"),
        Site::new("zhihu", "https://www.zhihu.com/"),
        Site::new("google", "https://www.google.com/"),
    ]
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Gateway root, without trailing slash.
    pub base_url: String,
    /// Session id sent with every gateway call. Never changes during a run.
    pub sid: String,
    /// Bound on each HTTP call.
    pub timeout: Duration,
    /// Sleep between consecutive scenarios.
    pub pause: Duration,
    pub reachability_targets: Vec<Site>,
}

impl HarnessConfig {
    pub fn new(base_url: &str, sid: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            sid: sid.to_string(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_sites(mut self, sites: Vec<Site>) -> Self {
        self.reachability_targets = sites;
        self
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            sid: DEFAULT_SID.to_string(),
            timeout: DEFAULT_TIMEOUT,
            pause: DEFAULT_PAUSE,
            reachability_targets: default_sites(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_gateway() {
        let config = HarnessConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8787");
        assert_eq!(config.sid, "smoke-sid");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.reachability_targets.len(), 3);
    }

    #[test]
    fn new_strips_trailing_slash() {
        let config = HarnessConfig::new("https://gw.example.net/", "abc");
        assert_eq!(config.base_url, "https://gw.example.net");
        assert_eq!(config.sid, "abc");
    }

    #[test]
    fn site_parses_label_and_url() {
        let site: Site = "docs=https://docs.rs/?q=a=b".parse().unwrap();
        assert_eq!(site.label, "docs");
        assert_eq!(site.url, "https://docs.rs/?q=a=b");
        assert!("no-separator".parse::<Site>().is_err());
        assert!("=https://x/".parse::<Site>().is_err());
    }
}
