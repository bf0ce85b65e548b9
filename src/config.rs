//! Runtime configuration, read from the environment (and a `.env` file when
//! present).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::bridge::ActionDefaults;

#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub actions: ActionDefaults,
    pub chrome: ChromeConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct ChromeConfig {
    /// DevTools endpoint of an already running Chrome to attach to.
    pub debug_url: Option<String>,
    /// Chrome binary; discovered by headless_chrome when unset.
    pub path: Option<PathBuf>,
    pub headless: bool,
    pub window: (u32, u32),
    /// Extra settle time after a navigation completes.
    pub settle: Duration,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            debug_url: None,
            path: None,
            headless: true,
            window: (1280, 720),
            settle: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// First port tried; the next few are tried when it is taken.
    pub port: u16,
    pub port_span: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            port_span: 10,
        }
    }
}

impl BridgeConfig {
    /// Load `.env` if there is one, then read `DOM_BRIDGE_*` variables over
    /// the defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(ms) = parse_var::<u64>(&get, "DOM_BRIDGE_WAIT_MS")? {
            config.actions.wait = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&get, "DOM_BRIDGE_STEP_PAUSE_MS")? {
            config.actions.step_pause = Duration::from_millis(ms);
        }

        config.chrome.debug_url = get("DOM_BRIDGE_DEBUG_URL");
        config.chrome.path = get("DOM_BRIDGE_CHROME_PATH").map(PathBuf::from);
        if let Some(headless) = get("DOM_BRIDGE_HEADLESS") {
            config.chrome.headless = parse_bool(&headless)
                .with_context(|| format!("DOM_BRIDGE_HEADLESS={headless}"))?;
        }
        if let Some(window) = get("DOM_BRIDGE_WINDOW") {
            config.chrome.window =
                parse_window(&window).with_context(|| format!("DOM_BRIDGE_WINDOW={window}"))?;
        }
        if let Some(ms) = parse_var::<u64>(&get, "DOM_BRIDGE_SETTLE_MS")? {
            config.chrome.settle = Duration::from_millis(ms);
        }

        if let Some(host) = get("DOM_BRIDGE_HOST") {
            config.server.host = host;
        }
        if let Some(port) = parse_var::<u16>(&get, "DOM_BRIDGE_PORT")? {
            config.server.port = port;
        }

        Ok(config)
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{key}={raw} is not valid"))
        })
        .transpose()
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("expected a boolean, got '{other}'")),
    }
}

fn parse_window(raw: &str) -> Result<(u32, u32)> {
    let (width, height) = raw
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT"))?;
    Ok((width.trim().parse()?, height.trim().parse()?))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<BridgeConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BridgeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let config = load(&[]).unwrap();
        assert_eq!(config.actions, ActionDefaults::default());
        assert!(config.chrome.headless);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("DOM_BRIDGE_WAIT_MS", "250"),
            ("DOM_BRIDGE_STEP_PAUSE_MS", "0"),
            ("DOM_BRIDGE_HEADLESS", "off"),
            ("DOM_BRIDGE_WINDOW", "800x600"),
            ("DOM_BRIDGE_DEBUG_URL", "ws://127.0.0.1:9222/devtools/browser/abc"),
            ("DOM_BRIDGE_PORT", "4100"),
        ])
        .unwrap();
        assert_eq!(config.actions.wait, Duration::from_millis(250));
        assert!(config.actions.step_pause.is_zero());
        assert!(!config.chrome.headless);
        assert_eq!(config.chrome.window, (800, 600));
        assert!(config.chrome.debug_url.is_some());
        assert_eq!(config.server.port, 4100);
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = load(&[("DOM_BRIDGE_WAIT_MS", "soon")]).unwrap_err();
        assert!(format!("{err:#}").contains("DOM_BRIDGE_WAIT_MS"));
        let err = load(&[("DOM_BRIDGE_WINDOW", "wide")]).unwrap_err();
        assert!(format!("{err:#}").contains("DOM_BRIDGE_WINDOW"));
    }
}
