//! Drives a real Chrome. Run with
//! `DOM_BRIDGE_CHROME_BIN=/path/to/chrome cargo test -- --ignored`.

use std::path::PathBuf;

use dom_bridge::chrome::{BrowserSession, ChromeHost};
use dom_bridge::config::ChromeConfig;
use dom_bridge::server::BridgeHost;
use dom_bridge::{ActionDefaults, ActionRequest, Document, ElementTarget};

const PAGE: &str = "data:text/html,<title>Smoke</title>\
    <input id='q' name='q'>\
    <select id='s1'><option value='r'>Red</option><option value='g'>Green</option></select>\
    <button id='go' onclick=\"document.title='clicked:'+document.getElementById('q').value\">Go</button>\
    <span data-balance>7.00</span>";

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a Chrome binary in DOM_BRIDGE_CHROME_BIN"]
async fn live_page_round_trip() {
    let Ok(bin) = std::env::var("DOM_BRIDGE_CHROME_BIN") else {
        eprintln!("DOM_BRIDGE_CHROME_BIN not set, skipping");
        return;
    };
    let config = ChromeConfig {
        path: Some(PathBuf::from(bin)),
        ..ChromeConfig::default()
    };

    let session = tokio::task::spawn_blocking(move || {
        let session = BrowserSession::launch(&config)?;
        session.navigate(PAGE)?;
        Ok::<_, anyhow::Error>(session)
    })
    .await
    .unwrap()
    .unwrap();

    // a second injection into the same page reuses the first
    let mut first = session.bridge(ActionDefaults::default()).unwrap();
    assert!(first.is_fresh());
    let second = session.bridge(ActionDefaults::default()).unwrap();
    assert!(!second.is_fresh());

    // the second capture replaced the first, so writes through it are refused
    let stale = first
        .perform(&ActionRequest::click(ElementTarget::by_id("go")))
        .await;
    assert!(!stale.ok);
    assert!(
        stale.error.as_deref().unwrap_or_default().contains("page changed"),
        "{stale:?}"
    );
    // and selector queries too
    assert!(first.document().query_selector("#go").is_err());

    let host = ChromeHost::new(session, ActionDefaults::default());

    let scan = host.scan().await.unwrap();
    assert_eq!(scan.title, "Smoke");
    let tags: Vec<&str> = scan.elements.iter().map(|el| el.tag.as_str()).collect();
    assert_eq!(tags, vec!["button", "input", "select"]);
    assert!(scan.elements.iter().all(|el| el.visible));

    let results = host
        .perform(vec![
            ActionRequest::fill(ElementTarget::by_id("q"), "hello"),
            ActionRequest::select(ElementTarget::by_id("s1"), "green"),
            ActionRequest::click(ElementTarget::by_text("go")),
            // only exists once the previous click ran
            ActionRequest::click(ElementTarget::by_text("next")),
            ActionRequest::click(ElementTarget::by_selector("body > button:last-of-type")),
        ])
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.ok), "{results:?}");

    let state = host.state().await.unwrap();
    assert_eq!(state.title, "clicked:hello next next");
    assert_eq!(state.hint_balance.as_deref(), Some("7.00"));
}
