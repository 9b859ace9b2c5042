// * Headless browser launch and element-wait helpers.
// * The browser process is launched lazily by the SessionManager and torn
// * down before any replacement starts.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::constants::{ELEMENT_POLL_INTERVAL_MS, ELEMENT_WAIT_TIMEOUT_MS};
use crate::session::manager::SessionError;

// * Launches a browser with the rendering flags the dashboard needs:
// * containers lack a sandbox and shared memory, and an English locale
// * keeps the on-page labels stable for the extractor.
pub async fn launch(headless: bool) -> Result<(Browser, JoinHandle<()>), SessionError> {
    let mut builder = BrowserConfig::builder()
        .no_sandbox()
        .window_size(1366, 960)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu")
        .arg("--lang=en-US");
    if !headless {
        builder = builder.with_head();
    }
    let config = builder
        .build()
        .map_err(|e| SessionError::BrowserLaunch(e.to_string()))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| SessionError::BrowserLaunch(e.to_string()))?;

    // * Drive CDP events in the background for the browser's lifetime.
    let handle = tokio::spawn(async move {
        while let Some(_event) = handler.next().await {}
    });

    info!("browser launched");
    Ok((browser, handle))
}

// * Polls for the first selector in `candidates` that resolves, within the
// * element-wait budget. The dashboard's login form varies across rollouts,
// * hence a candidate list instead of a single selector.
pub async fn find_first(page: &Page, candidates: &[&str]) -> Option<Element> {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(ELEMENT_WAIT_TIMEOUT_MS);
    loop {
        for selector in candidates {
            if let Ok(element) = page.find_element(*selector).await {
                return Some(element);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(ELEMENT_POLL_INTERVAL_MS)).await;
    }
}

// * Polls a page-side predicate script until it returns true or the wait
// * budget runs out.
pub async fn wait_for_predicate(page: &Page, script: &str) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(ELEMENT_WAIT_TIMEOUT_MS);
    loop {
        let satisfied = page
            .evaluate(script)
            .await
            .ok()
            .and_then(|v| v.into_value::<bool>().ok())
            .unwrap_or(false);
        if satisfied {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(ELEMENT_POLL_INTERVAL_MS)).await;
    }
}
