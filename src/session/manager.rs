// * Session lifecycle for the scraped dashboard.
// *
// * Guarantees that whenever the extractor asks, an authenticated dashboard
// * page is loaded. Owns the browser, its CDP handler task and the page;
// * nothing else touches them. Login failures are reported, not retried
// * here — the scheduler's cadence governs retries.

use std::time::{Duration, Instant};

use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::constants::{
    DASHBOARD_SETTLE_MS, NAVIGATION_TIMEOUT_MS, POST_LOGIN_SETTLE_MS,
};
use crate::config::DashboardConfig;
use crate::session::browser::{find_first, launch, wait_for_predicate};

// * True once the page body shows at least one power figure.
const POWER_VISIBLE_JS: &str = r#"
(() => {
  const text = document.body ? document.body.innerText : "";
  return /\d\s*k?W\b/.test(text);
})()
"#;

const EMAIL_SELECTORS: &[&str] = &[
    "#usernameUserInput",
    "input[name='Email']",
    "input[name='email']",
    "#Email",
    "#email",
    "input[type='email']",
    "input[id*='email']",
];

const PASSWORD_SELECTORS: &[&str] = &[
    "input[name='Password']",
    "input[name='password']",
    "#Password",
    "#password",
    "input[type='password']",
];

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("session expired")]
    Expired,

    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("navigation timed out after {0}ms")]
    NavigationTimeout(u64),
}

// * Liveness of the authenticated browser context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Unauthenticated,
    Authenticated,
    Expired,
}

pub struct SessionManager {
    cfg: DashboardConfig,
    freshness: Duration,
    relogin_after: Duration,
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    page: Option<Page>,
    state: Liveness,
    last_confirmed: Option<Instant>,
    established_at: Option<Instant>,
}

impl SessionManager {
    pub fn new(cfg: DashboardConfig, freshness: Duration, relogin_after: Duration) -> Self {
        Self {
            cfg,
            freshness,
            relogin_after,
            browser: None,
            handler_task: None,
            page: None,
            state: Liveness::Unauthenticated,
            last_confirmed: None,
            established_at: None,
        }
    }

    pub fn liveness(&self) -> Liveness {
        self.state
    }

    // * Ensures an authenticated, loaded dashboard page and returns it.
    // * Recently confirmed sessions skip the probe entirely; a failed probe
    // * marks the session expired so the next call performs a full relogin.
    pub async fn ensure_ready(&mut self) -> Result<Page, SessionError> {
        let overdue = self
            .established_at
            .is_some_and(|at| at.elapsed() >= self.relogin_after);
        if overdue {
            info!("session past relogin cadence, forcing refresh");
        }

        if self.page.is_none() || self.state != Liveness::Authenticated || overdue {
            return self.login().await;
        }

        // * `state == Authenticated` implies the page is set.
        let page = match self.page.clone() {
            Some(page) => page,
            None => return self.login().await,
        };

        if self
            .last_confirmed
            .is_some_and(|at| at.elapsed() < self.freshness)
        {
            return Ok(page);
        }

        match self.probe(&page).await {
            Ok(()) => {
                self.last_confirmed = Some(Instant::now());
                Ok(page)
            }
            Err(reason) => {
                warn!(reason, "liveness probe failed, marking session expired");
                self.state = Liveness::Expired;
                Err(SessionError::Expired)
            }
        }
    }

    // * Drops the current session entirely. The next ensure_ready performs a
    // * full login against a fresh browser. Used by the scheduler to recover
    // * from states a plain retry cannot fix.
    pub async fn teardown(&mut self) {
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }
        if let Some(mut browser) = self.browser.take() {
            let _ = browser.close().await;
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        self.state = Liveness::Unauthenticated;
        self.last_confirmed = None;
        self.established_at = None;
        info!("session torn down");
    }

    // * Full login: fresh browser, credential submit, dashboard load.
    async fn login(&mut self) -> Result<Page, SessionError> {
        // * Release the old automation resources before launching new ones.
        self.teardown().await;

        let (browser, handler_task) = launch(self.cfg.headless).await?;
        self.browser = Some(browser);
        self.handler_task = Some(handler_task);

        info!("navigating to login page");
        let page = self.open(&self.cfg.login_url).await?;

        let email_field = find_first(&page, EMAIL_SELECTORS).await.ok_or_else(|| {
            SessionError::AuthenticationFailed("login inputs not found".to_string())
        })?;
        email_field
            .click()
            .await
            .map_err(|e| SessionError::AuthenticationFailed(e.to_string()))?;
        email_field
            .type_str(&self.cfg.email)
            .await
            .map_err(|e| SessionError::AuthenticationFailed(e.to_string()))?;

        let password_field = find_first(&page, PASSWORD_SELECTORS).await.ok_or_else(|| {
            SessionError::AuthenticationFailed("password input not found".to_string())
        })?;
        password_field
            .click()
            .await
            .map_err(|e| SessionError::AuthenticationFailed(e.to_string()))?;
        password_field
            .type_str(&self.cfg.password)
            .await
            .map_err(|e| SessionError::AuthenticationFailed(e.to_string()))?;
        password_field
            .press_key("Enter")
            .await
            .map_err(|e| SessionError::AuthenticationFailed(e.to_string()))?;

        tokio::time::sleep(Duration::from_millis(POST_LOGIN_SETTLE_MS)).await;

        let current = page.url().await.ok().flatten().unwrap_or_default();
        if is_login_url(&current) {
            self.state = Liveness::Unauthenticated;
            return Err(SessionError::AuthenticationFailed(
                "still on login page after submit".to_string(),
            ));
        }
        info!("login submitted");

        // * Open the PV system page and wait for live figures to render.
        self.goto(&page, &self.cfg.system_url).await?;
        tokio::time::sleep(Duration::from_millis(DASHBOARD_SETTLE_MS)).await;
        if !wait_for_predicate(&page, POWER_VISIBLE_JS).await {
            self.state = Liveness::Unauthenticated;
            return Err(SessionError::AuthenticationFailed(
                "dashboard loaded without power figures".to_string(),
            ));
        }

        self.state = Liveness::Authenticated;
        self.last_confirmed = Some(Instant::now());
        self.established_at = Some(Instant::now());
        self.page = Some(page.clone());
        info!("dashboard session established");
        Ok(page)
    }

    // * Lightweight liveness probe: still off the login page and a power
    // * figure is present.
    async fn probe(&self, page: &Page) -> Result<(), &'static str> {
        let current = page.url().await.ok().flatten().unwrap_or_default();
        if is_login_url(&current) {
            return Err("bounced to login page");
        }

        let visible = page
            .evaluate(POWER_VISIBLE_JS)
            .await
            .ok()
            .and_then(|v| v.into_value::<bool>().ok())
            .unwrap_or(false);
        if !visible {
            return Err("power figures no longer present");
        }
        Ok(())
    }

    async fn open(&self, url: &str) -> Result<Page, SessionError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| SessionError::Navigation("browser not running".to_string()))?;
        let timeout = Duration::from_millis(NAVIGATION_TIMEOUT_MS);
        match tokio::time::timeout(timeout, browser.new_page(url)).await {
            Ok(Ok(page)) => Ok(page),
            Ok(Err(e)) => Err(SessionError::Navigation(e.to_string())),
            Err(_) => Err(SessionError::NavigationTimeout(NAVIGATION_TIMEOUT_MS)),
        }
    }

    async fn goto(&self, page: &Page, url: &str) -> Result<(), SessionError> {
        let timeout = Duration::from_millis(NAVIGATION_TIMEOUT_MS);
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Navigation(e.to_string())),
            Err(_) => Err(SessionError::NavigationTimeout(NAVIGATION_TIMEOUT_MS)),
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        // * Best effort - can't await in drop.
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
    }
}

// * Login/consent detection by URL, matching the dashboard's redirect
// * behavior when a session dies.
pub fn is_login_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("login") || lower.contains("signin")
}
