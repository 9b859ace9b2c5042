// * Configuration Constants
// * Central location for fixed timeouts and polling cadences

// * Page navigation timeout in milliseconds
pub const NAVIGATION_TIMEOUT_MS: u64 = 40_000;

// * Element wait timeout in milliseconds (login fields, power widget)
pub const ELEMENT_WAIT_TIMEOUT_MS: u64 = 20_000;

// * Poll interval while waiting for an element to appear
pub const ELEMENT_POLL_INTERVAL_MS: u64 = 250;

// * Settle delay after a submitted login before inspecting the page
pub const POST_LOGIN_SETTLE_MS: u64 = 5_000;

// * Settle delay after the dashboard page reports loaded
pub const DASHBOARD_SETTLE_MS: u64 = 4_000;

// * Upper plausibility bound for production/consumption in watts
pub const MAX_PLAUSIBLE_POWER_W: f64 = 100_000.0;
