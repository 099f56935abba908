//! Seeded credentials and harness tuning knobs, kept in one place so a
//! change to the fixture data touches a single file.

// Seeded users. `fixtures` creates all three; only `admin` holds the
// admin role.

pub const TEST_USER: &str = "testuser";
pub const TEST_PASS: &str = "testpass123";

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASS: &str = "adminpass123";

/// Second non-admin, for cross-user isolation scenarios.
pub const OTHER_USER: &str = "otheruser";
pub const OTHER_PASS: &str = "otherpass123";

// Harness timing.

/// How long to poll before declaring the spawned server dead (ms).
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Per-request timeout on the test HTTP client (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Delay between readiness probes (ms).
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;
