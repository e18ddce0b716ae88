//! Application-level configuration constants.

// Worker and assets
pub const WORKER_SCRIPT: &str = "worker.js";
pub const TIMETABLE_URL: &str = "/timetable.bin.gz";
pub const STOPS_URL: &str = "/stops.bin.gz";

// Caches
pub const QUERY_CACHE_CAPACITY: usize = 32;

// UI Behavior
pub const DEBOUNCE_MS: u32 = 300;
pub const STOP_SEARCH_MAX_RESULTS: usize = 5;

// Engine query bounds
pub const ARRIVALS_MAX_TRANSFERS: u8 = 5;
pub const MAX_ISOCHRONE_DURATION_SECS: u32 = 8 * 60 * 60;

// Default values for input fields
pub const DEFAULT_ORIGIN: &str = "Parent8504100";
pub const DEFAULT_DESTINATION: &str = "8504880";
pub const DEFAULT_DEPARTURE_SECS: u32 = 8 * 3600 + 30 * 60;
pub const DEFAULT_MAX_TRANSFERS: u8 = 5;

// Min/Max limits for input fields
pub const MIN_TRANSFERS: u8 = 0;
pub const MAX_TRANSFERS: u8 = 8;
