// Sync worker constants

use std::time::Duration;

/// Smallest periodic retry interval accepted; shorter values are raised to this
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(1);
