use anyhow::{anyhow, Result};
use chrono::FixedOffset;
use std::env;

/// Engine-level configuration.
///
/// Timestamps are stored in UTC everywhere; the reporting offset is applied
/// only when truncating to civil days and ISO weeks (and when deriving the
/// daily-log meal window). One fixed offset, no DST rules.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    reporting_offset: FixedOffset,
}

const DEFAULT_OFFSET_HOURS: i32 = 3;

impl EngineConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let hours: i32 = env::var("REPORTING_UTC_OFFSET_HOURS")
            .unwrap_or_else(|_| DEFAULT_OFFSET_HOURS.to_string())
            .parse()
            .unwrap_or(DEFAULT_OFFSET_HOURS);

        let offset = FixedOffset::east_opt(hours * 3600)
            .ok_or_else(|| anyhow!("REPORTING_UTC_OFFSET_HOURS out of range: {hours}"))?;

        Ok(Self {
            reporting_offset: offset,
        })
    }

    pub fn with_offset(offset: FixedOffset) -> Self {
        Self {
            reporting_offset: offset,
        }
    }

    /// Offset used for all civil-day and week truncation.
    pub fn reporting_offset(&self) -> FixedOffset {
        self.reporting_offset
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reporting_offset: FixedOffset::east_opt(DEFAULT_OFFSET_HOURS * 3600)
                .expect("default offset is in range"),
        }
    }
}
