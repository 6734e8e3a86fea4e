//! OTA update controller.
//!
//! Periodically asks the update server for the newest version matching this
//! firmware/hardware identity. A strictly newer version triggers a full
//! download-and-replace; equal, older or unreachable is a silent no-op
//! retried on the next interval. Never polled while in AP/config mode - the
//! radio belongs to provisioning there.

use anyhow::Result;

use crate::version::FirmwareVersion;

/// Check for updates once an hour.
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 3_600_000;

/// Remote update endpoint, queried by firmware + hardware identity.
pub trait UpdateEndpoint {
    /// Newest available version string for this identity.
    fn latest_version(&mut self, firmware_id: &str, hardware_id: &str) -> Result<String>;
    /// Download and stage the given version; the caller restarts afterwards.
    fn fetch_and_apply(&mut self, firmware_id: &str, hardware_id: &str, version: &str)
        -> Result<()>;
}

pub struct UpdateController<E: UpdateEndpoint> {
    endpoint: E,
    firmware_id: String,
    hardware_id: String,
    current: FirmwareVersion,
    check_interval_ms: u64,
    last_check_ms: Option<u64>,
}

impl<E: UpdateEndpoint> UpdateController<E> {
    pub fn new(
        endpoint: E,
        firmware_id: &str,
        hardware_id: &str,
        current_version: &str,
    ) -> Result<Self> {
        let current = FirmwareVersion::parse(current_version)
            .ok_or_else(|| anyhow::anyhow!("invalid running version '{current_version}'"))?;
        Ok(Self {
            endpoint,
            firmware_id: firmware_id.to_string(),
            hardware_id: hardware_id.to_string(),
            current,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            last_check_ms: None,
        })
    }

    pub fn with_check_interval(mut self, interval_ms: u64) -> Self {
        self.check_interval_ms = interval_ms;
        self
    }

    pub fn current_version(&self) -> FirmwareVersion {
        self.current
    }

    /// Service the update timer. Returns true when a new image has been
    /// applied and the device should restart. The first check is deferred a
    /// full interval after boot so a freshly provisioned node is not
    /// replaced mid-setup.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.last_check_ms {
            None => {
                self.last_check_ms = Some(now_ms);
                return false;
            }
            Some(last) if now_ms.saturating_sub(last) < self.check_interval_ms => return false,
            Some(_) => {}
        }
        self.last_check_ms = Some(now_ms);

        let reported = match self
            .endpoint
            .latest_version(&self.firmware_id, &self.hardware_id)
        {
            Ok(version) => version,
            Err(e) => {
                log::debug!("update check failed: {e:#}");
                return false;
            }
        };

        let latest = match FirmwareVersion::parse(&reported) {
            Some(version) => version,
            None => {
                log::warn!("update server reported unparseable version '{reported}'");
                return false;
            }
        };

        if latest <= self.current {
            log::debug!("firmware {} is current (server has {latest})", self.current);
            return false;
        }

        log::info!("firmware update available: {} -> {latest}", self.current);
        match self
            .endpoint
            .fetch_and_apply(&self.firmware_id, &self.hardware_id, &reported)
        {
            Ok(()) => {
                self.current = latest;
                true
            }
            Err(e) => {
                log::warn!("firmware update failed, will retry: {e:#}");
                false
            }
        }
    }
}
