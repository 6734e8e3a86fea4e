//! Network mode controller.
//!
//! Owns the station/access-point selection. Station connection attempts are
//! non-blocking: `connect_station` only initiates, `poll` observes link
//! state. There is no automatic fallback to AP mode on station failure -
//! entering config mode is always an explicit (button-driven) request, so a
//! device with bad credentials keeps retrying instead of silently dropping
//! off the network.

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    Disconnected,
    StationConnecting,
    StationConnected,
    AccessPointActive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIpConfig {
    pub ip: String,
    pub mask: String,
    pub gateway: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    pub ssid: String,
    pub password: String,
    /// DHCP when absent.
    pub static_ip: Option<StaticIpConfig>,
    /// Advertised as the DHCP hostname.
    pub hostname: String,
}

/// Radio operations the controller drives. Implementations must not block:
/// `start_station` initiates an attempt and `link_up` reports progress.
pub trait WifiDriver {
    fn start_station(&mut self, config: &StationConfig) -> Result<()>;
    fn stop_station(&mut self) -> Result<()>;
    fn link_up(&mut self) -> bool;
    fn start_access_point(&mut self) -> Result<()>;
    fn stop_access_point(&mut self) -> Result<()>;
}

pub struct NetworkController<D: WifiDriver> {
    driver: D,
    mode: NetworkMode,
}

impl<D: WifiDriver> NetworkController<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            mode: NetworkMode::Disconnected,
        }
    }

    /// Begin a station connection attempt. Failures are logged and absorbed;
    /// the caller's loop retries by observing `mode()`. Ignored while the
    /// access point is active.
    pub fn connect_station(&mut self, config: &StationConfig) {
        if self.mode == NetworkMode::AccessPointActive {
            log::warn!("station connect requested while AP active, ignoring");
            return;
        }
        match self.driver.start_station(config) {
            Ok(()) => {
                log::info!("connecting to station '{}'", config.ssid);
                self.mode = NetworkMode::StationConnecting;
            }
            Err(e) => {
                log::warn!("station connect failed to start: {e:#}");
                self.mode = NetworkMode::Disconnected;
            }
        }
    }

    /// Force the station link down.
    pub fn disconnect_station(&mut self) {
        if matches!(
            self.mode,
            NetworkMode::StationConnecting | NetworkMode::StationConnected
        ) {
            if let Err(e) = self.driver.stop_station() {
                log::warn!("station teardown failed: {e:#}");
            }
            self.mode = NetworkMode::Disconnected;
        }
    }

    /// Switch into AP/config mode. Any station attempt is torn down first;
    /// station mode and AP mode are mutually exclusive.
    pub fn enter_access_point(&mut self) {
        self.disconnect_station();
        match self.driver.start_access_point() {
            Ok(()) => {
                log::info!("access point up");
                self.mode = NetworkMode::AccessPointActive;
            }
            Err(e) => {
                log::error!("failed to start access point: {e:#}");
                self.mode = NetworkMode::Disconnected;
            }
        }
    }

    /// Tear down AP mode. The device stays Disconnected until the next
    /// `connect_station`.
    pub fn exit_access_point(&mut self) {
        if self.mode != NetworkMode::AccessPointActive {
            return;
        }
        if let Err(e) = self.driver.stop_access_point() {
            log::warn!("access point teardown failed: {e:#}");
        }
        self.mode = NetworkMode::Disconnected;
    }

    /// Advance the connection attempt and observe link loss.
    pub fn poll(&mut self) {
        match self.mode {
            NetworkMode::StationConnecting => {
                if self.driver.link_up() {
                    log::info!("station link up");
                    self.mode = NetworkMode::StationConnected;
                }
            }
            NetworkMode::StationConnected => {
                if !self.driver.link_up() {
                    log::warn!("station link lost");
                    self.mode = NetworkMode::Disconnected;
                }
            }
            NetworkMode::Disconnected | NetworkMode::AccessPointActive => {}
        }
    }

    pub fn connected(&self) -> bool {
        self.mode == NetworkMode::StationConnected
    }

    pub fn ap_mode_enabled(&self) -> bool {
        self.mode == NetworkMode::AccessPointActive
    }

    pub fn mode(&self) -> NetworkMode {
        self.mode
    }
}
