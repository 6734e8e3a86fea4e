//! ESP-IDF WiFi driver behind the core's radio boundary.
//!
//! Everything here is non-blocking: station connects are initiated and the
//! runtime observes progress through `link_up` on its own cadence.

pub mod portal;

use std::net::Ipv4Addr;

use anyhow::{anyhow, Context, Result};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::ipv4::{
    ClientConfiguration as IpClientConfiguration, ClientSettings as IpClientSettings,
    Configuration as IpConfiguration, DHCPClientSettings, Mask, Subnet,
};
use esp_idf_svc::netif::{EspNetif, NetifConfiguration};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};

use sense_core::net::{StationConfig, WifiDriver};

pub struct EspWifiDriver {
    wifi: EspWifi<'static>,
    ap_ssid: String,
    netif_applied: bool,
}

impl EspWifiDriver {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        device_name: &str,
    ) -> Result<Self> {
        let wifi = EspWifi::new(modem, sys_loop, Some(nvs))?;
        Ok(Self {
            wifi,
            ap_ssid: format!("{device_name}-setup"),
            netif_applied: false,
        })
    }
}

/// Custom station netif when the configuration asks for a fixed address or a
/// DHCP hostname; `None` keeps the default DHCP netif.
fn station_netif(config: &StationConfig) -> Result<Option<NetifConfiguration>> {
    let mut conf = NetifConfiguration::wifi_default_client();
    match &config.static_ip {
        Some(fixed) => {
            let ip: Ipv4Addr = fixed.ip.parse().context("invalid static IP")?;
            let gateway: Ipv4Addr = fixed.gateway.parse().context("invalid gateway")?;
            let mask_ip: Ipv4Addr = fixed.mask.parse().context("invalid netmask")?;
            let mask =
                Mask::try_from(mask_ip).map_err(|_| anyhow!("invalid netmask: {mask_ip}"))?;
            conf.key = "WIFI_STA_FIXED"
                .try_into()
                .map_err(|_| anyhow!("netif key too long"))?;
            conf.ip_configuration = Some(IpConfiguration::Client(IpClientConfiguration::Fixed(
                IpClientSettings {
                    ip,
                    subnet: Subnet { gateway, mask },
                    dns: None,
                    secondary_dns: None,
                },
            )));
        }
        None => {
            if config.hostname.is_empty() {
                return Ok(None);
            }
            conf.key = "WIFI_STA_NAMED"
                .try_into()
                .map_err(|_| anyhow!("netif key too long"))?;
            let hostname = config
                .hostname
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("hostname too long"))?;
            conf.ip_configuration = Some(IpConfiguration::Client(IpClientConfiguration::DHCP(
                DHCPClientSettings {
                    hostname: Some(hostname),
                },
            )));
        }
    }
    Ok(Some(conf))
}

impl WifiDriver for EspWifiDriver {
    fn start_station(&mut self, config: &StationConfig) -> Result<()> {
        if !self.netif_applied {
            if let Some(conf) = station_netif(config)? {
                let netif = EspNetif::new_with_conf(&conf)
                    .context("failed to create station netif")?;
                self.wifi
                    .swap_netif_sta(netif)
                    .context("failed to apply station netif")?;
            }
            self.netif_applied = true;
        }

        let auth_method = if config.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };
        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: config
                    .ssid
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("SSID too long"))?,
                password: config
                    .password
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("password too long"))?,
                auth_method,
                ..Default::default()
            }))?;

        self.wifi.start()?;
        self.wifi.connect()?;
        Ok(())
    }

    fn stop_station(&mut self) -> Result<()> {
        // Disconnect fails when there is no link; that is fine here.
        let _ = self.wifi.disconnect();
        self.wifi.stop()?;
        Ok(())
    }

    fn link_up(&mut self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn start_access_point(&mut self) -> Result<()> {
        self.wifi
            .set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
                ssid: self
                    .ap_ssid
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("AP SSID too long"))?,
                auth_method: AuthMethod::None,
                channel: 1,
                ..Default::default()
            }))?;
        self.wifi.start()?;
        log::info!("open access point '{}' up", self.ap_ssid);
        Ok(())
    }

    fn stop_access_point(&mut self) -> Result<()> {
        self.wifi.stop()?;
        Ok(())
    }
}
