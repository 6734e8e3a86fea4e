//! HTTP update endpoint backed by the ESP-IDF OTA partitions.
//!
//! The update server lays firmware out by identity:
//! `{server}/{firmware}/{hardware}/version` answers with the newest version
//! string, and `{server}/{firmware}/{hardware}/{version}/firmware.bin` is the
//! image itself. Images stream straight into the inactive OTA slot.

use anyhow::{anyhow, bail, Context, Result};
use embedded_svc::http::client::Client as HttpClient;
use embedded_svc::http::{Method, Status};
use esp_idf_svc::http::client::{Configuration as HttpClientConfiguration, EspHttpConnection};
use esp_idf_svc::io::Read;
use esp_idf_svc::ota::EspOta;
use sha2::{Digest, Sha256};

use sense_core::update::UpdateEndpoint;

const OTA_CHUNK_SIZE: usize = 4096;

pub struct HttpUpdateEndpoint {
    server: String,
}

impl HttpUpdateEndpoint {
    pub fn new(server: &str) -> Self {
        Self {
            server: server.trim_end_matches('/').to_string(),
        }
    }

    fn client(&self) -> Result<HttpClient<EspHttpConnection>> {
        let conf = HttpClientConfiguration {
            timeout: Some(std::time::Duration::from_secs(30)),
            ..Default::default()
        };
        Ok(HttpClient::wrap(EspHttpConnection::new(&conf)?))
    }
}

impl UpdateEndpoint for HttpUpdateEndpoint {
    fn latest_version(&mut self, firmware_id: &str, hardware_id: &str) -> Result<String> {
        if self.server.is_empty() {
            bail!("no update server configured");
        }
        let url = format!("{}/{firmware_id}/{hardware_id}/version", self.server);

        let mut client = self.client()?;
        let request = client.request(Method::Get, &url, &[])?;
        let mut response = request.submit().map_err(|e| anyhow!("{e:?}"))?;

        let status = response.status();
        if !(200..300).contains(&status) {
            bail!("version query failed with HTTP {status}");
        }

        let mut body = [0u8; 64];
        let mut len = 0;
        loop {
            let read = response.read(&mut body[len..]).map_err(|e| anyhow!("{e:?}"))?;
            if read == 0 {
                break;
            }
            len += read;
            if len == body.len() {
                break;
            }
        }
        let version = std::str::from_utf8(&body[..len])
            .context("version response is not UTF-8")?
            .trim()
            .to_string();
        Ok(version)
    }

    fn fetch_and_apply(
        &mut self,
        firmware_id: &str,
        hardware_id: &str,
        version: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/{firmware_id}/{hardware_id}/{version}/firmware.bin",
            self.server
        );
        log::info!("downloading firmware image from {url}");

        let mut client = self.client()?;
        let request = client.request(Method::Get, &url, &[])?;
        let mut response = request.submit().map_err(|e| anyhow!("{e:?}"))?;

        let status = response.status();
        if !(200..300).contains(&status) {
            bail!("firmware download failed with HTTP {status}");
        }

        let mut ota = EspOta::new().context("failed to acquire OTA")?;
        let mut update = ota
            .initiate_update()
            .context("failed to initiate OTA update")?;

        let mut hasher = Sha256::new();
        let mut total = 0usize;
        let mut chunk = [0u8; OTA_CHUNK_SIZE];
        loop {
            let read = match response.read(&mut chunk) {
                Ok(read) => read,
                Err(e) => {
                    update.abort().context("failed to abort OTA update")?;
                    return Err(anyhow!("firmware download interrupted: {e:?}"));
                }
            };
            if read == 0 {
                break;
            }
            if let Err(e) = update.write(&chunk[..read]) {
                update.abort().context("failed to abort OTA update")?;
                return Err(anyhow!("failed writing OTA data: {e:?}"));
            }
            hasher.update(&chunk[..read]);
            total += read;
        }

        if total == 0 {
            update.abort().context("failed to abort OTA update")?;
            bail!("firmware image is empty");
        }

        update
            .complete()
            .map_err(|e| anyhow!("failed finalizing OTA image: {e:?}"))?;

        let digest = hasher.finalize();
        log::info!(
            "staged firmware {version} ({total} bytes, sha256 {:02x}{:02x}..{:02x}{:02x})",
            digest[0],
            digest[1],
            digest[30],
            digest[31]
        );
        Ok(())
    }
}
