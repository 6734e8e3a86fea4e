//! NVS-backed persistence for the device configuration.
//!
//! The whole configuration is stored as one JSON blob under a single key, so
//! schema changes never leave the store half-migrated.

use anyhow::{Context, Result};
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use sense_core::{ConfigStore, DeviceConfig};

const NAMESPACE: &str = "sense";
const KEY: &str = "config";
const MAX_BLOB_LEN: usize = 4096;

pub struct NvsConfigStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsConfigStore {
    pub fn new(partition: EspNvsPartition<NvsDefault>) -> Result<Self> {
        let nvs = EspNvs::new(partition, NAMESPACE, true)
            .context("failed to open NVS namespace")?;
        Ok(Self { nvs })
    }
}

impl ConfigStore for NvsConfigStore {
    fn load(&mut self) -> Result<Option<DeviceConfig>> {
        let mut buf = vec![0u8; MAX_BLOB_LEN];
        match self.nvs.get_blob(KEY, &mut buf)? {
            Some(data) => {
                let config = serde_json::from_slice(data)
                    .context("stored configuration is not valid JSON")?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    fn save(&mut self, config: &DeviceConfig) -> Result<()> {
        let data = serde_json::to_vec(config)?;
        self.nvs
            .set_blob(KEY, &data)
            .context("failed to write configuration blob")?;
        Ok(())
    }
}
