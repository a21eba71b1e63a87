//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for the node.
//!
//! - Config validation: all fields are range-checked before persistence.
//! - PS records live in their own namespace, one blob per 16-bit key, so a
//!   factory reset can erase them without touching the node config.
//! - Atomic writes: ESP-IDF NVS commits are atomic per nvs_commit().

use crate::app::ports::{ConfigError, ConfigPort, StoragePort};
use crate::config::NodeConfig;
use crate::error::StorageError;
use crate::mesh::dispatcher::MAX_HANDLERS;
use crate::store::PsKey;
use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "roomnode";
const CONFIG_KEY: &str = "nodecfg";
const PS_NAMESPACE: &str = "ps";

#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 512;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: HashMap<String, Vec<u8>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// Returns `Err(ConfigError::IoError)` if flash initialisation fails
    /// unrecoverably. On first boot or after a version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: HashMap::new(),
        })
    }

    /// NVS key names are limited to 15 characters; `k4004` style fits.
    fn ps_key_name(key: PsKey) -> String {
        format!("k{:04x}", key.0)
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns_buf = Self::c_name(namespace);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    /// NUL-terminated copy of a namespace or key name.
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let bytes = name.as_bytes();
        let len = bytes.len().min(15);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Read a whole blob.  `Ok(None)` when the key does not exist.
    #[cfg(target_os = "espidf")]
    fn read_blob(namespace: &str, key: &str) -> Result<Option<Vec<u8>>, i32> {
        let key_buf = Self::c_name(key);
        let result = Self::with_nvs_handle(namespace, false, |handle| {
            let mut size: usize = 0;

            // First call: get size
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    core::ptr::null_mut(),
                    &mut size,
                )
            };
            if ret != ESP_OK || size > MAX_BLOB_SIZE {
                return Err(ret);
            }

            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(buf)
        });
        match result {
            Ok(buf) => Ok(Some(buf)),
            // A namespace that was never written cannot be opened read-only.
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[cfg(target_os = "espidf")]
    fn write_blob(namespace: &str, key: &str, data: &[u8]) -> Result<(), i32> {
        let key_buf = Self::c_name(key);
        Self::with_nvs_handle(namespace, true, |handle| {
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    data.as_ptr() as *const _,
                    data.len(),
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
    }
}

/// Range-check every tunable.  Invalid values are rejected, not clamped.
pub fn validate_config(cfg: &NodeConfig) -> Result<(), ConfigError> {
    let unicast = 0x0001..=0x7FFF;
    if !unicast.contains(&cfg.authority_client_addr) {
        return Err(ConfigError::ValidationFailed(
            "authority_client_addr must be a unicast address",
        ));
    }
    if !unicast.contains(&cfg.stream_client_addr) {
        return Err(ConfigError::ValidationFailed(
            "stream_client_addr must be a unicast address",
        ));
    }
    if cfg.authority_client_addr == cfg.stream_client_addr {
        return Err(ConfigError::ValidationFailed(
            "authority and stream clients must differ",
        ));
    }
    if !(-4000..=12500).contains(&cfg.high_temp_centi_c) {
        return Err(ConfigError::ValidationFailed(
            "high_temp_centi_c must be -4000–12500",
        ));
    }
    if cfg.fall_threshold <= 0 {
        return Err(ConfigError::ValidationFailed("fall_threshold must be positive"));
    }
    if !(1..=10_000).contains(&cfg.restart_delay_ms) {
        return Err(ConfigError::ValidationFailed(
            "restart_delay_ms must be 1–10000",
        ));
    }
    if !(50..=5000).contains(&cfg.provisioning_blink_ms) {
        return Err(ConfigError::ValidationFailed(
            "provisioning_blink_ms must be 50–5000",
        ));
    }
    if !(100..=60_000).contains(&cfg.save_debounce_ms) {
        return Err(ConfigError::ValidationFailed(
            "save_debounce_ms must be 100–60000",
        ));
    }
    if !(1..=1000).contains(&cfg.conversion_wait_ms) {
        return Err(ConfigError::ValidationFailed(
            "conversion_wait_ms must be 1–1000",
        ));
    }
    if cfg.rail_settle_ms > 1000 {
        return Err(ConfigError::ValidationFailed("rail_settle_ms must be 0–1000"));
    }
    if !(100..=3_600_000).contains(&cfg.acquisition_period_ms) {
        return Err(ConfigError::ValidationFailed(
            "acquisition_period_ms must be 100–3600000",
        ));
    }
    if cfg.acquisition_period_ms <= cfg.conversion_wait_ms + cfg.rail_settle_ms {
        return Err(ConfigError::ValidationFailed(
            "acquisition_period_ms must exceed one conversion cycle",
        ));
    }
    if !(10..=100).contains(&cfg.lc_regulator_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "lc_regulator_interval_ms must be 10–100",
        ));
    }
    if cfg.max_models == 0 || usize::from(cfg.max_models) > MAX_HANDLERS {
        return Err(ConfigError::ValidationFailed(
            "max_models must fit the dispatcher table",
        ));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load_config(&self) -> Result<NodeConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        let stored = self
            .store
            .get(&Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY))
            .cloned();

        #[cfg(target_os = "espidf")]
        let stored = match Self::read_blob(CONFIG_NAMESPACE, CONFIG_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("NvsAdapter: NVS read error {}, using defaults", e);
                None
            }
        };

        match stored {
            Some(bytes) => {
                let cfg: NodeConfig =
                    postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            None => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(NodeConfig::default())
            }
        }
    }

    fn save_config(&mut self, config: &NodeConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        self.store
            .insert(Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY), bytes.clone());

        #[cfg(target_os = "espidf")]
        Self::write_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes).map_err(|e| {
            warn!("NvsAdapter: NVS write error {}", e);
            ConfigError::IoError
        })?;

        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn load(&self, key: PsKey, buf: &mut [u8]) -> Result<usize, StorageError> {
        let name = Self::ps_key_name(key);

        #[cfg(not(target_os = "espidf"))]
        let stored = self
            .store
            .get(&Self::composite_key(PS_NAMESPACE, &name))
            .cloned();

        #[cfg(target_os = "espidf")]
        let stored = Self::read_blob(PS_NAMESPACE, &name).map_err(|e| {
            warn!("NvsAdapter: PS read {} failed: {}", key, e);
            StorageError::IoError
        })?;

        let data = stored.ok_or(StorageError::NotFound)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(data.len())
    }

    fn save(&mut self, key: PsKey, data: &[u8]) -> Result<(), StorageError> {
        let name = Self::ps_key_name(key);

        #[cfg(not(target_os = "espidf"))]
        self.store
            .insert(Self::composite_key(PS_NAMESPACE, &name), data.to_vec());

        #[cfg(target_os = "espidf")]
        Self::write_blob(PS_NAMESPACE, &name, data).map_err(|e| {
            warn!("NvsAdapter: PS write {} failed: {}", key, e);
            if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                StorageError::Full
            } else {
                StorageError::IoError
            }
        })?;

        Ok(())
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let prefix = format!("{}::", PS_NAMESPACE);
            self.store.retain(|k, _| !k.starts_with(&prefix));
        }

        #[cfg(target_os = "espidf")]
        Self::with_nvs_handle(PS_NAMESPACE, true, |handle| {
            let ret = unsafe { nvs_erase_all(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
        .map_err(|_| StorageError::IoError)?;

        info!("NvsAdapter: PS records erased");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        assert!(validate_config(&NodeConfig::default()).is_ok());
    }

    #[test]
    fn rejects_same_client_addresses() {
        let cfg = NodeConfig {
            stream_client_addr: 3,
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn rejects_group_address_for_client() {
        let cfg = NodeConfig {
            authority_client_addr: 0xC000,
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn rejects_short_acquisition_period() {
        let cfg = NodeConfig {
            acquisition_period_ms: 100,
            conversion_wait_ms: 80,
            rail_settle_ms: 30,
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn config_round_trip() {
        let mut nvs = NvsAdapter::new().unwrap();
        assert_eq!(nvs.load_config().unwrap(), NodeConfig::default());

        let cfg = NodeConfig {
            high_temp_centi_c: 3050,
            lighting_enabled: false,
            ..Default::default()
        };
        nvs.save_config(&cfg).unwrap();
        assert_eq!(nvs.load_config().unwrap(), cfg);
    }

    #[test]
    fn invalid_config_is_not_persisted() {
        let mut nvs = NvsAdapter::new().unwrap();
        let cfg = NodeConfig {
            save_debounce_ms: 0,
            ..Default::default()
        };
        assert!(nvs.save_config(&cfg).is_err());
        assert_eq!(nvs.load_config().unwrap(), NodeConfig::default());
    }

    #[test]
    fn ps_load_reports_stored_length() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.save(PsKey::LIGHTBULB_STATE, &[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(nvs.load(PsKey::LIGHTBULB_STATE, &mut buf), Ok(4));
        assert_eq!(buf, [1, 2]);
    }

    #[test]
    fn ps_load_missing_key() {
        let nvs = NvsAdapter::new().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(nvs.load(PsKey::AUTHORIZED, &mut buf), Err(StorageError::NotFound));
    }

    #[test]
    fn erase_all_keeps_config() {
        let mut nvs = NvsAdapter::new().unwrap();
        let cfg = NodeConfig {
            fall_threshold: 3100,
            ..Default::default()
        };
        nvs.save_config(&cfg).unwrap();
        nvs.save(PsKey::BUTTON_COUNT, &[7]).unwrap();
        nvs.save(PsKey::MAX_TEMPERATURE, &[0x10, 0x0E]).unwrap();

        nvs.erase_all().unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(nvs.load(PsKey::BUTTON_COUNT, &mut buf), Err(StorageError::NotFound));
        assert_eq!(nvs.load(PsKey::MAX_TEMPERATURE, &mut buf), Err(StorageError::NotFound));
        assert_eq!(nvs.load_config().unwrap(), cfg);
    }
}
