//! Restart and reset-reason helpers. Every deliberate reboot funnels through
//! `restart` so the reason is always on the console before the chip goes
//! down.

use esp_idf_hal::delay::FreeRtos;
use sense_core::RestartReason;

pub fn restart(reason: RestartReason) -> ! {
    log::warn!("restarting: {}", reason.as_str());
    log::logger().flush();
    // Let the UART drain.
    FreeRtos::delay_ms(200);
    unsafe { esp_idf_sys::esp_restart() };
    unreachable!("esp_restart returned")
}

/// Reset reason of the current boot, for the startup log line.
pub fn reset_reason() -> &'static str {
    let reason = unsafe { esp_idf_sys::esp_reset_reason() };
    match reason {
        esp_idf_sys::esp_reset_reason_t_ESP_RST_POWERON => "power-on",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_EXT => "external pin",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_SW => "software reset",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_PANIC => "panic",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_INT_WDT => "interrupt watchdog",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_TASK_WDT => "task watchdog",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_WDT => "other watchdog",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_DEEPSLEEP => "deep sleep",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_BROWNOUT => "brownout",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_SDIO => "sdio",
        _ => "unknown",
    }
}
