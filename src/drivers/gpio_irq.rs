//! GPIO interrupt service for PB0 and the PIR motion sensor.
//!
//! ISR bodies only deposit an external signal; the event loop reads the
//! pin level and runs the rule engine.  Edge polarity is reconfigured at
//! runtime through [`configure_edge`] (motion follows the authorization
//! mode).

use crate::app::ports::Edge;
use crate::events::{ExternalSignal, SignalQueue};
#[cfg(target_os = "espidf")]
use crate::events::SIGNALS;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;

/// Errors while installing the GPIO ISR service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioIrqError {
    ConfigFailed(i32),
    IsrInstallFailed(i32),
    HandlerAddFailed(i32),
}

impl core::fmt::Display for GpioIrqError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::HandlerAddFailed(rc) => write!(f, "GPIO ISR handler add failed (rc={})", rc),
        }
    }
}

// ── ISR bodies ────────────────────────────────────────────────

/// PB0 changed level.
pub fn button_isr(signals: &SignalQueue) {
    signals.deposit(ExternalSignal::ButtonEdge);
}

/// PIR fired.
pub fn motion_isr(signals: &SignalQueue) {
    signals.deposit(ExternalSignal::MotionEdge);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn button_gpio_isr(_arg: *mut core::ffi::c_void) {
    button_isr(&SIGNALS);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn motion_gpio_isr(_arg: *mut core::ffi::c_void) {
    motion_isr(&SIGNALS);
}

// ── Installation ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn intr_type(edge: Edge) -> gpio_int_type_t {
    match edge {
        Edge::Rising => gpio_int_type_t_GPIO_INTR_POSEDGE,
        Edge::Falling => gpio_int_type_t_GPIO_INTR_NEGEDGE,
        Edge::Both => gpio_int_type_t_GPIO_INTR_ANYEDGE,
    }
}

/// Configure PB0, PB1 and the PIR input and attach the edge handlers.
/// Interrupts stay disabled until [`configure_edge`] enables them.
#[cfg(target_os = "espidf")]
pub fn install() -> Result<(), GpioIrqError> {
    for pin in [pins::PB0_GPIO, pins::PB1_GPIO, pins::MOTION_GPIO] {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        // SAFETY: called once from main before the event loop starts.
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(GpioIrqError::ConfigFailed(ret));
        }
    }

    // SAFETY: one-time ISR service install from the main task.
    let ret = unsafe { gpio_install_isr_service(0) };
    if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
        return Err(GpioIrqError::IsrInstallFailed(ret));
    }

    let handlers: [(i32, unsafe extern "C" fn(*mut core::ffi::c_void)); 2] = [
        (pins::PB0_GPIO, button_gpio_isr),
        (pins::MOTION_GPIO, motion_gpio_isr),
    ];
    for (pin, handler) in handlers {
        // SAFETY: the handlers only perform a lock-free queue deposit.
        let ret = unsafe { gpio_isr_handler_add(pin, Some(handler), core::ptr::null_mut()) };
        if ret != ESP_OK as i32 {
            return Err(GpioIrqError::HandlerAddFailed(ret));
        }
    }
    info!("gpio_irq: PB0 and PIR handlers attached");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn install() -> Result<(), GpioIrqError> {
    log::info!("gpio_irq(sim): ISR install skipped");
    Ok(())
}

/// Select the interrupt edge of an input and enable it.
#[cfg(target_os = "espidf")]
pub fn configure_edge(gpio: i32, edge: Edge) {
    // SAFETY: register writes on a configured input, main loop only.
    unsafe {
        gpio_set_intr_type(gpio, intr_type(edge));
        gpio_intr_enable(gpio);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn configure_edge(_gpio: i32, _edge: Edge) {}

/// Logic level of an input.
#[cfg(target_os = "espidf")]
pub fn read(gpio: i32) -> bool {
    // SAFETY: read-only register access on a configured input.
    (unsafe { gpio_get_level(gpio) }) != 0
}

#[cfg(not(target_os = "espidf"))]
pub fn read(_gpio: i32) -> bool {
    true
}
