//! Peripheral drivers: the Si7021 sensor bus and the GPIO interrupt service.

pub mod gpio_irq;
pub mod si7021;
