//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the behaviour of the room-monitoring node: the
//! event loop, the lighting model registration table and the rules that
//! turn LPN reports, button and motion edges into alerts and LCD output.
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping this layer fully testable without real peripherals.

pub mod events;
pub mod models;
pub mod ports;
pub mod rules;
pub mod service;
