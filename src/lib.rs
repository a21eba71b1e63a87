//! RoomNode firmware library.
//!
//! Event-driven control core of a Bluetooth-mesh Friend/Subscriber node:
//! soft timers, sleep governor, persistent store, sensor acquisition,
//! mesh lifecycle and model dispatch, the lighting engine, the Light
//! Controller and the room-monitoring rules.  Exposed as a library for
//! integration testing and the host simulator.  All ESP-IDF-specific
//! code is guarded by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;
pub mod lc;
pub mod lighting;
pub mod mesh;
pub mod pins;
pub mod power;
pub mod sensors;
pub mod store;
pub mod timer;

pub mod adapters;
pub mod drivers;
