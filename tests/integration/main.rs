//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! end to end: the real `AppService` driven against `MockHardware`, with
//! virtual time advanced only when the node sleeps.  All tests run on the
//! host (x86_64) with no mesh stack or radio required.

#![cfg(not(target_os = "espidf"))]

mod acquisition_tests;
mod lc_tests;
mod lifecycle_tests;
mod lighting_tests;
mod mock_hw;
mod rules_tests;
mod store_tests;
