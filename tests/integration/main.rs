//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against in-memory ports or the scripted mock port. Everything runs on one
//! thread under a `LocalRuntime`.

mod callable_tests;
mod lifecycle_tests;
mod mock_port;
mod scenario_tests;
