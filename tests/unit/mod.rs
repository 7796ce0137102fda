//! Crate-level test entry point, registered as an explicit test target.

mod conservation_tests;
mod lifecycle_tests;
