//! Test factories shared by the unit tests.

pub mod factories;

pub use factories::{ContainerBuilder, FunctionSpec};
