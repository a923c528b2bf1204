mod container;

pub use container::{ContainerBuilder, FunctionSpec};
