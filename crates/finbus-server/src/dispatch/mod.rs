pub mod registry;

pub use registry::{Handler, HandlerRegistry};
