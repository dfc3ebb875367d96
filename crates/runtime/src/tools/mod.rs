//! Tool aggregation: the shared registry and its invocation capability.

pub mod errors;
mod registry;

pub use errors::ToolError;
pub use registry::{ToolDescriptor, ToolInvoker, ToolRegistry, ToolSnapshot};
