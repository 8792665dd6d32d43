//! Tool system for function calling.

pub mod arguments;
pub mod builtin;
pub mod calculator;
pub mod invoker;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use builtin::BuiltinEndpoints;
pub use invoker::ToolInvoker;
pub use registry::ToolRegistry;
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::{AgentToolParameters, SideEffect};
