//! @ai:module:intent External analysis tools: description, execution, availability
//! @ai:module:layer application
//! @ai:module:public_api ToolSpec, ToolRunner, ToolInvocation, InvocationOutcome, ToolchainValidator

pub mod invocation;
pub mod runner;
pub mod spec;
pub mod toolchain;

pub use invocation::{InvocationOutcome, ToolInvocation};
pub use runner::{artifact_id, ToolRunner};
pub use spec::{InvocationContext, ToolSpec};
pub use toolchain::{MissingTool, ToolchainStatus, ToolchainValidator};
