pub mod echo;
pub mod executor;
pub mod registry;
pub mod schema;

pub use echo::EchoTool;
pub use executor::{ToolExecutor, ToolOutcome};
pub use registry::{Tool, ToolRegistry};
pub use schema::{parameters_schema_for, parse_args};
