pub mod logger;
pub mod tools;

pub use tools::{check_command_in_path, locate_tool, ExternalTool};
