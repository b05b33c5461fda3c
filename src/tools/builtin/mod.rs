pub mod command;
pub mod files;

pub use command::CommandTool;
pub use files::{ListFilesTool, ReadFileTool};
