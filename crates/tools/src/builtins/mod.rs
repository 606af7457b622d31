//! Built-in tool implementations.

mod datetime_weather;
mod email;
mod fs;
mod goals;
mod memory_tool;
mod plan;
mod remind_me;
mod shell;
mod skill_transition;
mod web;

pub use datetime_weather::{DateTimeTool, WeatherTool};
pub use email::EmailTool;
pub use fs::{
    CreateDirectoryTool, DeleteTool, FileInfoTool, ListDirectoryTool, ReadFileTool, SendFileTool,
    WriteFileTool,
};
pub use goals::GoalManagementTool;
pub use memory_tool::MemoryTool;
pub use plan::{PlanFinalizeTool, PlanGetTool, PlanSetContentTool};
pub use remind_me::RemindMeTool;
pub use shell::RunShellTool;
pub use skill_transition::{SendVoiceTool, SetTierTool, SkillTransitionTool};
pub use web::{BrowserDriver, BrowserTool, WebSearchTool};
