//! 应用层 - 命令（写操作）
//!
//! CQRS 命令侧：合成与目录重载

mod synthesize_commands;
mod voice_commands;

pub mod handlers;

pub use synthesize_commands::*;
pub use voice_commands::*;
