// apps/hc_cli/src/commands/mod.rs

//! 子命令实现

pub mod info;
pub mod map;
pub mod run;
pub mod validate;
