//! Readback 工具集
//!
//! 提供日志初始化、输出路径管理等通用工具。
//!
//! # ReadbackPath
//! 基于工作区根目录的统一路径管理，demo 输出的截图都放在 `target/` 下面。

pub mod init_log;
pub mod resource;
