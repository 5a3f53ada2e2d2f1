//! # IOD Core
//!
//! 记录组装引擎的核心模块，提供错误定义、编码概念模型和通用工具。

pub mod error;
pub mod models;
pub mod utils;

pub use error::{IodError, Result};
pub use models::*;
