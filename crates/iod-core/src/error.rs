//! 错误定义模块

use thiserror::Error;

/// 记录组装统一错误类型
#[derive(Error, Debug)]
pub enum IodError {
    #[error("未知属性: {0}")]
    UnknownAttribute(String),

    #[error("属性 {attribute} 不属于记录类型 {variant}")]
    AttributeNotInRecord { attribute: String, variant: String },

    #[error("空间数据冲突: {0}")]
    ConflictingSpatialData(String),

    #[error("空间坐标无效: {0}")]
    InvalidSpatialData(String),

    #[error("引用文档解析失败: {0}")]
    ReferenceResolution(String),

    #[error("不支持的像素格式: {0}")]
    UnsupportedPixelFormat(String),

    #[error("属性值无效: {attribute}: {reason}")]
    InvalidValue { attribute: String, reason: String },

    #[error("参数无效: {0}")]
    InvalidArgument(String),

    #[error("写入错误: {0}")]
    Write(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IodError {
    /// 是否为可在本地记录后忽略的错误
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IodError::UnknownAttribute(_) | IodError::AttributeNotInRecord { .. }
        )
    }
}

/// 记录组装统一结果类型
pub type Result<T> = std::result::Result<T, IodError>;
