//! 应用层错误定义
//!
//! 存储和上传调用的错误在操作边界处被捕获并转换为这些类型，
//! 供界面层转成可关闭的临时提示；它们不会让订阅循环崩溃。

use domain::errors::DomainError;
use thiserror::Error;

/// 应用层错误类型
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 领域层错误（输入验证等，发生在任何网络调用之前）
    #[error("领域错误: {0}")]
    Domain(#[from] DomainError),

    /// 会话存储错误（读写或订阅失败）
    #[error("存储错误: {0}")]
    Store(String),

    /// 对象存储/上传错误
    #[error("上传错误: {0}")]
    Storage(String),

    /// 录音/麦克风错误（与上传错误分开呈现）
    #[error("录音错误: {0}")]
    Recording(String),

    /// 验证错误
    #[error("验证失败: {0}")]
    Validation(String),

    /// 权限不足（未登录或非成员）
    #[error("权限不足: {0}")]
    Unauthorized(String),

    /// 资源未找到
    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 会话视图已关闭，操作被丢弃
    #[error("会话已关闭")]
    SessionClosed,
}

impl ApplicationError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn recording(message: impl Into<String>) -> Self {
        Self::Recording(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

/// 应用层结果类型
pub type ApplicationResult<T> = Result<T, ApplicationError>;
