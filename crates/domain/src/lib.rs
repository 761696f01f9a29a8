//! 实时消息核心领域模型
//!
//! 包含私聊消息、社区消息、好友请求、在线打字状态等核心实体，
//! 所有行数据在存储边界处被验证为显式类型，不做隐式信任。

pub mod entities;
pub mod errors;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use value_objects::*;
