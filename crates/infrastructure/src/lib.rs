//! 基础设施层实现。
//!
//! 提供对象存储、音频采集等适配器的本地实现，并负责把内存存储
//! 与各个会话服务装配成一套可运行的后端。

pub mod builder;
pub mod capture;
pub mod storage;

pub use builder::LocalBackend;
pub use capture::NullAudioCapture;
pub use storage::MemoryObjectStorage;
