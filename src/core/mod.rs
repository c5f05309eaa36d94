// 核心数据结构和类型定义

pub mod clock;
pub mod error;
pub mod queue;
pub mod types;

// 重新导出常用类型
pub use clock::PlaybackClock;
pub use error::{PlayerError, Result};
pub use queue::{BoundedQueue, StreamUnit};
pub use types::*;
