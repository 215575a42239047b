//! # Sync Engine
//!
//! 多路采集同步协调器。
//!
//! 负责：
//! - 按目标帧率统一节拍
//! - 向所有采集源广播取帧请求并在超时内收集结果
//! - 按注册顺序对齐输出 `Batch`
//! - 输出通道满时丢弃而不阻塞
//!
//! ## 使用示例
//!
//! ```ignore
//! use std::sync::Arc;
//! use sync_engine::{CaptureConfig, Coordinator};
//!
//! let config = CaptureConfig::new(["synthetic://left", "synthetic://right"], 10);
//! let mut coordinator = Coordinator::new(&config, backend, sink)?;
//! coordinator.start()?;
//!
//! while let Some(batch) = coordinator.next_batch() {
//!     // batch.frames[i] belongs to config.sources[i]
//! }
//! ```

mod coordinator;
mod error;
mod pacer;
mod stats;

pub use coordinator::{BatchReceiver, Coordinator};
pub use error::{Result, SyncError};
pub use pacer::{Pace, Pacer};
pub use stats::{CoordinatorStats, StatsSnapshot};

// Re-export contracts types
pub use contracts::{Batch, CaptureConfig, FrameRecord, OverflowPolicy};
