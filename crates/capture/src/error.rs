//! Capture 错误类型

use std::time::Duration;

use contracts::SourceId;
use thiserror::Error;

/// Capture 错误
#[derive(Debug, Error)]
pub enum CaptureError {
    /// 在超时时间内未收到采集结果
    #[error("source {source_id} produced no result within {}ms", waited.as_millis())]
    Timeout {
        /// 数据源 ID
        source_id: SourceId,
        /// 实际等待时长
        waited: Duration,
    },

    /// 采集线程已退出
    #[error("capture thread for source {source_id} is gone")]
    Disconnected {
        /// 数据源 ID
        source_id: SourceId,
    },

    /// 未先调用 request_frame 就读取结果
    #[error("no outstanding request for source {source_id}")]
    NoPendingRequest {
        /// 数据源 ID
        source_id: SourceId,
    },

    /// 采集线程启动失败
    #[error("failed to spawn capture thread for source {source_id}: {source}")]
    Spawn {
        /// 数据源 ID
        source_id: SourceId,
        #[source]
        source: std::io::Error,
    },
}

impl CaptureError {
    pub fn source_id(&self) -> &SourceId {
        match self {
            Self::Timeout { source_id, .. }
            | Self::Disconnected { source_id }
            | Self::NoPendingRequest { source_id }
            | Self::Spawn { source_id, .. } => source_id,
        }
    }
}

/// Capture Result 类型别名
pub type Result<T> = std::result::Result<T, CaptureError>;
