//! RTSP snapshot service / RTSP快照服务
//!
//! Grabs a single frame from a stream, stores it as JPEG in object storage and
//! hands out time-limited links to stored snapshots.
//! 从视频流抓取单帧，以JPEG写入对象存储，并提供有时效的访问链接。

pub mod capture;
pub mod config;
pub mod ffmpeg;
pub mod handlers;
pub mod server;
pub mod storage;

#[cfg(test)]
mod server_test;

pub use capture::{CaptureError, CaptureOptions, CapturedImage, Frame, SnapshotCapturer};
pub use config::{SnapshotArgs, SnapshotConfig};
pub use server::{create_snapshot_router, SnapshotServer, SnapshotState};
pub use storage::{ObjectSnapshotStore, SnapshotStore, StorageError};
