//! 异步 GPU 回读
//!
//! 控制线程发起回读请求，拿到一个句柄，之后每帧轮询 done / has_error，完成后取数据。
//! 真正的 GPU 拷贝和 fence 查询都在渲染线程上进行。
//!
//! 两个后端：
//! - 内置后端 ([`builtin`])：平台自带的异步回读
//! - 自定义后端 ([`registry`])：staging + fence，平台不支持时使用
//!
//! 入口是 [`system::ReadbackSystem`]。

pub mod builtin;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handle;
pub mod queue;
pub mod registry;
pub mod render_thread;
pub mod request;
pub mod resource_cache;
pub mod safety;
pub mod software;
pub mod storage;
pub mod system;
pub mod updater;

pub use config::ReadbackConfig;
pub use dispatcher::AsyncReadback;
pub use error::{CopyFailure, ReadbackError};
pub use handle::{AllocatorKind, BackendKind, NativeResourceId, TaskHandle, TaskState};
pub use queue::RequestQueue;
pub use request::ReadbackRequest;
pub use resource_cache::{GpuResource, ResourceKind};
pub use storage::{ReadbackBuffer, ReadbackView};
pub use system::ReadbackSystem;
