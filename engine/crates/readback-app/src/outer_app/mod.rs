use readback_core::ReadbackSystem;
use readback_core::software::SoftwareGpu;

pub mod capture_app;
pub mod compute_buffer_app;

/// 外部应用接口 trait
///
/// 定义应用生命周期的关键钩子函数。所有 demo 需实现此 trait。
pub trait OuterApp {
    /// 创建资源
    fn init(&mut self, gpu: &SoftwareGpu, system: &mut ReadbackSystem) -> anyhow::Result<()>;

    /// 每帧更新逻辑，发生在回读系统 update 之后、渲染线程执行本帧命令之前
    fn update(&mut self, _system: &mut ReadbackSystem) {}

    /// 退出前释放资源（可选）
    fn destroy(&mut self) {}
}
