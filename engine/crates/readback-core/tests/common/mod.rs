#![allow(dead_code)]

use crossbeam_channel::Sender;
use readback_core::software::SoftwareGpu;
use readback_core::{BackendKind, ReadbackConfig, ReadbackRequest, ReadbackSystem};

pub const EXPECTED: [i32; 6] = [1, 2, 3, 4, 5, 42];

/// 轮询等待时最多推进的帧数
pub const MAX_FRAMES: usize = 16;

pub fn init_test_log() {
    readback_crate_tools::init_log::init_log(log::LevelFilter::Debug);
}

/// 按帧驱动回读系统
///
/// 每一帧分三段：控制线程 update -> 消费者逻辑（测试代码） -> 渲染线程执行本帧的命令。
/// 消费者阶段渲染线程被一个闸门挡住，所以测试看到的状态是确定的。
pub struct FrameHarness {
    pub gpu: SoftwareGpu,
    pub system: ReadbackSystem,
    gate: Option<Sender<()>>,
}
impl FrameHarness {
    pub fn new(backend: BackendKind) -> Self {
        Self::with_gpu(SoftwareGpu::new(), backend, ReadbackConfig::default())
    }

    pub fn with_gpu(gpu: SoftwareGpu, backend: BackendKind, mut config: ReadbackConfig) -> Self {
        init_test_log();
        config.force_custom_backend = backend == BackendKind::Custom;
        let system = ReadbackSystem::init(config, gpu.copy_engine(), Some(gpu.platform())).expect("init readback system");
        assert_eq!(system.readback().backend_kind(), backend);

        let mut harness = Self {
            gpu,
            system,
            gate: None,
        };
        harness.begin_frame();
        harness
    }

    fn begin_frame(&mut self) {
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        self.system
            .submit_render(move |_| {
                // 发送端被 drop 时返回
                let _ = gate_rx.recv();
            })
            .expect("submit gate");
        self.system.update();
        self.gate = Some(gate_tx);
    }

    /// 提前放行渲染线程（阻塞等待之前必须调用）
    pub fn release_render(&mut self) {
        self.gate.take();
    }

    /// 结束当前帧并开始下一帧，返回时处于下一帧的消费者阶段
    pub fn next_frame(&mut self) {
        self.release_render();
        self.system.sync_render_thread().expect("sync render thread");
        self.begin_frame();
    }

    pub fn wait(&mut self, request: &ReadbackRequest) {
        self.release_render();
        request.wait_for_completion();
    }

    /// 一直推进到请求 done，返回推进的帧数
    pub fn poll_until_done(&mut self, request: &ReadbackRequest) -> usize {
        let mut frames = 0;
        while !request.done() {
            assert!(frames < MAX_FRAMES, "{:?} never finished", request);
            self.next_frame();
            frames += 1;
        }
        frames
    }
}
impl Drop for FrameHarness {
    fn drop(&mut self) {
        self.release_render();
    }
}

pub fn both_backends() -> [BackendKind; 2] {
    [BackendKind::Custom, BackendKind::Builtin]
}
