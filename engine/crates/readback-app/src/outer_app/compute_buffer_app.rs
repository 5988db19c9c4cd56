use readback_core::software::{SoftBuffer, SoftwareGpu};
use readback_core::{ReadbackBuffer, ReadbackError, ReadbackRequest, ReadbackSystem};
use std::sync::Arc;

use crate::outer_app::OuterApp;

/// 反复把一个 compute buffer 回读到同一块调用者内存里
///
/// 上一次回读结束之后才发起下一次，每次发起前先在渲染线程上改写 buffer。
pub struct ComputeBufferApp {
    buffer: Option<Arc<SoftBuffer>>,
    destination: Option<ReadbackBuffer<f32>>,
    request: Option<ReadbackRequest>,
    frame: u64,
    completed: usize,
}
// new & init
impl ComputeBufferApp {
    const COUNT: usize = 100;

    pub fn new() -> Self {
        Self {
            buffer: None,
            destination: None,
            request: None,
            frame: 0,
            completed: 0,
        }
    }
}
impl Default for ComputeBufferApp {
    fn default() -> Self {
        Self::new()
    }
}
// tools
impl ComputeBufferApp {
    /// 上一次回读结束时返回 true
    fn harvest(&mut self) -> bool {
        let Some(request) = &self.request else {
            return true;
        };
        if request.valid() && !request.done() {
            return false;
        }

        if request.has_error() {
            log::error!("GPU readback error detected. ({:?})", request.status());
        } else {
            match request.get_data::<f32>().and_then(|view| view.to_vec()) {
                Ok(values) => {
                    self.completed += 1;
                    log::info!(
                        "frame {}: {} values, first {:?}, sum {}",
                        self.frame,
                        values.len(),
                        values.first(),
                        values.iter().sum::<f32>()
                    );
                }
                Err(err) => log::error!("{}", err),
            }
        }
        self.request = None;
        true
    }
}
impl OuterApp for ComputeBufferApp {
    fn init(&mut self, gpu: &SoftwareGpu, system: &mut ReadbackSystem) -> anyhow::Result<()> {
        log::info!("compute buffer app init.");

        let buffer = gpu.create_buffer(Self::COUNT, size_of::<f32>());
        let values: Vec<f32> = (0..Self::COUNT).map(|i| i as f32).collect();
        buffer.set_data(&values);

        self.buffer = Some(buffer);
        self.destination = Some(system.readback().create_buffer::<f32>(Self::COUNT)?);
        Ok(())
    }

    fn update(&mut self, system: &mut ReadbackSystem) {
        if self.harvest()
            && let (Some(buffer), Some(destination)) = (&self.buffer, &self.destination)
        {
            let target = buffer.clone();
            let scale = (self.frame % 10 + 1) as f32;
            let submitted = system.submit_render(move |_| {
                let values: Vec<f32> = (0..Self::COUNT).map(|i| i as f32 * scale).collect();
                target.set_data(&values);
            });
            if let Err(err) = submitted {
                log::error!("{}", err);
            }

            match system.readback().request_into(destination, buffer) {
                Ok(request) => self.request = Some(request),
                Err(ReadbackError::BufferInUse) => log::debug!("destination still in use"),
                Err(err) => log::error!("{}", err),
            }
        }
        self.frame += 1;
    }

    fn destroy(&mut self) {
        log::info!("compute buffer app: {} readbacks completed", self.completed);
        self.request = None;
        self.destination = None;
        self.buffer = None;
    }
}
