use anyhow::Context;
use readback_core::software::{SoftTexture, SoftwareGpu, TextureFormat};
use readback_core::{ReadbackSystem, RequestQueue, TaskHandle};
use readback_crate_tools::resource::ReadbackPath;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::outer_app::OuterApp;

/// 每隔若干帧把画面回读下来存成 png
///
/// 同时在途的截图数受 [`RequestQueue`] 容量限制，超出的截图被跳过。
pub struct CaptureApp {
    texture: Option<Arc<SoftTexture>>,
    requests: Option<RequestQueue>,
    /// 截图请求 -> 发起时的帧号
    capture_frames: HashMap<TaskHandle, u64>,
    capture_interval: u64,
    frame: u64,
    saved: usize,
    output_dir: PathBuf,
}
// new & init
impl CaptureApp {
    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 64;

    pub fn new(capture_interval: u64) -> Self {
        Self {
            texture: None,
            requests: None,
            capture_frames: HashMap::new(),
            capture_interval: capture_interval.max(1),
            frame: 0,
            saved: 0,
            output_dir: ReadbackPath::capture_dir(),
        }
    }
}
// tools
impl CaptureApp {
    /// 渐变背景加一条随帧移动的竖条
    fn draw_pattern(frame: u64) -> Vec<[u8; 4]> {
        let bar = (frame % Self::WIDTH as u64) as u32;
        (0..Self::HEIGHT)
            .flat_map(|y| {
                (0..Self::WIDTH).map(move |x| {
                    if x.abs_diff(bar) < 2 {
                        [255, 255, 255, 255]
                    } else {
                        [(x * 4) as u8, (y * 4) as u8, (frame % 256) as u8, 255]
                    }
                })
            })
            .collect()
    }

    fn save_png(output_dir: &Path, frame: u64, pixels: Vec<u8>) -> anyhow::Result<PathBuf> {
        let image = image::RgbaImage::from_raw(Self::WIDTH, Self::HEIGHT, pixels)
            .context("readback size does not match the capture texture")?;
        std::fs::create_dir_all(output_dir).with_context(|| format!("Failed to create {:?}", output_dir))?;
        let path = output_dir.join(format!("frame_{:04}.png", frame));
        image.save(&path).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}
impl OuterApp for CaptureApp {
    fn init(&mut self, gpu: &SoftwareGpu, system: &mut ReadbackSystem) -> anyhow::Result<()> {
        log::info!("capture app init.");

        self.texture = Some(gpu.create_texture(Self::WIDTH, Self::HEIGHT, TextureFormat::Rgba8, 1));
        self.requests = Some(RequestQueue::from_config(system.config()));
        log::info!("captures go to {:?}", self.output_dir);
        Ok(())
    }

    fn update(&mut self, system: &mut ReadbackSystem) {
        let (Some(texture), Some(requests)) = (&self.texture, &mut self.requests) else {
            return;
        };

        // 1. 取回已经完成的截图
        let capture_frames = &mut self.capture_frames;
        let output_dir = &self.output_dir;
        let saved = &mut self.saved;
        requests.drain_ready::<u8>(|request, data| {
            let frame = capture_frames.remove(&request.handle()).unwrap_or_default();
            let result = data
                .and_then(|view| view.to_vec())
                .map_err(anyhow::Error::from)
                .and_then(|pixels| Self::save_png(output_dir, frame, pixels));
            match result {
                Ok(path) => {
                    *saved += 1;
                    log::info!("Write to file {:?}", path);
                }
                Err(err) => log::error!("capture of frame {} failed: {:?}", frame, err),
            }
        });

        // 2. 画这一帧，在渲染线程上执行
        let target = texture.clone();
        let pixels = Self::draw_pattern(self.frame);
        if let Err(err) = system.submit_render(move |_| target.set_pixels_pod(0, &pixels)) {
            log::error!("{}", err);
        }

        // 3. 截图排在本帧绘制之后
        if self.frame % self.capture_interval == 0 {
            match requests.try_request(|| system.readback().request(texture)) {
                Ok(handle) => {
                    self.capture_frames.insert(handle, self.frame);
                }
                Err(err) => log::warn!("frame {}: {}", self.frame, err),
            }
        }

        self.frame += 1;
    }

    fn destroy(&mut self) {
        let in_flight = self.requests.as_ref().map_or(0, RequestQueue::len);
        log::info!("capture app: {} images saved, {} captures dropped", self.saved, in_flight);
        self.requests = None;
        self.texture = None;
    }
}
