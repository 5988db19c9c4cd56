use anyhow::Context;
use clap::Parser;
use readback_core::software::SoftwareGpu;
use readback_core::{ReadbackConfig, ReadbackSystem};
use readback_crate_tools::init_log::init_log;
use readback_crate_tools::resource::ReadbackPath;
use std::path::PathBuf;

use crate::outer_app::OuterApp;

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

/// 帧循环参数，来自命令行
#[derive(Debug, Clone, Parser)]
#[command(version, about = "异步 GPU 回读演示")]
pub struct AppSettings {
    /// 运行的帧数
    #[arg(long, default_value_t = 240)]
    pub frame_count: u64,

    /// 软件设备上一次拷贝需要的帧数
    #[arg(long, default_value_t = 2)]
    pub fence_latency: u32,
}
impl Default for AppSettings {
    fn default() -> Self {
        Self {
            frame_count: 240,
            fence_latency: 2,
        }
    }
}

pub struct ReadbackApp {
    gpu: SoftwareGpu,
    system: ReadbackSystem,
    outer_app: Box<dyn OuterApp>,
    settings: AppSettings,
}
// 总的 main 函数
impl ReadbackApp {
    /// 整个程序的入口
    pub fn run(outer_app: Box<dyn OuterApp>) {
        std::panic::set_hook(Box::new(panic_handler));

        let config = Self::load_config();
        init_log(config.as_ref().map_or(log::LevelFilter::Info, ReadbackConfig::log_filter));
        let config = config.unwrap_or_else(|err| {
            log::error!("{:?}", err);
            log::warn!("using default readback config");
            ReadbackConfig::default()
        });

        match Self::new(config, outer_app, AppSettings::parse()) {
            Ok(app) => app.run_frames(),
            Err(err) => log::error!("{:?}", err),
        }

        log::info!("end run.");
    }

    /// `READBACK_CONFIG` 指定的文件，否则 `config/readback.toml`；文件不存在时用默认配置
    fn load_config() -> anyhow::Result<ReadbackConfig> {
        let path = std::env::var_os("READBACK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| ReadbackPath::config_path("readback.toml"));
        if !path.exists() {
            return Ok(ReadbackConfig::default());
        }
        ReadbackConfig::from_file(&path)
    }
}
// new & init
impl ReadbackApp {
    fn new(config: ReadbackConfig, mut outer_app: Box<dyn OuterApp>, settings: AppSettings) -> anyhow::Result<Self> {
        let gpu = SoftwareGpu::new().with_fence_latency(settings.fence_latency);
        let mut system = ReadbackSystem::init(config, gpu.copy_engine(), Some(gpu.platform()))?;
        outer_app.init(&gpu, &mut system).context("Failed to init outer app")?;

        Ok(Self {
            gpu,
            system,
            outer_app,
            settings,
        })
    }
}
// update
impl ReadbackApp {
    fn run_frames(mut self) {
        log::info!(
            "running {} frames, fence latency {}",
            self.settings.frame_count,
            self.settings.fence_latency
        );
        for _ in 0..self.settings.frame_count {
            self.update();
        }
        self.destroy();
    }

    /// 一帧：回读系统 update -> 应用逻辑 -> 等渲染线程执行完本帧的命令
    fn update(&mut self) {
        self.system.update();
        self.outer_app.update(&mut self.system);
        if let Err(err) = self.system.sync_render_thread() {
            log::error!("frame {}: {}", self.system.frame_id(), err);
        }
    }
}
// destroy
impl ReadbackApp {
    fn destroy(self) {
        let Self {
            gpu,
            system,
            mut outer_app,
            ..
        } = self;
        outer_app.destroy();
        system.shutdown();
        log::info!("{} soft resources left", gpu.resource_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_command_line() {
        let settings = AppSettings::try_parse_from(["capture"]).unwrap();
        assert_eq!(settings.frame_count, AppSettings::default().frame_count);
        assert_eq!(settings.fence_latency, AppSettings::default().fence_latency);

        let settings = AppSettings::try_parse_from(["capture", "--frame-count", "10", "--fence-latency", "0"]).unwrap();
        assert_eq!(settings.frame_count, 10);
        assert_eq!(settings.fence_latency, 0);

        assert!(AppSettings::try_parse_from(["capture", "--frame-count", "many"]).is_err());
        assert!(AppSettings::try_parse_from(["capture", "10"]).is_err());
    }
}
