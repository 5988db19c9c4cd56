use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 回读系统的配置
///
/// 对应 TOML 文件（所有字段都可省略）:
/// ```toml
/// force_custom_backend = false
/// queue_capacity = 8
/// purge_dead_resources = true
/// drain_on_shutdown = true
/// log_level = "info"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadbackConfig {
    /// 即使平台支持内置回读，也强制走自定义后端
    pub force_custom_backend: bool,

    /// [`crate::queue::RequestQueue`] 的容量
    pub queue_capacity: usize,

    /// 每帧是否清理已销毁资源的原生句柄缓存
    pub purge_dead_resources: bool,

    /// 关闭时是否等待所有进行中的任务完成
    pub drain_on_shutdown: bool,

    /// off / error / warn / info / debug / trace
    pub log_level: String,
}

impl Default for ReadbackConfig {
    fn default() -> Self {
        Self {
            force_custom_backend: false,
            queue_capacity: 8,
            purge_dead_resources: true,
            drain_on_shutdown: true,
            log_level: "info".to_string(),
        }
    }
}

impl ReadbackConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text).context("解析回读配置失败")?;
        if config.queue_capacity == 0 {
            anyhow::bail!("queue_capacity 必须大于 0");
        }
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("读取配置文件失败: {:?}", path))?;
        Self::from_toml_str(&text).with_context(|| format!("配置文件格式错误: {:?}", path))
    }

    /// 解析 `log_level`，无法识别时退回 Info
    pub fn log_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            log::warn!("unknown log level '{}', falling back to info", self.log_level);
            log::LevelFilter::Info
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = ReadbackConfig::from_toml_str("").unwrap();
        assert_eq!(config, ReadbackConfig::default());
        assert_eq!(config.queue_capacity, 8);
        assert!(!config.force_custom_backend);
    }

    #[test]
    fn test_partial_toml() {
        let config = ReadbackConfig::from_toml_str(
            r#"
            force_custom_backend = true
            queue_capacity = 3
            log_level = "debug"
            "#,
        )
        .unwrap();
        assert!(config.force_custom_backend);
        assert_eq!(config.queue_capacity, 3);
        assert!(config.purge_dead_resources);
        assert_eq!(config.log_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(ReadbackConfig::from_toml_str("queue_capacity = 0").is_err());
    }

    #[test]
    fn test_unknown_log_level_falls_back() {
        let config = ReadbackConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert_eq!(config.log_filter(), log::LevelFilter::Info);
    }
}
