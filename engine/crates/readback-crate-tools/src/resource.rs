use std::path::{Path, PathBuf};

/// 统一路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// # 使用示例
/// ```ignore
/// let config = ReadbackPath::config_path("readback.toml"); // config/readback.toml
/// let png = ReadbackPath::capture_path("frame_60.png");    // target/captures/frame_60.png
/// ```
pub struct ReadbackPath {}
// 核心路径
impl ReadbackPath {
    /// 获取工作区根目录
    ///
    /// 当前 crate 位于 `engine/crates/readback-crate-tools`，往上三层就是工作区根目录。
    pub fn workspace_path() -> PathBuf {
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.ancestors().nth(3).unwrap_or(manifest_dir).to_path_buf()
    }

    pub fn target_path() -> PathBuf {
        Self::workspace_path().join("target")
    }
}
// 根目录下
impl ReadbackPath {
    /// 获取 `config/` 目录下的文件路径
    pub fn config_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("config").join(filename)
    }

    /// demo 截图的输出目录：`target/captures/`
    pub fn capture_dir() -> PathBuf {
        Self::target_path().join("captures")
    }

    pub fn capture_path(filename: &str) -> PathBuf {
        Self::capture_dir().join(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_under_workspace() {
        let root = ReadbackPath::workspace_path();
        assert!(ReadbackPath::config_path("readback.toml").starts_with(&root));
        assert!(ReadbackPath::capture_path("a.png").starts_with(ReadbackPath::target_path()));
        assert!(root.join("engine").join("crates").join("readback-crate-tools").ends_with("readback-crate-tools"));
    }
}
