//! 配置管理
//!
//! 按顺序叠加三层来源：内置默认值、可选的 TOML 配置文件、以 `IOD_COMPOSER`
//! 为前缀的环境变量 (例如 `IOD_COMPOSER_DEMO_STUDIES=4`)。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "IOD_COMPOSER";

/// 单幅演示图像的最大边长
const MAX_IMAGE_SIDE: u32 = 4096;

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposerConfig {
    pub output: OutputConfig,
    pub demo: DemoConfig,
    pub log: LogConfig,
}

/// 输出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 输出根目录
    pub root: String,
    /// 沿用记录创建时的文件元信息
    pub preserve: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: "./output".to_string(),
            preserve: false,
        }
    }
}

/// 演示数据配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// 检查数，每个检查在独立的阻塞任务中生成
    pub studies: usize,
    /// 每个检查的CR参考图像数
    pub images: usize,
    pub rows: u32,
    pub columns: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            studies: 1,
            images: 2,
            rows: 256,
            columns: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ComposerConfig {
    /// 加载配置，`path` 为 `None` 时只使用默认值与环境变量
    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("output.root", defaults.output.root.clone())?
            .set_default("output.preserve", defaults.output.preserve)?
            .set_default("demo.studies", defaults.demo.studies as i64)?
            .set_default("demo.images", defaults.demo.images as i64)?
            .set_default("demo.rows", i64::from(defaults.demo.rows))?
            .set_default("demo.columns", i64::from(defaults.demo.columns))?
            .set_default("log.level", defaults.log.level.clone())?;

        if let Some(path) = path {
            debug!("读取配置文件: {}", path);
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("_"))
            .build()
            .context("配置加载失败")?;

        let config: ComposerConfig = settings.try_deserialize().context("配置反序列化失败")?;
        config.validate()?;

        info!("配置加载完成: {}", path.unwrap_or("<默认>"));
        Ok(config)
    }

    /// 验证配置，收集全部问题后一次返回
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.output.root.trim().is_empty() {
            errors.push("output.root 不能为空".to_string());
        }
        if self.demo.studies == 0 {
            errors.push("demo.studies 必须大于 0".to_string());
        }
        if self.demo.images == 0 {
            errors.push("demo.images 必须大于 0".to_string());
        }
        for (name, side) in [("demo.rows", self.demo.rows), ("demo.columns", self.demo.columns)] {
            if side == 0 || side > MAX_IMAGE_SIDE {
                errors.push(format!("{} 必须在 1..={} 范围内，当前为 {}", name, MAX_IMAGE_SIDE, side));
            }
        }
        if self.log.level.trim().is_empty() {
            errors.push("log.level 不能为空".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("配置无效: {}", errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ComposerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.demo.images, 2);
        assert_eq!(config.output.root, "./output");
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[demo]\nstudies = 3\nrows = 64\n\n[output]\nroot = \"/tmp/iod\"").unwrap();

        let config = ComposerConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.demo.studies, 3);
        assert_eq!(config.demo.rows, 64);
        assert_eq!(config.demo.columns, 256);
        assert_eq!(config.output.root, "/tmp/iod");
        assert!(!config.output.preserve);
    }

    #[test]
    fn test_invalid_file_values_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[demo]\nstudies = 0\ncolumns = 10000").unwrap();

        let err = ComposerConfig::load(file.path().to_str()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("demo.studies"));
        assert!(message.contains("demo.columns"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(ComposerConfig::load(missing.to_str()).is_err());
    }
}
