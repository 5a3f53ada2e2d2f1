//! IOD 组合工具主程序

mod config;
mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crate::config::ComposerConfig;
use iod_dicom::{DocumentSummary, RecordValidator, ReferencedDocument, ValidationResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "iod-composer")]
#[command(about = "DICOM IOD 记录组合与结构化报告生成工具")]
struct Args {
    /// 配置文件路径 (TOML)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 生成演示检查：CR参考图像、测量报告、关键对象选择、文本报告与表示状态
    Demo {
        /// 检查数，覆盖配置
        #[arg(short, long)]
        studies: Option<usize>,

        /// 输出根目录，覆盖配置
        #[arg(short, long)]
        output: Option<String>,
    },
    /// 输出DICOM文件的摘要与验证结果 (JSON)
    Inspect {
        file: PathBuf,

        /// 使用严格验证
        #[arg(long)]
        strict: bool,
    },
}

/// inspect 子命令的输出
#[derive(Debug, Serialize)]
struct InspectReport<'a> {
    file: String,
    summary: &'a DocumentSummary,
    validation: ValidationResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = ComposerConfig::load(args.config.as_deref())?;
    if let Some(level) = &args.log_level {
        config.log.level = level.clone();
    }

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log.level).context("日志级别无效")?)
        .init();

    match args.command {
        Command::Demo { studies, output } => {
            if let Some(studies) = studies {
                config.demo.studies = studies;
            }
            if let Some(output) = output {
                config.output.root = output;
            }
            config.validate()?;
            run_demo(config).await
        }
        Command::Inspect { file, strict } => inspect(&file, strict),
    }
}

/// 每个检查在独立的阻塞任务中生成
async fn run_demo(config: ComposerConfig) -> Result<()> {
    info!("生成演示数据...");
    info!("  输出目录: {}", config.output.root);
    info!("  检查数: {}", config.demo.studies);
    info!("  每检查图像数: {}", config.demo.images);

    let config = Arc::new(config);
    let tasks: Vec<_> = (0..config.demo.studies)
        .map(|index| {
            let config = Arc::clone(&config);
            tokio::task::spawn_blocking(move || demo::build_study(index, &config))
        })
        .collect();

    let mut written = 0;
    let mut failures = 0;
    for (index, task) in tasks.into_iter().enumerate() {
        match task.await.context("生成任务异常退出")? {
            Ok(output) => written += output.files.len(),
            Err(e) => {
                error!("检查 {} 生成失败: {:#}", index, e);
                failures += 1;
            }
        }
    }

    info!("演示数据生成完成，文件数: {}，失败检查数: {}", written, failures);
    if failures > 0 {
        anyhow::bail!("{} 个检查生成失败", failures);
    }
    Ok(())
}

fn inspect(file: &Path, strict: bool) -> Result<()> {
    let document = ReferencedDocument::from_file(file)?;
    let validator = if strict {
        RecordValidator::strict()
    } else {
        RecordValidator::new()
    };
    let validation = validator.validate_dataset(document.dataset());
    if !validation.is_valid {
        warn!("{:?} 未通过验证，错误数: {}", file, validation.errors.len());
    }

    let report = InspectReport {
        file: file.display().to_string(),
        summary: document.summary(),
        validation,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
