use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storyboard::{generate_storyboard, ConfigLoader, ConfigOverrides, Resolution};
use tracing::Level;

/// 故事板生成工具 - 从录屏视频和字幕生成带字幕的关键画面列表
#[derive(Parser, Debug)]
#[command(name = "storyboard")]
#[command(about = "故事板生成工具：检测画面变化、提取关键画面、按时间对齐字幕", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 处理本地视频文件，生成 storyboard.html
    Generate {
        /// 输入视频文件路径
        video: PathBuf,

        /// 字幕文件路径（WebVTT 或 SRT，可选）
        captions: Option<PathBuf>,

        /// 输出目录
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// 配置文件路径（可选，支持 .ini 格式）
        /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
        #[arg(long)]
        config: Option<PathBuf>,

        /// 场景变化阈值：变化像素占比 (0.0-1.0)，值越小越敏感
        #[arg(long)]
        threshold: Option<f64>,

        /// 最小场景持续时间（秒）
        #[arg(long)]
        min_scene_duration: Option<f64>,

        /// 分析步长：每 N 帧取一帧比较
        #[arg(long)]
        stride: Option<usize>,

        /// 分析分辨率，例如 640x360
        #[arg(long)]
        resolution: Option<Resolution>,

        /// 像素灰度差阈值 (0-255)
        #[arg(long)]
        pixel_delta: Option<u8>,

        /// 为每个场景切出音频片段
        #[arg(long)]
        scene_audio: bool,
    },
    /// 生成默认配置文件
    InitConfig {
        /// 配置文件路径
        #[arg(default_value = "storyboard.ini")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Generate {
            video,
            captions,
            output_dir,
            config: config_file,
            threshold,
            min_scene_duration,
            stride,
            resolution,
            pixel_delta,
            scene_audio,
        } => {
            let overrides = ConfigOverrides {
                analysis_stride: stride,
                analysis_resolution: resolution,
                pixel_change_delta: pixel_delta,
                threshold,
                min_scene_duration,
                // 未指定时交给环境变量和配置文件决定
                scene_audio: scene_audio.then_some(true),
                ..Default::default()
            };
            let config = ConfigLoader::load_config(config_file.as_deref(), overrides)
                .context("加载配置失败")?;

            init_logging(&config.log_level);

            println!(
                "使用配置: stride={}, resolution={}, pixel_delta={}, threshold={:.3}, \
                 min_scene_duration={:.2}s, scene_audio={}",
                config.detection.analysis_stride,
                config.detection.analysis_resolution,
                config.detection.pixel_change_delta,
                config.detection.threshold,
                config.detection.min_scene_duration,
                config.scene_audio
            );

            let output = generate_storyboard(&video, captions.as_deref(), &output_dir, &config)
                .await
                .context("生成故事板失败")?;

            println!(
                "完成！共 {} 个场景，打开 {} 查看故事板",
                output.metadata.scene_count,
                output.html_path.display()
            );
        }
        Commands::InitConfig { path } => {
            ConfigLoader::create_default_config(&path)
                .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
            println!("已生成默认配置文件: {}", path.display());
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}
