use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::audio_extractor::{attach_scene_audio, AudioExtractor};
use crate::caption_aligner::{align_captions, CaptionCue};
use crate::captions::load_captions;
use crate::config::{DetectionConfig, StoryboardConfig};
use crate::error::StoryboardError;
use crate::frame_sampler::{FrameSampler, SourceFrame};
use crate::metadata::StoryboardMetadata;
use crate::render::{self, AUDIO_DIR};
use crate::scene_detector::{SceneBoundary, SceneDetector};
use crate::timeline::{assemble_timeline, Scene};
use crate::video_processor::VideoSource;

/// 场景分割结果
#[derive(Debug)]
pub struct Segmentation {
    /// 按时间递增的场景边界，第一个（如果有）时间为 0
    pub boundaries: Vec<SceneBoundary>,
    /// 从视频源读取的帧数
    pub frames_read: u64,
    /// 解码提前结束的原因
    pub truncation: Option<StoryboardError>,
}

impl Segmentation {
    /// 视频源没有产出任何帧
    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }
}

/// 采样 + 场景检测，单次顺序消费帧序列
pub fn segment<I>(frames: I, config: &DetectionConfig) -> Segmentation
where
    I: Iterator<Item = crate::error::Result<SourceFrame>>,
{
    let mut sampler = FrameSampler::from_config(frames, config);
    let mut detector = SceneDetector::from_config(config);
    let boundaries = detector.detect_scenes(sampler.by_ref());

    Segmentation {
        boundaries,
        frames_read: sampler.frames_read(),
        truncation: sampler.take_truncation(),
    }
}

/// 已完成区间划分和字幕分配的场景
#[derive(Debug)]
pub struct SceneBuild {
    pub scenes: Vec<Scene>,
    pub captions_assigned: usize,
    pub frames_read: u64,
    pub truncation: Option<StoryboardError>,
}

/// 核心流程：帧序列 -> 场景边界 -> 场景区间 -> 字幕分配
///
/// 只有在所有场景的区间和字幕都确定后才返回。
pub fn build_scenes<I, C>(
    frames: I,
    cues: C,
    config: &DetectionConfig,
    duration: Option<f64>,
) -> SceneBuild
where
    I: Iterator<Item = crate::error::Result<SourceFrame>>,
    C: IntoIterator<Item = CaptionCue>,
{
    let segmentation = segment(frames, config);
    let mut scenes = assemble_timeline(segmentation.boundaries, duration);
    let captions_assigned = align_captions(&mut scenes, cues);

    SceneBuild {
        scenes,
        captions_assigned,
        frames_read: segmentation.frames_read,
        truncation: segmentation.truncation,
    }
}

/// 处理结果
#[derive(Debug, Clone)]
pub struct StoryboardOutput {
    /// 输出目录
    pub output_dir: PathBuf,
    pub html_path: PathBuf,
    pub metadata_path: PathBuf,
    /// 元数据
    pub metadata: StoryboardMetadata,
    /// 画面文件列表
    pub frame_files: Vec<String>,
}

/// 由视频和字幕生成故事板
pub async fn generate_storyboard(
    input_video_path: impl AsRef<Path>,
    captions_path: Option<&Path>,
    output_dir: impl AsRef<Path>,
    config: &StoryboardConfig,
) -> Result<StoryboardOutput> {
    let input_video_path = input_video_path.as_ref();
    let output_dir = output_dir.as_ref();

    let total_start = Instant::now();
    info!("🎬 [故事板] 开始处理视频: {}", input_video_path.display());
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    std::fs::create_dir_all(output_dir).context("创建输出目录失败")?;

    // 1. 打开视频源（唯一的致命错误）
    let source = VideoSource::open(input_video_path).map_err(|e| {
        error!("❌ [故事板] 打开视频失败: {}", e);
        e
    })?;
    let video_info = source.info();
    info!("✅ [故事板] 视频已打开");
    info!("  • 分辨率: {}x{}", video_info.width, video_info.height);
    info!("  • 帧率: {:.2} fps", video_info.fps);
    if let Some(duration) = video_info.duration {
        info!("  • 时长: {:.2}秒", duration);
    }

    // 2. 读取字幕（失败时使用空字幕继续）
    let cues = match captions_path {
        Some(path) => match load_captions(path) {
            Ok(cues) => {
                info!("✅ [故事板] 读取字幕 {} 条: {}", cues.len(), path.display());
                cues
            }
            Err(e) if e.is_recoverable() => {
                warn!("⚠️  [故事板] {}，将不带字幕继续", e);
                Vec::new()
            }
            Err(e) => return Err(e).context("读取字幕失败"),
        },
        None => Vec::new(),
    };

    // 3. 场景检测与字幕对齐
    let detect_start = Instant::now();
    info!(
        "⏳ [故事板] 正在检测场景（步长 {}, 分析分辨率 {}, 阈值 {:.3}, 最小间隔 {:.2}s）...",
        config.detection.analysis_stride,
        config.detection.analysis_resolution,
        config.detection.threshold,
        config.detection.min_scene_duration
    );
    let frames = source.into_frames()?;
    let build = build_scenes(frames, cues, &config.detection, video_info.duration);
    let detect_duration = detect_start.elapsed();
    let mut scenes = build.scenes;

    match &build.truncation {
        Some(e) if e.is_recoverable() => warn!("⚠️  [故事板] {}，使用已解码部分继续", e),
        Some(e) => {
            error!("❌ [故事板] 解码失败: {}", e);
            anyhow::bail!("解码失败: {}", e);
        }
        None => {}
    }
    if scenes.is_empty() {
        warn!("⚠️  [故事板] 视频没有任何可解码的帧，故事板为空");
    }
    info!("✅ [故事板] 场景检测完成，耗时: {:.2}秒", detect_duration.as_secs_f64());
    info!("  • 读取帧数: {} 帧", build.frames_read);
    info!("  • 场景数: {} 个", scenes.len());
    info!("  • 已分配字幕: {} 条", build.captions_assigned);

    // 4. 场景音频（可选）
    let audio_start = Instant::now();
    if config.scene_audio && !scenes.is_empty() {
        info!("⏳ [故事板] 正在提取场景音频...");
        let extractor = AudioExtractor::new(input_video_path);
        let results = extractor
            .extract_scene_clips(&scenes, &output_dir.join(AUDIO_DIR))
            .await
            .context("创建音频目录失败")?;
        let attached = attach_scene_audio(&mut scenes, results);
        info!("✅ [故事板] 场景音频: {}/{} 个", attached, scenes.len());
    }
    let audio_duration = audio_start.elapsed();

    // 5. 画面与 HTML
    let render_start = Instant::now();
    let (html_path, frame_files) = render::write_storyboard(&scenes, output_dir).map_err(|e| {
        error!("❌ [故事板] 写出故事板失败: {}", e);
        e
    })?;
    let render_duration = render_start.elapsed();
    info!(
        "✅ [故事板] 已写出 {} 张画面，耗时: {:.2}秒",
        frame_files.len(),
        render_duration.as_secs_f64()
    );

    // 6. 元数据 JSON
    let metadata = StoryboardMetadata::from_scenes(
        input_video_path,
        captions_path,
        &video_info,
        &scenes,
        &frame_files,
        build.captions_assigned,
        build.truncation.is_some(),
    );

    let metadata_path = output_dir.join("metadata.json");
    let metadata_json = serde_json::to_string_pretty(&metadata).context("序列化元数据失败")?;
    std::fs::write(&metadata_path, metadata_json)
        .with_context(|| format!("写入元数据文件失败: {}", metadata_path.display()))?;

    // 总结
    let total_duration = total_start.elapsed();
    let percent = |part: std::time::Duration| {
        part.as_secs_f64() / total_duration.as_secs_f64().max(1e-9) * 100.0
    };
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("🎉 [故事板] 处理完成！总耗时: {:.2}秒", total_duration.as_secs_f64());
    info!("   • 场景检测: {:.2}秒 ({:.1}%)", detect_duration.as_secs_f64(), percent(detect_duration));
    info!("   • 场景音频: {:.2}秒 ({:.1}%)", audio_duration.as_secs_f64(), percent(audio_duration));
    info!("   • 画面导出: {:.2}秒 ({:.1}%)", render_duration.as_secs_f64(), percent(render_duration));
    info!("📁 [故事板] 输出: {}", html_path.display());

    let output = StoryboardOutput {
        output_dir: output_dir.to_path_buf(),
        html_path,
        metadata_path,
        metadata,
        frame_files,
    };

    // 调用 webhook 回调（如果配置了）
    if let Some(webhook_url) = &config.webhook_url {
        info!("⏳ [故事板] 正在调用 Webhook 回调...");
        if let Err(e) = call_webhook(webhook_url, &output).await {
            warn!("⚠️  [故事板] Webhook 回调失败: {}", e);
        } else {
            info!("✅ [故事板] Webhook 回调成功");
        }
    }

    Ok(output)
}

/// Webhook 回调数据结构
#[derive(Debug, serde::Serialize)]
struct WebhookPayload<'a> {
    status: &'static str,
    input_video: &'a str,
    output_dir: String,
    html_file: String,
    scene_count: usize,
    metadata: &'a StoryboardMetadata,
    timestamp: String,
}

async fn call_webhook(webhook_url: &str, output: &StoryboardOutput) -> Result<()> {
    let payload = WebhookPayload {
        status: "success",
        input_video: &output.metadata.input_video,
        output_dir: output.output_dir.to_string_lossy().to_string(),
        html_file: output.html_path.to_string_lossy().to_string(),
        scene_count: output.metadata.scene_count,
        metadata: &output.metadata,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    let response = reqwest::Client::new()
        .post(webhook_url)
        .json(&payload)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await
        .context("Webhook 请求失败")?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        warn!("Webhook 回调返回错误状态: {} - {}", status, error_text);
        anyhow::bail!("Webhook 返回错误状态: {}", status);
    }

    Ok(())
}
