use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::render::{AUDIO_DIR, FRAMES_DIR};
use crate::timeline::Scene;
use crate::video_processor::VideoInfo;

/// 单个场景的元数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneMetadata {
    /// 场景编号（从 0 开始）
    pub scene_id: usize,
    /// 画面图片文件名
    pub frame_file: String,
    /// 场景开始时间（秒）
    pub start_time: f64,
    /// 场景结束时间（秒），最后一个场景时长未知时为 null
    pub end_time: Option<f64>,
    /// 场景持续时间（秒）
    pub duration: Option<f64>,
    /// 场景内的字幕
    pub captions: Vec<String>,
    /// 场景音频文件（相对输出目录）
    pub audio_file: Option<String>,
}

impl SceneMetadata {
    pub fn from_scene(
        scene: &Scene,
        frame_file: impl Into<String>,
        audio_file: Option<String>,
    ) -> Self {
        Self {
            scene_id: scene.index(),
            frame_file: frame_file.into(),
            start_time: scene.start_time(),
            end_time: (!scene.is_open_ended()).then(|| scene.end_time()),
            duration: scene.duration(),
            captions: scene.captions().to_vec(),
            audio_file,
        }
    }
}

/// 整个故事板的元数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryboardMetadata {
    /// 输入视频文件路径
    pub input_video: String,
    /// 字幕文件路径
    pub captions_file: Option<String>,
    /// 视频总时长（秒）
    pub total_duration: Option<f64>,
    /// 视频帧率
    pub fps: f64,
    /// 视频分辨率（宽x高）
    pub resolution: String,
    /// 场景数量
    pub scene_count: usize,
    /// 已分配的字幕数量
    pub caption_count: usize,
    /// 解码是否提前结束
    pub truncated: bool,
    /// 生成时间（RFC 3339）
    pub generated_at: String,
    /// 场景列表
    pub scenes: Vec<SceneMetadata>,
}

impl StoryboardMetadata {
    /// 由已写出的场景构建元数据，画面和音频路径均相对输出目录
    ///
    /// `frame_files` 与 `scenes` 一一对应（`render::write_frames` 的返回值）。
    pub fn from_scenes(
        input_video: &Path,
        captions_file: Option<&Path>,
        info: &VideoInfo,
        scenes: &[Scene],
        frame_files: &[String],
        caption_count: usize,
        truncated: bool,
    ) -> Self {
        let scenes = scenes
            .iter()
            .zip(frame_files)
            .map(|(scene, frame_file)| {
                let audio_file = scene
                    .audio()
                    .and_then(Path::file_name)
                    .map(|name| format!("{}/{}", AUDIO_DIR, name.to_string_lossy()));
                let frame_file = format!("{}/{}", FRAMES_DIR, frame_file);
                SceneMetadata::from_scene(scene, frame_file, audio_file)
            })
            .collect::<Vec<_>>();

        Self {
            input_video: input_video.to_string_lossy().to_string(),
            captions_file: captions_file.map(|p| p.to_string_lossy().to_string()),
            total_duration: info.duration,
            fps: info.fps,
            resolution: format!("{}x{}", info.width, info.height),
            scene_count: scenes.len(),
            caption_count,
            truncated,
            generated_at: chrono::Utc::now().to_rfc3339(),
            scenes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_detector::SceneBoundary;
    use crate::timeline::assemble_timeline;
    use image::DynamicImage;

    #[test]
    fn test_open_ended_scene_serializes_null_end() {
        let scenes = assemble_timeline(
            vec![
                SceneBoundary {
                    timestamp: 0.0,
                    frame: DynamicImage::new_luma8(1, 1),
                },
                SceneBoundary {
                    timestamp: 2.0,
                    frame: DynamicImage::new_luma8(1, 1),
                },
            ],
            None,
        );

        let first = SceneMetadata::from_scene(&scenes[0], "frame_0000.jpg", None);
        let last = SceneMetadata::from_scene(&scenes[1], "frame_0001.jpg", None);
        assert_eq!(first.end_time, Some(2.0));
        assert_eq!(first.duration, Some(2.0));

        let json = serde_json::to_value(&last).unwrap();
        assert!(json["end_time"].is_null());
        assert!(json["duration"].is_null());
        assert_eq!(json["start_time"], 2.0);
    }
}
