use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{Result, StoryboardError};
use crate::timeline::Scene;

pub fn audio_file_name(index: usize) -> String {
    format!("scene_{:04}.aac", index)
}

/// 音频提取器，从视频中切出每个场景对应的音频片段
#[derive(Debug, Clone)]
pub struct AudioExtractor {
    input_path: String,
}

impl AudioExtractor {
    pub fn new(input_path: impl AsRef<Path>) -> Self {
        Self {
            input_path: input_path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// 提取 `[start, end)` 区间的音频到文件，`end` 为 `None` 时提取到结尾
    pub fn extract_clip(&self, start: f64, end: Option<f64>, output_path: &Path) -> Result<()> {
        let output_path_str = output_path.to_string_lossy().to_string();
        let duration = end.map(|end| format!("{:.3}", (end - start).max(0.0)));

        let run = |codec_args: &[&str]| -> Result<bool> {
            let mut command = Command::new("ffmpeg");
            command
                .arg("-loglevel")
                .arg("error") // 只显示错误信息
                .arg("-ss")
                .arg(format!("{:.3}", start))
                .arg("-i")
                .arg(&self.input_path);
            if let Some(duration) = &duration {
                command.arg("-t").arg(duration);
            }
            let status = command
                .arg("-vn") // 不包含视频
                .args(codec_args)
                .arg("-y") // 覆盖输出文件
                .arg(&output_path_str)
                .status()
                .map_err(|e| StoryboardError::AudioExtraction(format!("执行 ffmpeg 命令失败: {}", e)))?;
            Ok(status.success())
        };

        // 先尝试直接复制音频流，失败再重新编码为 AAC
        if run(&["-acodec", "copy"])? || run(&["-acodec", "aac", "-b:a", "192k"])? {
            return Ok(());
        }

        Err(StoryboardError::AudioExtraction(format!(
            "{:.2}s 起的音频片段提取失败",
            start
        )))
    }

    /// 并发提取所有场景的音频片段，结果按场景编号排序
    pub async fn extract_scene_clips(
        &self,
        scenes: &[Scene],
        audio_dir: &Path,
    ) -> Result<Vec<(usize, Result<PathBuf>)>> {
        std::fs::create_dir_all(audio_dir)?;

        let limit = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        for scene in scenes {
            let extractor = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let index = scene.index();
            let start = scene.start_time();
            let end = (!scene.is_open_ended()).then(|| scene.end_time());
            let output = audio_dir.join(audio_file_name(index));

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = tokio::task::spawn_blocking(move || {
                    extractor.extract_clip(start, end, &output).map(|()| output)
                })
                .await
                .map_err(|e| {
                    StoryboardError::AudioExtraction(format!("场景 {} 的提取任务异常退出: {}", index, e))
                })
                .and_then(|r| r);
                (index, result)
            });
        }

        let mut results = Vec::with_capacity(scenes.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!("⚠️  [音频提取] 任务异常退出: {}", e),
            }
        }

        // 任务完成顺序不确定，按场景编号重新排列
        results.sort_by_key(|(index, _)| *index);
        Ok(results)
    }
}

/// 将提取结果按场景编号挂到对应场景上，返回成功数量
pub fn attach_scene_audio(scenes: &mut [Scene], results: Vec<(usize, Result<PathBuf>)>) -> usize {
    let mut attached = 0;
    for (index, result) in results {
        match (scenes.get_mut(index), result) {
            (Some(scene), Ok(path)) if scene.index() == index => {
                debug!("🎵 [音频提取] 场景 {} -> {}", index, path.display());
                scene.attach_audio(path);
                attached += 1;
            }
            (_, Err(e)) => warn!("⚠️  [音频提取] 场景 {} 没有音频: {}", index, e),
            (_, Ok(path)) => warn!("⚠️  [音频提取] 未找到场景 {}，忽略 {}", index, path.display()),
        }
    }
    attached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_detector::SceneBoundary;
    use crate::timeline::assemble_timeline;
    use image::DynamicImage;

    fn scenes(count: usize) -> Vec<Scene> {
        let boundaries = (0..count)
            .map(|i| SceneBoundary {
                timestamp: i as f64 * 2.0,
                frame: DynamicImage::new_luma8(1, 1),
            })
            .collect();
        assemble_timeline(boundaries, None)
    }

    #[test]
    fn test_audio_file_name() {
        assert_eq!(audio_file_name(7), "scene_0007.aac");
    }

    #[test]
    fn test_results_rejoin_by_scene_index() {
        let mut scenes = scenes(3);
        let results = vec![
            (0, Ok(PathBuf::from("a/scene_0000.aac"))),
            (1, Err(StoryboardError::AudioExtraction("no audio".into()))),
            (2, Ok(PathBuf::from("a/scene_0002.aac"))),
            (9, Ok(PathBuf::from("a/scene_0009.aac"))),
        ];

        assert_eq!(attach_scene_audio(&mut scenes, results), 2);
        assert_eq!(scenes[0].audio(), Some(Path::new("a/scene_0000.aac")));
        assert_eq!(scenes[1].audio(), None);
        assert_eq!(scenes[2].audio(), Some(Path::new("a/scene_0002.aac")));
    }

    #[tokio::test]
    async fn test_missing_input_reports_per_scene_failures() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = AudioExtractor::new(dir.path().join("missing.mp4"));
        let scenes = scenes(2);

        let results = extractor
            .extract_scene_clips(&scenes, &dir.path().join("audio"))
            .await
            .unwrap();

        assert_eq!(results.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1]);
        assert!(results.iter().all(|(_, r)| r.is_err()));
    }
}
