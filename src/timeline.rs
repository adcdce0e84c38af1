use image::DynamicImage;
use std::path::{Path, PathBuf};

use crate::scene_detector::SceneBoundary;

/// 一个场景：连续的时间区间 `[start_time, end_time)`，对应一张画面和若干字幕
///
/// 由 [`assemble_timeline`] 一次性构建，之后只允许追加字幕和附加音频。
#[derive(Debug, Clone)]
pub struct Scene {
    index: usize,
    start_time: f64,
    end_time: f64,
    frame: DynamicImage,
    captions: Vec<String>,
    audio: Option<PathBuf>,
}

impl Scene {
    /// 场景编号，下游产物（图片、音频）按它关联
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// 结束时间（不含）；最后一个场景在时长未知时为 `f64::INFINITY`
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn is_open_ended(&self) -> bool {
        self.end_time.is_infinite()
    }

    pub fn duration(&self) -> Option<f64> {
        (!self.is_open_ended()).then(|| self.end_time - self.start_time)
    }

    pub fn contains(&self, timestamp: f64) -> bool {
        self.start_time <= timestamp && timestamp < self.end_time
    }

    pub fn frame(&self) -> &DynamicImage {
        &self.frame
    }

    pub fn captions(&self) -> &[String] {
        &self.captions
    }

    /// 用于展示的字幕文本（空格拼接）
    pub fn caption_text(&self) -> String {
        self.captions.join(" ")
    }

    pub fn audio(&self) -> Option<&Path> {
        self.audio.as_deref()
    }

    pub(crate) fn push_caption(&mut self, text: String) {
        self.captions.push(text);
    }

    pub fn attach_audio(&mut self, path: impl Into<PathBuf>) {
        self.audio = Some(path.into());
    }
}

/// 由有序的场景边界构建首尾相接的场景列表
///
/// `scene[i].end_time == scene[i + 1].start_time`；最后一个场景结束于
/// `duration`（已知且晚于其开始时间时），否则为正无穷。
pub fn assemble_timeline(boundaries: Vec<SceneBoundary>, duration: Option<f64>) -> Vec<Scene> {
    debug_assert!(
        boundaries.windows(2).all(|w| w[0].timestamp < w[1].timestamp),
        "场景边界时间必须严格递增"
    );

    let starts: Vec<f64> = boundaries.iter().map(|b| b.timestamp).collect();
    let last_end = |start: f64| match duration {
        Some(d) if d.is_finite() && d > start => d,
        _ => f64::INFINITY,
    };

    boundaries
        .into_iter()
        .enumerate()
        .map(|(index, boundary)| Scene {
            index,
            start_time: boundary.timestamp,
            end_time: starts
                .get(index + 1)
                .copied()
                .unwrap_or_else(|| last_end(boundary.timestamp)),
            frame: boundary.frame,
            captions: Vec::new(),
            audio: None,
        })
        .collect()
}
