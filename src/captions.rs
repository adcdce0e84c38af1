//! 字幕文件解析（WebVTT / SRT）
//!
//! 只保留每条字幕的开始时间和文本；结束时间、样式、位置信息一律忽略。

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

use crate::caption_aligner::CaptionCue;
use crate::error::{Result, StoryboardError};

fn timing_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"^\s*((?:\d+:)?\d{1,2}:\d{2}[.,]\d{1,3})",
            r"\s*-->\s*",
            r"((?:\d+:)?\d{1,2}:\d{2}[.,]\d{1,3})",
        ))
        .expect("timing regex is valid")
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"))
}

/// 读取并解析字幕文件
pub fn load_captions(path: impl AsRef<Path>) -> Result<Vec<CaptionCue>> {
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).map_err(|e| StoryboardError::caption_parse_failed(path, e))?;
    let cues = parse_cues(&content)
        .map_err(|reason| StoryboardError::caption_parse_failed(path, reason))?;
    debug!("[字幕解析] {}: {} 条字幕", path.display(), cues.len());
    Ok(cues)
}

/// 解析内存中的字幕文本
pub fn parse_captions(content: &str) -> Result<Vec<CaptionCue>> {
    parse_cues(content).map_err(|reason| StoryboardError::caption_parse_failed("<inline>", reason))
}

fn parse_cues(content: &str) -> std::result::Result<Vec<CaptionCue>, String> {
    let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut cues = Vec::new();

    for (block_index, block) in content.split("\n\n").enumerate() {
        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        let Some(first) = lines.first() else {
            continue;
        };

        let first = first.trim();
        if first.starts_with("WEBVTT")
            || first.starts_with("NOTE")
            || first.starts_with("STYLE")
            || first.starts_with("REGION")
        {
            continue;
        }

        // 时间轴行之前可能有编号（SRT）或 cue 标识（VTT）
        let timing_index = lines
            .iter()
            .position(|l| l.contains("-->"))
            .ok_or_else(|| format!("第 {} 个字幕块缺少时间轴: {:?}", block_index + 1, first))?;
        let timing_line = lines[timing_index];

        let caps = timing_pattern()
            .captures(timing_line)
            .ok_or_else(|| format!("时间轴格式错误: {:?}", timing_line.trim()))?;
        let start_time = parse_timestamp(&caps[1]).ok_or_else(|| format!("时间戳无效: {}", &caps[1]))?;

        let text = lines[timing_index + 1..]
            .iter()
            .map(|line| clean_text(line))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !text.is_empty() {
            cues.push(CaptionCue::new(start_time, text));
        }
    }

    // 稳定排序，开始时间相同的字幕保持原有顺序
    cues.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    Ok(cues)
}

/// 解析 `HH:MM:SS.mmm`、`MM:SS.mmm` 或 `HH:MM:SS,mmm`，返回秒
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let value = value.trim().replace(',', ".");
    let mut parts = value.rsplit(':');

    let seconds: f64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let hours: u64 = match parts.next() {
        Some(h) => h.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }

    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

fn clean_text(line: &str) -> String {
    tag_pattern()
        .replace_all(line, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
