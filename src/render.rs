//! 故事板 HTML 渲染与画面导出

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::timeline::Scene;

/// 画面目录（相对输出目录）
pub const FRAMES_DIR: &str = "assets/frames";
/// 场景音频目录（相对输出目录）
pub const AUDIO_DIR: &str = "assets/audio";
pub const HTML_FILE: &str = "storyboard.html";

const STYLE: &str = r#"
        body { font-family: sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }
        .scene { margin-bottom: 40px; border-bottom: 1px solid #ccc; padding-bottom: 20px; }
        img { max-width: 100%; height: auto; border: 1px solid #ddd; }
        .timestamp { color: #666; font-size: 0.9em; margin-bottom: 5px; }
        .captions { font-size: 1.1em; line-height: 1.5; margin-top: 10px; }
"#;

pub fn frame_file_name(index: usize) -> String {
    format!("frame_{:04}.jpg", index)
}

/// 秒数格式化为 `H:MM:SS`（舍去小数部分）
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{}:{:02}:{:02}", total / 3600, total / 60 % 60, total % 60)
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// 将每个场景的画面保存为 JPEG，返回按场景顺序排列的文件名
///
/// 画面目录会先被清空，上一次运行留下的多余画面不会保留。
pub fn write_frames(scenes: &[Scene], frames_dir: &Path) -> Result<Vec<String>> {
    if frames_dir.is_dir() {
        fs::remove_dir_all(frames_dir)?;
    }
    fs::create_dir_all(frames_dir)?;

    scenes
        .iter()
        .map(|scene| -> Result<String> {
            let file_name = frame_file_name(scene.index());
            // JPEG 不支持透明通道，统一转为 RGB
            scene.frame().to_rgb8().save(frames_dir.join(&file_name))?;
            debug!("💾 [渲染] 已保存画面: {} ({:.2}s)", file_name, scene.start_time());
            Ok(file_name)
        })
        .collect()
}

/// 生成故事板 HTML
pub fn render_html(scenes: &[Scene]) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"utf-8\">\n");
    html.push_str("    <title>Video Storyboard</title>\n    <style>");
    html.push_str(STYLE);
    html.push_str("    </style>\n</head>\n<body>\n    <h1>Video Storyboard</h1>\n");

    for scene in scenes {
        let time_display = format_timestamp(scene.start_time());
        let _ = write!(
            html,
            r#"
    <div class="scene" id="scene-{index}">
        <div class="timestamp">Time: {time}</div>
        <img src="{frames}/{file}" alt="Scene at {time}">
"#,
            index = scene.index(),
            time = time_display,
            frames = FRAMES_DIR,
            file = frame_file_name(scene.index()),
        );

        if let Some(file_name) = scene.audio().and_then(Path::file_name) {
            let _ = writeln!(
                html,
                r#"        <audio controls src="{}/{}"></audio>"#,
                AUDIO_DIR,
                escape_html(&file_name.to_string_lossy())
            );
        }

        let _ = write!(
            html,
            "        <div class=\"captions\">{}</div>\n    </div>\n",
            escape_html(&scene.caption_text())
        );
    }

    html.push_str("</body>\n</html>\n");
    html
}

/// 导出画面并写出 `storyboard.html`，返回 HTML 路径和画面文件名
pub fn write_storyboard(scenes: &[Scene], output_dir: &Path) -> Result<(PathBuf, Vec<String>)> {
    let frame_files = write_frames(scenes, &output_dir.join(FRAMES_DIR))?;
    let html_path = output_dir.join(HTML_FILE);
    fs::write(&html_path, render_html(scenes))?;
    Ok((html_path, frame_files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption_aligner::{align_captions, CaptionCue};
    use crate::scene_detector::SceneBoundary;
    use crate::timeline::assemble_timeline;
    use image::DynamicImage;

    fn scenes() -> Vec<Scene> {
        let boundaries = [0.0, 65.4]
            .iter()
            .map(|&timestamp| SceneBoundary {
                timestamp,
                frame: DynamicImage::new_rgb8(8, 6),
            })
            .collect();
        let mut scenes = assemble_timeline(boundaries, None);
        align_captions(
            &mut scenes,
            vec![
                CaptionCue::new(1.0, "a < b"),
                CaptionCue::new(2.0, "& more"),
                CaptionCue::new(70.0, "second"),
            ],
        );
        scenes
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00:00");
        assert_eq!(format_timestamp(65.9), "0:01:05");
        assert_eq!(format_timestamp(3725.0), "1:02:05");
        assert_eq!(format_timestamp(f64::INFINITY), "0:00:00");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"x" & 'y'</b>"#),
            "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_html_lists_scenes_with_joined_captions() {
        let html = render_html(&scenes());

        assert_eq!(html.matches("class=\"scene\"").count(), 2);
        assert!(html.contains("Time: 0:00:00"));
        assert!(html.contains("Time: 0:01:05"));
        assert!(html.contains("assets/frames/frame_0001.jpg"));
        assert!(html.contains("a &lt; b &amp; more"));
        assert!(!html.contains("<audio"));
    }

    #[test]
    fn test_html_includes_attached_audio() {
        let mut scenes = scenes();
        scenes[1].attach_audio("/tmp/out/assets/audio/scene_0001.aac");
        let html = render_html(&scenes);
        assert!(html.contains(r#"<audio controls src="assets/audio/scene_0001.aac"></audio>"#));
    }

    #[test]
    fn test_write_storyboard_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let (html_path, frames) = write_storyboard(&scenes(), dir.path()).unwrap();

        assert!(html_path.exists());
        assert_eq!(frames, vec!["frame_0000.jpg", "frame_0001.jpg"]);
        for frame in &frames {
            assert!(dir.path().join(FRAMES_DIR).join(frame).exists());
        }
    }

    #[test]
    fn test_rerun_with_fewer_scenes_removes_stale_frames() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join(FRAMES_DIR);
        fs::create_dir_all(&frames_dir).unwrap();
        fs::write(frames_dir.join(frame_file_name(2)), b"stale").unwrap();

        let (_, frames) = write_storyboard(&scenes(), dir.path()).unwrap();

        let mut on_disk: Vec<String> = fs::read_dir(&frames_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        on_disk.sort();
        assert_eq!(on_disk, frames);
    }
}
