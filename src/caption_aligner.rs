use tracing::debug;

use crate::timeline::Scene;

/// 一条字幕：开始时间和文本
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCue {
    /// 开始时间（秒）
    pub start_time: f64,
    pub text: String,
}

impl CaptionCue {
    pub fn new(start_time: f64, text: impl Into<String>) -> Self {
        Self {
            start_time,
            text: text.into(),
        }
    }
}

/// 将按时间排序的字幕分配到场景
///
/// 每条字幕归入满足 `start_time <= cue.start_time < end_time` 的场景；
/// 早于第一个场景的字幕归入场景 0。场景游标只前进不后退，总开销
/// O(场景数 + 字幕数)。没有场景时不做任何事。返回已分配的字幕数。
pub fn align_captions<I>(scenes: &mut [Scene], cues: I) -> usize
where
    I: IntoIterator<Item = CaptionCue>,
{
    if scenes.is_empty() {
        return 0;
    }

    let mut cursor = 0;
    let mut assigned = 0;

    for cue in cues {
        while cursor + 1 < scenes.len() && scenes[cursor + 1].start_time() <= cue.start_time {
            cursor += 1;
        }
        scenes[cursor].push_caption(cue.text);
        assigned += 1;
    }

    debug!("[字幕对齐] 已将 {} 条字幕分配到 {} 个场景", assigned, scenes.len());
    assigned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_detector::SceneBoundary;
    use crate::timeline::assemble_timeline;
    use image::DynamicImage;

    fn scenes_at(starts: &[f64]) -> Vec<Scene> {
        let boundaries = starts
            .iter()
            .map(|&timestamp| SceneBoundary {
                timestamp,
                frame: DynamicImage::new_luma8(1, 1),
            })
            .collect();
        assemble_timeline(boundaries, None)
    }

    #[test]
    fn test_cues_land_in_containing_scene() {
        let mut scenes = scenes_at(&[0.0, 2.0]);
        let assigned = align_captions(
            &mut scenes,
            vec![CaptionCue::new(1.0, "hello"), CaptionCue::new(2.5, "world")],
        );

        assert_eq!(assigned, 2);
        assert_eq!(scenes[0].captions(), ["hello"]);
        assert_eq!(scenes[1].captions(), ["world"]);
    }

    #[test]
    fn test_cue_at_boundary_belongs_to_later_scene() {
        let mut scenes = scenes_at(&[0.0, 2.0, 4.0]);
        align_captions(&mut scenes, vec![CaptionCue::new(2.0, "edge")]);

        assert!(scenes[0].captions().is_empty());
        assert_eq!(scenes[1].captions(), ["edge"]);
    }

    #[test]
    fn test_every_cue_assigned_once_in_order() {
        let mut scenes = scenes_at(&[0.0, 3.0, 7.0, 8.0]);
        let cues: Vec<CaptionCue> = [0.0, 0.5, 2.9, 3.0, 3.0, 6.0, 9.0, 120.0]
            .iter()
            .enumerate()
            .map(|(i, &t)| CaptionCue::new(t, format!("cue{}", i)))
            .collect();

        let assigned = align_captions(&mut scenes, cues.clone());
        assert_eq!(assigned, cues.len());

        // 按场景顺序拼接后与输入完全一致
        let flattened: Vec<String> = scenes.iter().flat_map(|s| s.captions().to_vec()).collect();
        let expected: Vec<String> = cues.iter().map(|c| c.text.clone()).collect();
        assert_eq!(flattened, expected);

        assert_eq!(scenes[0].captions(), ["cue0", "cue1", "cue2"]);
        assert_eq!(scenes[1].captions(), ["cue3", "cue4", "cue5"]);
        assert!(scenes[2].captions().is_empty());
        assert_eq!(scenes[3].captions(), ["cue6", "cue7"]);
    }

    #[test]
    fn test_cue_before_first_scene_is_clamped_to_scene_zero() {
        let mut scenes = scenes_at(&[0.0, 1.5]);
        align_captions(&mut scenes, vec![CaptionCue::new(-0.25, "early")]);
        assert_eq!(scenes[0].captions(), ["early"]);
    }

    #[test]
    fn test_no_scenes_is_a_no_op() {
        let mut scenes: Vec<Scene> = Vec::new();
        let assigned = align_captions(&mut scenes, vec![CaptionCue::new(1.0, "lost")]);
        assert_eq!(assigned, 0);
    }

    #[test]
    fn test_no_cues_leaves_captions_empty() {
        let mut scenes = scenes_at(&[0.0, 1.5]);
        assert_eq!(align_captions(&mut scenes, Vec::<CaptionCue>::new()), 0);
        assert!(scenes.iter().all(|s| s.captions().is_empty()));
    }
}
