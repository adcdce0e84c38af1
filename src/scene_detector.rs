use image::{DynamicImage, GrayImage};
use tracing::{debug, trace};

use crate::config::DetectionConfig;
use crate::frame_sampler::AnalysisSample;

/// 场景边界：新场景开始的时间点及其全分辨率画面
#[derive(Debug, Clone)]
pub struct SceneBoundary {
    /// 场景开始时间（秒）
    pub timestamp: f64,
    pub frame: DynamicImage,
}

/// 检测器状态
#[derive(Debug)]
enum DetectorState {
    AwaitingFirstFrame,
    Tracking {
        /// 最近一次确认的场景边界的分析样本
        reference: GrayImage,
        /// 最近一次确认的场景边界时间
        last_boundary: f64,
    },
}

/// 场景检测器，用于检测画面内容的显著变化
///
/// 每个新样本都与“最近确认的场景”的样本比较，而不是与上一帧比较，
/// 因此逐步累积的小变化（例如幻灯片上逐条出现的要点）也会在总差异
/// 超过阈值时触发新场景。
#[derive(Debug)]
pub struct SceneDetector {
    /// 场景变化阈值（变化像素占比，严格大于才触发）
    threshold: f64,
    /// 最小场景持续时间（秒）
    min_scene_duration: f64,
    /// 单个像素灰度差超过该值才计为变化
    pixel_change_delta: u8,
    state: DetectorState,
}

impl SceneDetector {
    pub fn new(threshold: f64, min_scene_duration: f64, pixel_change_delta: u8) -> Self {
        Self {
            threshold,
            min_scene_duration,
            pixel_change_delta,
            state: DetectorState::AwaitingFirstFrame,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.threshold, config.min_scene_duration, config.pixel_change_delta)
    }

    /// 是否已经收到第一帧
    pub fn is_tracking(&self) -> bool {
        matches!(self.state, DetectorState::Tracking { .. })
    }

    /// 计算两个分析样本之间的变化像素占比
    /// 返回 0.0-1.0 之间的值，1.0 表示所有像素都发生了变化
    pub fn calculate_change_ratio(&self, reference: &GrayImage, current: &GrayImage) -> f64 {
        change_ratio(reference, current, self.pixel_change_delta)
    }

    /// 处理一个样本，确认新场景时返回对应的场景边界
    pub fn observe(&mut self, sample: AnalysisSample) -> Option<SceneBoundary> {
        match self.state {
            DetectorState::AwaitingFirstFrame => {
                // 第一帧无条件成为场景 0，时间固定为 0
                self.state = DetectorState::Tracking {
                    reference: sample.pixels,
                    last_boundary: 0.0,
                };
                debug!("🎬 [场景检测] 场景 0 @ 0.00s (首帧时间 {:.3}s)", sample.timestamp);
                Some(SceneBoundary {
                    timestamp: 0.0,
                    frame: sample.frame,
                })
            }
            DetectorState::Tracking {
                ref mut reference,
                ref mut last_boundary,
            } => {
                let ratio = change_ratio(reference, &sample.pixels, self.pixel_change_delta);
                let elapsed = sample.timestamp - *last_boundary;
                trace!(
                    "[场景检测] {:.3}s: 变化比例 {:.4}, 距上一场景 {:.3}s",
                    sample.timestamp,
                    ratio,
                    elapsed
                );

                if ratio > self.threshold && elapsed > self.min_scene_duration {
                    // 参考样本切换到新确认的场景
                    *reference = sample.pixels;
                    *last_boundary = sample.timestamp;
                    debug!(
                        "🎬 [场景检测] 新场景 @ {:.2}s (变化比例 {:.2}%)",
                        sample.timestamp,
                        ratio * 100.0
                    );
                    Some(SceneBoundary {
                        timestamp: sample.timestamp,
                        frame: sample.frame,
                    })
                } else {
                    None
                }
            }
        }
    }

    /// 检测场景变化点
    /// 按时间顺序返回场景边界；没有任何样本时返回空列表
    pub fn detect_scenes<I>(&mut self, samples: I) -> Vec<SceneBoundary>
    where
        I: IntoIterator<Item = AnalysisSample>,
    {
        samples
            .into_iter()
            .filter_map(|sample| self.observe(sample))
            .collect()
    }
}

/// 变化像素数 / 总像素数；尺寸不一致时视为完全不同
fn change_ratio(reference: &GrayImage, current: &GrayImage, pixel_change_delta: u8) -> f64 {
    if reference.dimensions() != current.dimensions() {
        return 1.0;
    }

    let total_pixels = reference.width() as u64 * reference.height() as u64;
    if total_pixels == 0 {
        return 0.0;
    }

    let changed_pixels = reference
        .pixels()
        .zip(current.pixels())
        .filter(|(p1, p2)| p1[0].abs_diff(p2[0]) > pixel_change_delta)
        .count();

    changed_pixels as f64 / total_pixels as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    const SIDE: u32 = 100;

    /// 前 `changed` 个像素为 255，其余为 0
    fn image_with_changed(changed: u32) -> GrayImage {
        GrayImage::from_fn(SIDE, SIDE, |x, y| {
            if y * SIDE + x < changed {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        })
    }

    fn sample(timestamp: f64, pixels: GrayImage) -> AnalysisSample {
        AnalysisSample {
            timestamp,
            frame: DynamicImage::ImageLuma8(pixels.clone()),
            pixels,
        }
    }

    fn timestamps(boundaries: &[SceneBoundary]) -> Vec<f64> {
        boundaries.iter().map(|b| b.timestamp).collect()
    }

    fn default_detector() -> SceneDetector {
        SceneDetector::from_config(&DetectionConfig::default())
    }

    #[test]
    fn test_first_sample_is_scene_zero_at_time_zero() {
        let mut detector = default_detector();
        assert!(!detector.is_tracking());

        let boundary = detector.observe(sample(0.3, image_with_changed(0))).unwrap();
        assert_eq!(boundary.timestamp, 0.0);
        assert!(detector.is_tracking());
    }

    #[test]
    fn test_change_ratio_exactly_at_threshold_does_not_trigger() {
        let mut detector = default_detector();
        // 100 / 10000 = 1.00%
        let boundaries = detector.detect_scenes(vec![
            sample(0.0, image_with_changed(0)),
            sample(2.0, image_with_changed(100)),
        ]);
        assert_eq!(timestamps(&boundaries), vec![0.0]);

        let mut detector = default_detector();
        let boundaries = detector.detect_scenes(vec![
            sample(0.0, image_with_changed(0)),
            sample(2.0, image_with_changed(101)),
        ]);
        assert_eq!(timestamps(&boundaries), vec![0.0, 2.0]);
    }

    #[test]
    fn test_debounce_suppresses_changes_inside_window() {
        let mut detector = default_detector();
        let boundaries = detector.detect_scenes(vec![
            sample(0.0, image_with_changed(0)),
            sample(2.0, image_with_changed(10_000)),
            sample(2.5, image_with_changed(0)),
        ]);
        assert_eq!(timestamps(&boundaries), vec![0.0, 2.0]);

        let mut detector = default_detector();
        let boundaries = detector.detect_scenes(vec![
            sample(0.0, image_with_changed(0)),
            sample(2.0, image_with_changed(10_000)),
            sample(3.5, image_with_changed(0)),
        ]);
        assert_eq!(timestamps(&boundaries), vec![0.0, 2.0, 3.5]);
    }

    #[test]
    fn test_debounce_is_strict() {
        let mut detector = default_detector();
        let boundaries = detector.detect_scenes(vec![
            sample(0.0, image_with_changed(0)),
            sample(1.0, image_with_changed(10_000)),
        ]);
        assert_eq!(timestamps(&boundaries), vec![0.0]);
    }

    #[test]
    fn test_small_changes_accumulate_against_last_scene() {
        // 每步新增 60 个像素 (0.6%)，相邻帧比较永远不会触发
        let mut detector = default_detector();
        let boundaries = detector.detect_scenes(vec![
            sample(0.0, image_with_changed(0)),
            sample(2.0, image_with_changed(60)),
            sample(4.0, image_with_changed(120)),
            sample(6.0, image_with_changed(180)),
        ]);
        assert_eq!(timestamps(&boundaries), vec![0.0, 4.0]);
    }

    #[test]
    fn test_suppressed_change_keeps_reference() {
        let mut detector = default_detector();
        let boundaries = detector.detect_scenes(vec![
            sample(0.0, image_with_changed(0)),
            sample(0.5, image_with_changed(5_000)),
            sample(1.5, image_with_changed(5_000)),
        ]);
        assert_eq!(timestamps(&boundaries), vec![0.0, 1.5]);
    }

    #[test]
    fn test_empty_input_yields_no_boundaries() {
        let mut detector = default_detector();
        assert!(detector.detect_scenes(Vec::<AnalysisSample>::new()).is_empty());
        assert!(!detector.is_tracking());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let stream = || {
            vec![
                sample(0.0, image_with_changed(0)),
                sample(1.2, image_with_changed(3_000)),
                sample(1.8, image_with_changed(9_000)),
                sample(3.1, image_with_changed(9_000)),
                sample(4.4, image_with_changed(50)),
            ]
        };

        let first = timestamps(&default_detector().detect_scenes(stream()));
        let second = timestamps(&default_detector().detect_scenes(stream()));
        assert_eq!(first, second);
        assert_eq!(first, vec![0.0, 1.2, 3.1, 4.4]);
    }

    #[test]
    fn test_pixel_delta_is_strict() {
        let detector = default_detector();
        let base = GrayImage::from_pixel(10, 10, Luma([100u8]));
        let at_delta = GrayImage::from_pixel(10, 10, Luma([130u8]));
        let over_delta = GrayImage::from_pixel(10, 10, Luma([131u8]));

        assert_eq!(detector.calculate_change_ratio(&base, &at_delta), 0.0);
        assert_eq!(detector.calculate_change_ratio(&base, &over_delta), 1.0);
    }

    #[test]
    fn test_mismatched_dimensions_count_as_full_change() {
        let detector = default_detector();
        let a = GrayImage::new(10, 10);
        let b = GrayImage::new(20, 10);
        assert_eq!(detector.calculate_change_ratio(&a, &b), 1.0);
    }
}
