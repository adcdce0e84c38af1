use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use tracing::{debug, warn};

use crate::config::{DetectionConfig, Resolution};
use crate::error::{Result, StoryboardError};

/// 视频源产出的一帧（全分辨率）
#[derive(Debug, Clone)]
pub struct SourceFrame {
    /// 时间戳（秒）
    pub timestamp: f64,
    pub image: DynamicImage,
}

impl SourceFrame {
    pub fn new(timestamp: f64, image: DynamicImage) -> Self {
        Self { timestamp, image }
    }
}

/// 用于比较的分析样本：缩放后的灰度图，附带原始全分辨率帧
#[derive(Debug, Clone)]
pub struct AnalysisSample {
    pub timestamp: f64,
    pub pixels: GrayImage,
    pub frame: DynamicImage,
}

/// 帧采样器
///
/// 每 `stride` 帧取一帧（第 0、k、2k... 帧），缩放到分析分辨率并转为灰度。
/// 上游出现解码错误时视为流在该处截断：记录错误并结束迭代。
pub struct FrameSampler<I> {
    frames: I,
    stride: usize,
    resolution: Resolution,
    position: u64,
    truncation: Option<StoryboardError>,
    done: bool,
}

impl<I> FrameSampler<I>
where
    I: Iterator<Item = Result<SourceFrame>>,
{
    pub fn new(frames: I, stride: usize, resolution: Resolution) -> Self {
        Self {
            frames,
            stride: stride.max(1),
            resolution,
            position: 0,
            truncation: None,
            done: false,
        }
    }

    pub fn from_config(frames: I, config: &DetectionConfig) -> Self {
        Self::new(frames, config.analysis_stride, config.analysis_resolution)
    }

    /// 已从上游读取的帧数（包含被跳过的帧）
    pub fn frames_read(&self) -> u64 {
        self.position
    }

    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }

    /// 取出导致截断的解码错误（如果有）
    pub fn take_truncation(&mut self) -> Option<StoryboardError> {
        self.truncation.take()
    }
}

impl<I> Iterator for FrameSampler<I>
where
    I: Iterator<Item = Result<SourceFrame>>,
{
    type Item = AnalysisSample;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.frames.next() {
                None => self.done = true,
                Some(Err(e)) => {
                    warn!("⚠️  [帧采样] 第 {} 帧解码失败，按流结束处理: {}", self.position, e);
                    self.truncation = Some(e);
                    self.done = true;
                }
                Some(Ok(frame)) => {
                    let position = self.position;
                    self.position += 1;
                    if position % self.stride as u64 != 0 {
                        continue;
                    }

                    debug!("[帧采样] 采样第 {} 帧 ({:.3}s)", position, frame.timestamp);
                    return Some(AnalysisSample {
                        timestamp: frame.timestamp,
                        pixels: downsample(&frame.image, self.resolution),
                        frame: frame.image,
                    });
                }
            }
        }
        None
    }
}

/// 缩放到分析分辨率并转为单通道灰度
pub fn downsample(image: &DynamicImage, resolution: Resolution) -> GrayImage {
    if image.width() == resolution.width && image.height() == resolution.height {
        image.to_luma8()
    } else {
        image
            .resize_exact(resolution.width, resolution.height, FilterType::Triangle)
            .to_luma8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn gray_frame(timestamp: f64, width: u32, height: u32, value: u8) -> Result<SourceFrame> {
        Ok(SourceFrame::new(
            timestamp,
            DynamicImage::ImageLuma8(ImageBuffer::from_pixel(width, height, Luma([value]))),
        ))
    }

    #[test]
    fn test_stride_keeps_every_kth_frame() {
        let frames = (0..7).map(|i| gray_frame(i as f64 * 0.1, 4, 4, 0));
        let sampler = FrameSampler::new(frames, 3, Resolution::new(4, 4));

        let timestamps: Vec<f64> = sampler.map(|s| s.timestamp).collect();
        assert_eq!(timestamps.len(), 3);
        assert!((timestamps[0] - 0.0).abs() < 1e-9);
        assert!((timestamps[1] - 0.3).abs() < 1e-9);
        assert!((timestamps[2] - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_samples_are_resized_but_frame_is_kept_full_size() {
        let frames = std::iter::once(gray_frame(0.0, 64, 36, 128));
        let mut sampler = FrameSampler::new(frames, 1, Resolution::new(16, 9));

        let sample = sampler.next().unwrap();
        assert_eq!(sample.pixels.dimensions(), (16, 9));
        assert_eq!((sample.frame.width(), sample.frame.height()), (64, 36));
        assert!(sample.pixels.pixels().all(|p| p[0].abs_diff(128) <= 1));
        assert!(sampler.next().is_none());
    }

    #[test]
    fn test_decode_error_truncates_stream() {
        let frames = vec![
            gray_frame(0.0, 4, 4, 0),
            gray_frame(0.5, 4, 4, 0),
            Err(StoryboardError::DecodeTruncated {
                reason: "corrupt packet".into(),
            }),
            gray_frame(1.5, 4, 4, 0),
        ];
        let mut sampler = FrameSampler::new(frames.into_iter(), 1, Resolution::new(4, 4));

        let samples: Vec<_> = sampler.by_ref().collect();
        assert_eq!(samples.len(), 2);
        assert!(sampler.is_truncated());
        assert!(matches!(
            sampler.take_truncation(),
            Some(StoryboardError::DecodeTruncated { .. })
        ));
        assert!(sampler.next().is_none());
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        let frames = std::iter::empty::<Result<SourceFrame>>();
        let mut sampler = FrameSampler::new(frames, 2, Resolution::default());
        assert!(sampler.next().is_none());
        assert!(!sampler.is_truncated());
        assert_eq!(sampler.frames_read(), 0);
    }
}
