use ffmpeg_next as ffmpeg;
use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, StoryboardError};
use crate::frame_sampler::SourceFrame;

/// 视频基本信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// 容器时长（秒），未知时为 `None`
    pub duration: Option<f64>,
}

/// 视频源：打开视频文件并按顺序解码全部帧
///
/// 解码只向前进行，不做 seek；需要重新分析时必须重新打开。
pub struct VideoSource {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    info: VideoInfo,
}

impl VideoSource {
    /// 打开视频文件，失败时返回 `SourceUnavailable`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let unavailable =
            |reason: &dyn std::fmt::Display| StoryboardError::source_unavailable(&path, reason);

        ffmpeg::init().map_err(|e| unavailable(&format!("初始化 FFmpeg 失败: {}", e)))?;

        // 只显示错误和致命错误
        unsafe {
            ffmpeg::sys::av_log_set_level(ffmpeg::sys::AV_LOG_ERROR as i32);
        }

        let input = ffmpeg::format::input(&path).map_err(|e| unavailable(&e))?;

        let (stream_index, fps, parameters) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| unavailable(&"未找到视频流"))?;

            let rate = stream.avg_frame_rate();
            let fps = if rate.denominator() > 0 && rate.numerator() > 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                30.0 // 默认值
            };
            (stream.index(), fps, stream.parameters())
        };

        let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| unavailable(&format!("无法创建视频解码器: {}", e)))?;

        let duration = match input.duration() {
            d if d > 0 => Some(d as f64 / ffmpeg::ffi::AV_TIME_BASE as f64),
            _ => None,
        };

        let info = VideoInfo {
            fps,
            width: decoder.width(),
            height: decoder.height(),
            duration,
        };
        debug!("🎞️  [视频源] {} -> {:?}", path.display(), info);

        Ok(Self {
            path,
            input,
            stream_index,
            info,
        })
    }

    pub fn info(&self) -> VideoInfo {
        self.info
    }

    /// 开始顺序解码，返回一个惰性的帧迭代器
    pub fn into_frames(self) -> Result<DecodedFrames> {
        let stream = self
            .input
            .stream(self.stream_index)
            .ok_or_else(|| StoryboardError::source_unavailable(&self.path, "视频流已失效"))?;
        let time_base = stream.time_base();
        // 时间戳以流的起始时间为 0 点（MPEG-TS 等容器的首帧 pts 通常不为 0）
        let start_pts = match stream.start_time() {
            ffmpeg::ffi::AV_NOPTS_VALUE => 0,
            start => start,
        };

        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| {
                StoryboardError::source_unavailable(&self.path, format!("无法创建视频解码器: {}", e))
            })?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| StoryboardError::source_unavailable(&self.path, format!("无法创建缩放器: {}", e)))?;

        info!(
            "🚀 [视频源] 开始解码: {} ({}x{}, {:.2} fps, 起始 pts {})",
            self.path.display(),
            self.info.width,
            self.info.height,
            self.info.fps,
            start_pts
        );

        Ok(DecodedFrames {
            input: self.input,
            decoder,
            scaler,
            stream_index: self.stream_index,
            time_base: (time_base.numerator() as f64, time_base.denominator() as f64),
            start_pts,
            fps: self.info.fps,
            frame_number: 0,
            eof_sent: false,
            finished: false,
        })
    }
}

/// 顺序解码得到的全分辨率帧序列
///
/// 单个数据包解码失败时产出一次 `DecodeTruncated`，之后迭代结束。
pub struct DecodedFrames {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: (f64, f64),
    /// 流的起始 pts，换算时间戳时减去
    start_pts: i64,
    fps: f64,
    frame_number: u64,
    eof_sent: bool,
    finished: bool,
}

impl DecodedFrames {
    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<SourceFrame> {
        let timestamp = decoded
            .timestamp()
            .and_then(|pts| pts_to_seconds(pts, self.start_pts, self.time_base))
            .unwrap_or_else(|| self.frame_number as f64 / self.fps);
        self.frame_number += 1;

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .map_err(|e| StoryboardError::DecodeTruncated {
                reason: format!("像素格式转换失败 ({:.3}s): {}", timestamp, e),
            })?;

        Ok(SourceFrame::new(timestamp, frame_to_image(&rgb_frame)?))
    }
}

impl Iterator for DecodedFrames {
    type Item = Result<SourceFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let mut decoded = ffmpeg::frame::Video::empty();
            match classify_receive(self.decoder.receive_frame(&mut decoded), self.frame_number) {
                Receive::Frame => {
                    let frame = self.convert(&decoded);
                    if frame.is_err() {
                        self.finished = true;
                    }
                    return Some(frame);
                }
                Receive::NeedInput => {}
                Receive::Drained => {
                    self.finished = true;
                    return None;
                }
                Receive::Failed(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }

            if self.eof_sent {
                self.finished = true;
                return None;
            }

            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        self.finished = true;
                        return Some(Err(StoryboardError::DecodeTruncated {
                            reason: format!("第 {} 帧之后的数据包解码失败: {}", self.frame_number, e),
                        }));
                    }
                }
                None => {
                    // 冲刷解码器中剩余的帧
                    if let Err(e) = self.decoder.send_eof() {
                        debug!("发送 EOF 失败: {}", e);
                    }
                    self.eof_sent = true;
                }
            }
        }
    }
}

/// pts 换算为相对流起始时间的秒数；早于起始时间的帧记为 0
pub fn pts_to_seconds(pts: i64, start_pts: i64, time_base: (f64, f64)) -> Option<f64> {
    let (num, den) = time_base;
    if den <= 0.0 {
        return None;
    }
    Some((pts.saturating_sub(start_pts) as f64 * num / den).max(0.0))
}

/// `receive_frame` 的结果
#[derive(Debug)]
enum Receive {
    Frame,
    /// 解码器需要更多数据包
    NeedInput,
    /// 已冲刷完毕
    Drained,
    Failed(StoryboardError),
}

fn classify_receive(result: std::result::Result<(), ffmpeg::Error>, frame_number: u64) -> Receive {
    match result {
        Ok(()) => Receive::Frame,
        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
            Receive::NeedInput
        }
        Err(ffmpeg::Error::Eof) => Receive::Drained,
        Err(e) => Receive::Failed(StoryboardError::DecodeTruncated {
            reason: format!("第 {} 帧之后解码失败: {}", frame_number, e),
        }),
    }
}

/// 将 RGB24 格式的 FFmpeg 帧转换为 DynamicImage
fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<DynamicImage> {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_len = width as usize * 3;

    let mut buf = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let row = data.get(start..start + row_len).ok_or_else(|| StoryboardError::DecodeTruncated {
            reason: format!("帧数据不完整: 第 {} 行", y),
        })?;
        buf.extend_from_slice(row);
    }

    RgbImage::from_raw(width, height, buf)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| StoryboardError::DecodeTruncated {
            reason: format!("无法构建 {}x{} 图像", width, height),
        })
}
