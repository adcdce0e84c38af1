use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, StoryboardError};

/// 默认分析步长（每 2 帧取 1 帧）
pub const DEFAULT_ANALYSIS_STRIDE: usize = 2;
/// 默认分析分辨率
pub const DEFAULT_ANALYSIS_RESOLUTION: Resolution = Resolution::new(640, 360);
/// 默认像素变化阈值（8 位灰度）
pub const DEFAULT_PIXEL_CHANGE_DELTA: u8 = 30;
/// 默认场景变化比例阈值
pub const DEFAULT_THRESHOLD: f64 = 0.01;
/// 默认最小场景持续时间（秒）
pub const DEFAULT_MIN_SCENE_DURATION: f64 = 1.0;
pub const DEFAULT_LOG_LEVEL: &str = "info";

const SECTION: &str = "storyboard";
const FALLBACK_SECTION: &str = "DEFAULT";

/// 分析分辨率（宽 x 高）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        DEFAULT_ANALYSIS_RESOLUTION
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = StoryboardError;

    fn from_str(s: &str) -> Result<Self> {
        let (width, height) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| StoryboardError::InvalidConfig(format!("分辨率格式应为 WIDTHxHEIGHT: {}", s)))?;

        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| StoryboardError::InvalidConfig(format!("分辨率数值无效: {}", s)))
        };

        Ok(Self::new(parse(width)?, parse(height)?))
    }
}

/// 场景检测参数
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    /// 分析步长：每 `analysis_stride` 帧取一帧用于比较
    pub analysis_stride: usize,
    /// 分析帧缩放后的分辨率
    pub analysis_resolution: Resolution,
    /// 像素灰度差超过该值才计为“变化”
    pub pixel_change_delta: u8,
    /// 变化像素比例严格大于该值才触发新场景 (0.0-1.0)
    pub threshold: f64,
    /// 两个场景边界之间的最小间隔（秒）
    pub min_scene_duration: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            analysis_stride: DEFAULT_ANALYSIS_STRIDE,
            analysis_resolution: DEFAULT_ANALYSIS_RESOLUTION,
            pixel_change_delta: DEFAULT_PIXEL_CHANGE_DELTA,
            threshold: DEFAULT_THRESHOLD,
            min_scene_duration: DEFAULT_MIN_SCENE_DURATION,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.analysis_stride == 0 {
            return Err(StoryboardError::InvalidConfig("analysis_stride 必须 >= 1".into()));
        }
        if self.analysis_resolution.width == 0 || self.analysis_resolution.height == 0 {
            return Err(StoryboardError::InvalidConfig(format!(
                "analysis_resolution 必须大于 0: {}",
                self.analysis_resolution
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(StoryboardError::InvalidConfig(format!(
                "threshold 必须在 0.0-1.0 之间: {}",
                self.threshold
            )));
        }
        if !self.min_scene_duration.is_finite() || self.min_scene_duration < 0.0 {
            return Err(StoryboardError::InvalidConfig(format!(
                "min_scene_duration 必须为非负数: {}",
                self.min_scene_duration
            )));
        }
        Ok(())
    }
}

/// 故事板生成配置
#[derive(Debug, Clone)]
pub struct StoryboardConfig {
    pub detection: DetectionConfig,
    /// 是否为每个场景切出对应的音频片段
    pub scene_audio: bool,
    /// Webhook URL（处理完成后回调）
    pub webhook_url: Option<String>,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
}

impl Default for StoryboardConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            scene_audio: false,
            webhook_url: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// 单个配置来源中出现的值，未出现的字段为 `None`
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub analysis_stride: Option<usize>,
    pub analysis_resolution: Option<Resolution>,
    pub pixel_change_delta: Option<u8>,
    pub threshold: Option<f64>,
    pub min_scene_duration: Option<f64>,
    pub scene_audio: Option<bool>,
    pub webhook_url: Option<String>,
    pub log_level: Option<String>,
}

impl ConfigOverrides {
    /// 用优先级更低的来源补齐缺失字段
    pub fn or(self, lower: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            analysis_stride: self.analysis_stride.or(lower.analysis_stride),
            analysis_resolution: self.analysis_resolution.or(lower.analysis_resolution),
            pixel_change_delta: self.pixel_change_delta.or(lower.pixel_change_delta),
            threshold: self.threshold.or(lower.threshold),
            min_scene_duration: self.min_scene_duration.or(lower.min_scene_duration),
            scene_audio: self.scene_audio.or(lower.scene_audio),
            webhook_url: self.webhook_url.or(lower.webhook_url),
            log_level: self.log_level.or(lower.log_level),
        }
    }

    /// 填充默认值并校验
    pub fn resolve(self) -> Result<StoryboardConfig> {
        let detection = DetectionConfig {
            analysis_stride: self.analysis_stride.unwrap_or(DEFAULT_ANALYSIS_STRIDE),
            analysis_resolution: self.analysis_resolution.unwrap_or(DEFAULT_ANALYSIS_RESOLUTION),
            pixel_change_delta: self.pixel_change_delta.unwrap_or(DEFAULT_PIXEL_CHANGE_DELTA),
            threshold: self.threshold.unwrap_or(DEFAULT_THRESHOLD),
            min_scene_duration: self.min_scene_duration.unwrap_or(DEFAULT_MIN_SCENE_DURATION),
        };
        detection.validate()?;

        Ok(StoryboardConfig {
            detection,
            scene_audio: self.scene_audio.unwrap_or(false),
            webhook_url: self.webhook_url.filter(|v| !v.is_empty()),
            log_level: self.log_level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn load_config(
        config_file: Option<&Path>,
        cli: ConfigOverrides,
    ) -> Result<StoryboardConfig> {
        // 显式指定的配置文件必须能读取；默认位置找不到则忽略
        let file_config = match config_file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_from_default_locations().unwrap_or_default(),
        };

        cli.or(Self::load_from_env()).or(file_config).resolve()
    }

    /// 从环境变量加载配置
    fn load_from_env() -> ConfigOverrides {
        ConfigOverrides {
            analysis_stride: env_value("STORYBOARD_ANALYSIS_STRIDE"),
            analysis_resolution: env_value("STORYBOARD_ANALYSIS_RESOLUTION"),
            pixel_change_delta: env_value("STORYBOARD_PIXEL_CHANGE_DELTA"),
            threshold: env_value("STORYBOARD_THRESHOLD"),
            min_scene_duration: env_value("STORYBOARD_MIN_SCENE_DURATION"),
            scene_audio: env::var("STORYBOARD_SCENE_AUDIO").ok().and_then(|v| parse_bool(&v)),
            webhook_url: env::var("STORYBOARD_WEBHOOK_URL").ok(),
            log_level: env::var("STORYBOARD_LOG_LEVEL").ok(),
        }
    }

    /// 从 INI 配置文件加载配置
    pub fn load_from_file(config_path: &Path) -> Result<ConfigOverrides> {
        if !config_path.exists() {
            return Err(StoryboardError::InvalidConfig(format!(
                "配置文件不存在: {}",
                config_path.display()
            )));
        }

        let mut ini = configparser::ini::Ini::new();
        ini.load(config_path).map_err(|e| {
            StoryboardError::InvalidConfig(format!("读取配置文件失败: {}: {}", config_path.display(), e))
        })?;

        // 先读 [storyboard] 节，没有则使用 [DEFAULT] 节
        let get = |key: &str| {
            ini.get(SECTION, key)
                .or_else(|| ini.get(FALLBACK_SECTION, key))
                .filter(|v| !v.trim().is_empty())
        };

        let analysis_resolution = match get("analysis_resolution") {
            Some(v) => Some(v.parse::<Resolution>()?),
            None => None,
        };

        Ok(ConfigOverrides {
            analysis_stride: get("analysis_stride").and_then(|v| v.trim().parse().ok()),
            analysis_resolution,
            pixel_change_delta: get("pixel_change_delta").and_then(|v| v.trim().parse().ok()),
            threshold: get("threshold").and_then(|v| v.trim().parse().ok()),
            min_scene_duration: get("min_scene_duration").and_then(|v| v.trim().parse().ok()),
            scene_audio: get("scene_audio").and_then(|v| parse_bool(&v)),
            webhook_url: get("webhook_url"),
            log_level: ini
                .get("logging", "level")
                .or_else(|| ini.get(FALLBACK_SECTION, "log_level"))
                .filter(|v| !v.trim().is_empty()),
        })
    }

    /// 从默认位置加载配置文件
    fn load_from_default_locations() -> Option<ConfigOverrides> {
        let mut candidates = vec![
            PathBuf::from("storyboard.ini"),
            PathBuf::from(".storyboard.ini"),
        ];
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".storyboard.ini"));
        }
        candidates.push(PathBuf::from("/etc/storyboard.ini"));

        candidates
            .iter()
            .find(|path| path.exists())
            .and_then(|path| Self::load_from_file(path).ok())
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let mut ini = configparser::ini::Ini::new();
        ini.set(SECTION, "analysis_stride", Some(DEFAULT_ANALYSIS_STRIDE.to_string()));
        ini.set(SECTION, "analysis_resolution", Some(DEFAULT_ANALYSIS_RESOLUTION.to_string()));
        ini.set(SECTION, "pixel_change_delta", Some(DEFAULT_PIXEL_CHANGE_DELTA.to_string()));
        ini.set(SECTION, "threshold", Some(DEFAULT_THRESHOLD.to_string()));
        ini.set(SECTION, "min_scene_duration", Some(DEFAULT_MIN_SCENE_DURATION.to_string()));
        ini.set(SECTION, "scene_audio", Some("false".to_string()));
        ini.set(SECTION, "webhook_url", Some(String::new()));
        ini.set("logging", "level", Some(DEFAULT_LOG_LEVEL.to_string()));

        ini.write(config_path)?;
        Ok(())
    }
}

fn env_value<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
