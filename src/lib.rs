pub mod error;
pub mod config;
pub mod video_processor;
pub mod frame_sampler;
pub mod scene_detector;
pub mod timeline;
pub mod caption_aligner;
pub mod captions;
pub mod audio_extractor;
pub mod render;
pub mod metadata;
pub mod processor;

pub use error::{Result, StoryboardError};
pub use config::{ConfigLoader, ConfigOverrides, DetectionConfig, Resolution, StoryboardConfig};
pub use video_processor::{VideoInfo, VideoSource};
pub use frame_sampler::{AnalysisSample, FrameSampler, SourceFrame};
pub use scene_detector::{SceneBoundary, SceneDetector};
pub use timeline::{assemble_timeline, Scene};
pub use caption_aligner::{align_captions, CaptionCue};
pub use captions::{load_captions, parse_captions};
pub use audio_extractor::AudioExtractor;
pub use metadata::{SceneMetadata, StoryboardMetadata};
pub use processor::{
    build_scenes, generate_storyboard, segment, SceneBuild, Segmentation, StoryboardOutput,
};
