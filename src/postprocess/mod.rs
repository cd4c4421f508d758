//! 下载后处理：ffmpeg 工具链与元数据写入。

pub mod tagging;
pub mod toolchain;

pub use tagging::{MetadataEmbedder, TagSet};
pub use toolchain::{FFMPEG_REMEDIATION, Ffmpeg, Transcoder};
