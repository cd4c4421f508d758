//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息，以及由配置推导出的存储目录布局。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 服务配置
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    // 存储配置
    #[serde(default)]
    pub download_dir: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,

    // 外部工具
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    // 转码配置
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,
    #[serde(default = "default_video_container")]
    pub video_container: String,
    #[serde(default = "default_metadata_album")]
    pub metadata_album: String,
    #[serde(default = "default_thumbnail_fetch_timeout_secs")]
    pub thumbnail_fetch_timeout_secs: u64,

    // 限流
    #[serde(default = "default_download_rate_limit")]
    pub download_rate_limit: usize,
    #[serde(default = "default_download_rate_window_secs")]
    pub download_rate_window_secs: u64,

    // 自动清理
    #[serde(default = "default_max_file_age_hours")]
    pub max_file_age_hours: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            download_dir: String::new(),
            database_file: default_database_file(),
            ytdlp_path: default_ytdlp_path(),
            ffmpeg_path: default_ffmpeg_path(),
            audio_codec: default_audio_codec(),
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
            video_container: default_video_container(),
            metadata_album: default_metadata_album(),
            thumbnail_fetch_timeout_secs: default_thumbnail_fetch_timeout_secs(),
            download_rate_limit: default_download_rate_limit(),
            download_rate_window_secs: default_download_rate_window_secs(),
            max_file_age_hours: default_max_file_age_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
            base_dir: None,
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 14] = [
            FieldMeta {
                name: "bind_addr",
                description: "监听地址，多个地址用逗号分隔，例如 0.0.0.0:5000,[::]:5000",
            },
            FieldMeta {
                name: "download_dir",
                description: "媒体存储根目录（留空则使用数据目录下的 downloads）",
            },
            FieldMeta {
                name: "database_file",
                description: "媒体库数据库文件名（相对于存储根目录）",
            },
            FieldMeta {
                name: "ytdlp_path",
                description: "yt-dlp 可执行文件路径",
            },
            FieldMeta {
                name: "ffmpeg_path",
                description: "ffmpeg 可执行文件路径",
            },
            FieldMeta {
                name: "audio_codec",
                description: "音频输出格式",
            },
            FieldMeta {
                name: "audio_bitrate_kbps",
                description: "音频转码码率（kbps）",
            },
            FieldMeta {
                name: "video_container",
                description: "视频合并容器格式",
            },
            FieldMeta {
                name: "metadata_album",
                description: "写入音频标签的专辑名",
            },
            FieldMeta {
                name: "thumbnail_fetch_timeout_secs",
                description: "远程封面下载超时时间（秒）",
            },
            FieldMeta {
                name: "download_rate_limit",
                description: "下载接口在一个窗口内允许的最大请求数",
            },
            FieldMeta {
                name: "download_rate_window_secs",
                description: "下载接口限流窗口（秒）",
            },
            FieldMeta {
                name: "max_file_age_hours",
                description: "媒体文件最长保留时间（小时），超过后由后台任务删除",
            },
            FieldMeta {
                name: "sweep_interval_secs",
                description: "后台清理任务的执行间隔（秒）",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), String> {
        if self.audio_bitrate_kbps == 0 {
            return Err("audio_bitrate_kbps must be greater than 0".to_string());
        }
        if self.download_rate_limit == 0 {
            return Err("download_rate_limit must be greater than 0".to_string());
        }
        if self.download_rate_window_secs == 0 {
            return Err("download_rate_window_secs must be greater than 0".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be greater than 0".to_string());
        }
        if self.audio_codec.trim().is_empty() {
            return Err("audio_codec must not be empty".to_string());
        }
        if self.video_container.trim().is_empty() {
            return Err("video_container must not be empty".to_string());
        }
        Ok(())
    }
}

impl Config {
    /// Remember the data directory the config was loaded from; relative
    /// storage paths are resolved against it.
    pub fn with_base_dir(mut self, base: Option<&Path>) -> Self {
        self.base_dir = base.map(Path::to_path_buf);
        self
    }

    /// Always absolute: catalog records store full paths and must keep
    /// resolving if the working directory changes.
    pub fn storage_root(&self) -> PathBuf {
        let base = self.base_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let raw = self.download_dir.trim();
        let root = if raw.is_empty() {
            base.join("downloads")
        } else {
            let p = PathBuf::from(raw);
            if p.is_absolute() { p } else { base.join(p) }
        };
        std::path::absolute(&root).unwrap_or(root)
    }

    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(self.storage_root())
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage_root().join(&self.database_file)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.download_rate_window_secs)
    }

    pub fn max_file_age(&self) -> Duration {
        Duration::from_secs(self.max_file_age_hours.saturating_mul(3600))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// 存储目录布局：音频、视频、临时文件与封面各自独立。
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub root: PathBuf,
    pub audio: PathBuf,
    pub video: PathBuf,
    pub temp: PathBuf,
    pub thumbnails: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            audio: root.join("audio"),
            video: root.join("video"),
            temp: root.join("temp"),
            thumbnails: root.join("thumbnails"),
            root,
        }
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [
            &self.root,
            &self.audio,
            &self.video,
            &self.temp,
            &self.thumbnails,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// 由后台清理任务按文件年龄扫描的目录。
    pub fn retention_dirs(&self) -> Vec<PathBuf> {
        vec![self.audio.clone(), self.video.clone(), self.temp.clone()]
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_database_file() -> String {
    "media.db".to_string()
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_audio_codec() -> String {
    "mp3".to_string()
}

fn default_audio_bitrate_kbps() -> u32 {
    192
}

fn default_video_container() -> String {
    "mp4".to_string()
}

fn default_metadata_album() -> String {
    "YouTube Download".to_string()
}

fn default_thumbnail_fetch_timeout_secs() -> u64 {
    15
}

fn default_download_rate_limit() -> usize {
    3
}

fn default_download_rate_window_secs() -> u64 {
    60
}

fn default_max_file_age_hours() -> u64 {
    24
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_root_defaults_under_data_dir() {
        let cfg = Config::default().with_base_dir(Some(Path::new("/srv/vault")));
        assert_eq!(cfg.storage_root(), PathBuf::from("/srv/vault/downloads"));
        assert_eq!(
            cfg.database_path(),
            PathBuf::from("/srv/vault/downloads/media.db")
        );
    }

    #[test]
    fn relative_roots_are_made_absolute() {
        let cfg = Config::default();
        let root = cfg.storage_root();
        assert!(root.is_absolute());
        assert!(root.ends_with("downloads"));
        assert!(cfg.layout().audio.is_absolute());

        let cfg = Config {
            download_dir: "media".to_string(),
            ..Config::default()
        }
        .with_base_dir(Some(Path::new("data")));
        assert!(cfg.storage_root().is_absolute());
        assert!(cfg.database_path().ends_with("data/media/media.db"));
    }

    #[test]
    fn absolute_download_dir_wins() {
        let cfg = Config {
            download_dir: "/mnt/media".to_string(),
            ..Config::default()
        }
        .with_base_dir(Some(Path::new("/srv/vault")));
        assert_eq!(cfg.storage_root(), PathBuf::from("/mnt/media"));
        assert_eq!(cfg.layout().audio, PathBuf::from("/mnt/media/audio"));
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(Config::default().validate().is_ok());
        let bad = Config {
            download_rate_limit: 0,
            ..Config::default()
        };
        assert!(bad.validate().is_err());
    }
}
