//! Tube Vault：自托管的在线视频/音频下载与媒体库服务。
//!
//! 本 crate 负责：配置加载、下载编排（调用 yt-dlp / ffmpeg）、媒体库持久化、
//! 支持 Range 的媒体流服务以及过期文件的后台清理。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/限流/清理等基础设施
//! - `extractor`：外部抓取工具（yt-dlp）的抽象与实现
//! - `download`：下载流程编排（校验、计划、抓取、入库）
//! - `postprocess`：ffmpeg 工具链与元数据/封面写入
//! - `catalog`：SQLite 媒体库
//! - `web`：HTTP 接口

use anyhow::{Context, Result, anyhow};
use clap::Parser;

mod base_system;
mod catalog;
mod download;
mod extractor;
mod postprocess;
mod third_party;
mod web;

use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use catalog::SqliteCatalog;
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "tube-vault")]
#[command(about = "Self-hosted video/audio downloader with a media library")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,

    /// 数据目录路径（用于存放 config.yml、logs 与默认下载目录，方便 Docker 挂载）
    #[arg(long)]
    data_dir: Option<String>,

    /// 监听地址，可用逗号分隔多个；未指定时读取环境变量 TUBE_VAULT_ADDR，再回退到配置文件
    #[arg(long)]
    bind: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("Tube Vault v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.as_ref().map(std::path::Path::new);
    let log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let config = load_or_create::<Config>(data_dir)
        .context("loading config.yml")?
        .with_base_dir(data_dir);

    let layout = config.layout();
    layout
        .ensure()
        .with_context(|| format!("creating storage folders under {}", layout.root.display()))?;
    let catalog = SqliteCatalog::new(config.database_path());
    catalog
        .initialize()
        .context("initialising media catalog")?;
    info!(
        target: "startup",
        root = %layout.root.display(),
        database = %catalog.path().display(),
        "storage ready"
    );

    let result = web::run(config, cli.bind);
    log.safe_exit();
    result
}

fn init_logging(debug: bool, base_dir: Option<&std::path::Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
