// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 把一帧的标注复制到同一视频的后续帧:
// cargo run --bin propagate -- --dir annotations --base video6_frame_01809.txt --end 2157

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use yolo_pipeline::sync::propagate_annotation;

/// 标注复制工具
#[derive(Parser, Debug)]
#[command(author, version, about = "把一帧的标注复制到后续帧", long_about = None)]
struct Args {
    /// 标注目录
    #[arg(short, long, default_value = "annotations")]
    dir: PathBuf,

    /// 源标注文件名, 例如 video6_frame_01809.txt
    #[arg(short, long)]
    base: String,

    /// 最后一帧的序号 (包含)
    #[arg(short, long)]
    end: usize,

    /// 帧间隔, 与抽帧间隔一致
    #[arg(short, long, default_value_t = 3)]
    interval: usize,
}

fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let args = Args::parse();
    let written = propagate_annotation(&args.dir, &args.base, args.end, args.interval)
        .with_context(|| format!("propagate {} in {}", args.base, args.dir.display()))?;

    println!("✅ 已写入 {} 个标注文件", written.len());
    if let (Some(first), Some(last)) = (written.first(), written.last()) {
        println!("   {} ... {}", first.display(), last.display());
    }
    Ok(())
}
