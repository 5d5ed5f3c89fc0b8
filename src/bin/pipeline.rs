// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 交互式流水线入口: cargo run --bin pipeline -- --base-dir ./work

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use yolo_pipeline::config::DEFAULT_CONFIG_FILE;
use yolo_pipeline::menu::print_menu;
use yolo_pipeline::train::UltralyticsCli;
use yolo_pipeline::video::FfmpegBackend;
use yolo_pipeline::{MenuAction, Pipeline, PipelineConfig};

/// 数据处理与训练流水线
#[derive(Parser, Debug)]
#[command(author, version, about = "YOLO 数据处理与训练流水线", long_about = None)]
struct Args {
    /// 工作目录 (视频、帧、标注、实验都相对于此目录)
    #[arg(short, long, default_value = ".")]
    base_dir: PathBuf,

    /// 配置文件, 默认 <base-dir>/pipeline.json
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let args = Args::parse();
    let base = args.base_dir;
    let config_path = args
        .config
        .unwrap_or_else(|| base.join(DEFAULT_CONFIG_FILE));

    let config = PipelineConfig::load(&config_path);
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
    config.print_summary(&base);

    let backend = FfmpegBackend::new(config.inference.video_codec.clone());
    let engine = UltralyticsCli::new(config.training.program.clone());
    let mut pipeline = Pipeline::new(config, base, Box::new(backend), Box::new(engine));

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print_menu();
        print!("请选择操作 (0-11): ");
        io::stdout().flush().context("flush stdout")?;

        let Some(line) = lines.next() else {
            // stdin 关闭
            println!();
            break;
        };
        let line = line.context("read menu input")?;

        let Some(action) = MenuAction::from_input(&line) else {
            println!("⚠️  无效选择, 请输入 0 到 11 之间的数字。");
            continue;
        };
        if action == MenuAction::Exit {
            println!("👋 退出程序。");
            break;
        }

        println!("\n▶️  {}", action);
        match pipeline.run(action) {
            Ok(summary) => println!("✅ {}", summary),
            Err(e) => println!("❌ {} 失败: {}", action.label(), e),
        }
    }

    Ok(())
}
