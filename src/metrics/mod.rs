// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 训练指标: 读取各实验的 results.csv, 绘制曲线, 生成文本报告

pub mod chart;

use ab_glyph::FontVec;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::MetricsConfig;
use crate::error::{IoContext, PipelineError, Result};
use crate::report::{BatchReport, Diagnostic, DiagnosticKind};
use chart::{color, render_grid, LineStyle, Panel, Series};

pub const RESULTS_FILE: &str = "results.csv";
pub const REPORT_FILE: &str = "metrics_report.txt";

const COL_EPOCH: &str = "epoch";
const COL_TRAIN_LOSS: &str = "train/box_loss";
const COL_VAL_LOSS: &str = "val/box_loss";
const COL_MAP50: &str = "metrics/mAP50(B)";
const COL_MAP50_95: &str = "metrics/mAP50-95(B)";
const COL_PRECISION: &str = "metrics/precision(B)";
const COL_RECALL: &str = "metrics/recall(B)";

pub fn f1_score(precision: f64, recall: f64) -> f64 {
    2.0 * precision * recall / (precision + recall + 1e-10)
}

/// 一个实验的逐轮指标, 各列长度相同
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExperimentMetrics {
    pub name: String,
    pub epochs: Vec<f64>,
    pub train_loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub map50: Vec<f64>,
    pub map50_95: Vec<f64>,
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
}

impl ExperimentMetrics {
    pub fn f1(&self) -> Vec<f64> {
        self.precision
            .iter()
            .zip(&self.recall)
            .map(|(&p, &r)| f1_score(p, r))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// 从 results.csv 读取; 表头两端空格忽略, 缺失列补零, 无法解析的单元格按 0
    pub fn from_csv(name: &str, path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        let column = |key: &str| headers.iter().position(|h| h == key);

        let idx_epoch = column(COL_EPOCH);
        let columns = [
            column(COL_TRAIN_LOSS),
            column(COL_VAL_LOSS),
            column(COL_MAP50),
            column(COL_MAP50_95),
            column(COL_PRECISION),
            column(COL_RECALL),
        ];

        let mut metrics = Self {
            name: name.to_string(),
            ..Default::default()
        };
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let cell = |idx: Option<usize>| -> f64 {
                idx.and_then(|i| record.get(i))
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(0.0)
            };
            metrics.epochs.push(match idx_epoch {
                Some(_) => cell(idx_epoch),
                None => row as f64,
            });
            metrics.train_loss.push(cell(columns[0]));
            metrics.val_loss.push(cell(columns[1]));
            metrics.map50.push(cell(columns[2]));
            metrics.map50_95.push(cell(columns[3]));
            metrics.precision.push(cell(columns[4]));
            metrics.recall.push(cell(columns[5]));
        }
        Ok(metrics)
    }
}

#[derive(Debug, Default)]
pub struct ExperimentSet {
    pub experiments: Vec<ExperimentMetrics>,
    pub report: BatchReport,
}

/// 扫描 `base_dir` 下的实验目录 (名称含 `weights` 的除外), 按名称排序
///
/// 没有任何实验带 results.csv 时返回 [`PipelineError::NoExperimentData`]。
pub fn collect_experiments(base_dir: &Path, filter: Option<&[String]>) -> Result<ExperimentSet> {
    scan_experiments(base_dir, filter, None)
}

fn scan_experiments(
    base_dir: &Path,
    filter: Option<&[String]>,
    exclude: Option<&Path>,
) -> Result<ExperimentSet> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(base_dir).at(base_dir)? {
        let path = entry.at(base_dir)?.path();
        if !path.is_dir() || exclude.map(|e| same_path(e, &path)).unwrap_or(false) {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !name.contains("weights") {
            dirs.push(path);
        }
    }
    dirs.sort();

    let mut set = ExperimentSet::default();
    for dir in dirs {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let results = dir.join(RESULTS_FILE);
        if !results.is_file() {
            set.report.skip(Diagnostic::new(
                DiagnosticKind::MissingResults,
                &results,
                format!("experiment '{}' has no {}", name, RESULTS_FILE),
            ));
            continue;
        }
        match ExperimentMetrics::from_csv(&name, &results) {
            Ok(metrics) => {
                log::info!("📈 读取实验: {} ({} 轮)", name, metrics.len());
                set.experiments.push(metrics);
                set.report.succeed();
            }
            Err(e) => set.report.skip(Diagnostic::new(
                DiagnosticKind::UnreadableResults,
                &results,
                e.to_string(),
            )),
        }
    }

    if set.experiments.is_empty() {
        return Err(PipelineError::NoExperimentData(base_dir.to_path_buf()));
    }
    if let Some(keep) = filter {
        set.experiments.retain(|e| keep.contains(&e.name));
        if set.experiments.is_empty() {
            log::warn!("筛选后没有剩余实验: {:?}", keep);
            return Err(PipelineError::NoExperimentData(base_dir.to_path_buf()));
        }
    }
    Ok(set)
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[derive(Debug, Default)]
pub struct MetricsOutcome {
    pub experiments: Vec<String>,
    pub charts: Vec<PathBuf>,
    pub report_file: Option<PathBuf>,
    pub report: BatchReport,
}

/// 读取实验并在 `output_dir` 生成四张图表和 (可选) 文本报告
pub fn plot_metrics(
    base_dir: &Path,
    output_dir: &Path,
    config: &MetricsConfig,
    font: Option<&FontVec>,
) -> Result<MetricsOutcome> {
    let set = scan_experiments(base_dir, config.compare.as_deref(), Some(output_dir))?;
    fs::create_dir_all(output_dir).at(output_dir)?;
    if font.is_none() {
        log::warn!("⚠️ 没有可用字体, 图表中不绘制文字");
    }

    let mut outcome = MetricsOutcome {
        experiments: set.experiments.iter().map(|e| e.name.clone()).collect(),
        report: set.report,
        ..Default::default()
    };

    let experiments = &set.experiments;
    let charts: [(&str, Vec<Panel>, (u32, u32), (u32, u32)); 4] = [
        ("loss_curves.png", vec![loss_panel(experiments)], (1, 1), (1200, 600)),
        ("map_metrics.png", vec![map_panel(experiments)], (1, 1), (1200, 600)),
        ("precision_recall_f1.png", prf_panels(experiments), (3, 1), (600, 600)),
        ("experiments_comparison.png", comparison_panels(experiments), (2, 2), (750, 600)),
    ];

    for (file, panels, (cols, rows), size) in charts {
        let img = render_grid(&panels, cols, rows, size, font);
        let path = output_dir.join(file);
        img.save(&path).map_err(|e| PipelineError::image(&path, e))?;
        log::info!("✓ 图表已保存: {}", file);
        outcome.charts.push(path);
    }

    if config.write_report {
        let path = output_dir.join(REPORT_FILE);
        fs::write(&path, metrics_report(experiments)).at(&path)?;
        log::info!("✓ 报告已保存: {}", REPORT_FILE);
        outcome.report_file = Some(path);
    }

    Ok(outcome)
}

fn loss_panel(experiments: &[ExperimentMetrics]) -> Panel {
    let mut panel = Panel::new("Training and Validation Loss", "Epoch", "Loss");
    for (i, e) in experiments.iter().enumerate() {
        panel.series.push(Series::new(
            format!("Train Loss ({})", e.name),
            color(i),
            &e.epochs,
            &e.train_loss,
        ));
        panel.series.push(
            Series::new(format!("Val Loss ({})", e.name), color(i), &e.epochs, &e.val_loss)
                .style(LineStyle::Dashed),
        );
    }
    panel
}

fn map_panel(experiments: &[ExperimentMetrics]) -> Panel {
    let mut panel = Panel::new("Mean Average Precision (mAP)", "Epoch", "mAP").y_range(0.0, 1.0);
    for (i, e) in experiments.iter().enumerate() {
        panel.series.push(
            Series::new(format!("mAP@50 ({})", e.name), color(i), &e.epochs, &e.map50).width(2),
        );
        panel.series.push(
            Series::new(format!("mAP@50-95 ({})", e.name), color(i), &e.epochs, &e.map50_95)
                .style(LineStyle::Dotted)
                .width(2),
        );
    }
    panel
}

/// 每个实验一条曲线的子图
fn per_experiment_panel(
    experiments: &[ExperimentMetrics],
    title: &str,
    y_label: &str,
    values: impl Fn(&ExperimentMetrics) -> Vec<f64>,
) -> Panel {
    let mut panel = Panel::new(title, "Epoch", y_label);
    for (i, e) in experiments.iter().enumerate() {
        panel
            .series
            .push(Series::new(e.name.as_str(), color(i), &e.epochs, &values(e)).width(2));
    }
    panel
}

fn prf_panels(experiments: &[ExperimentMetrics]) -> Vec<Panel> {
    vec![
        per_experiment_panel(experiments, "Precision", "Precision", |e| e.precision.clone())
            .y_range(0.0, 1.0),
        per_experiment_panel(experiments, "Recall", "Recall", |e| e.recall.clone())
            .y_range(0.0, 1.0),
        per_experiment_panel(experiments, "F1-Score", "F1-Score", ExperimentMetrics::f1)
            .y_range(0.0, 1.0),
    ]
}

fn comparison_panels(experiments: &[ExperimentMetrics]) -> Vec<Panel> {
    vec![
        per_experiment_panel(experiments, "mAP@50 Comparison", "mAP@50", |e| e.map50.clone()),
        per_experiment_panel(experiments, "Precision Comparison", "Precision", |e| {
            e.precision.clone()
        }),
        per_experiment_panel(experiments, "Recall Comparison", "Recall", |e| e.recall.clone()),
        per_experiment_panel(experiments, "Validation Loss Comparison", "Val Loss", |e| {
            e.val_loss.clone()
        }),
    ]
}

/// 文本报告: 每个实验最后一轮的指标, 保留四位小数
pub fn metrics_report(experiments: &[ExperimentMetrics]) -> String {
    let mut out = String::new();
    if write_report(&mut out, experiments).is_err() {
        log::warn!("报告生成失败");
    }
    out
}

fn write_report(out: &mut String, experiments: &[ExperimentMetrics]) -> fmt::Result {
    writeln!(out, "YOLO METRICS REPORT")?;
    writeln!(out, "Generated: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "{}\n", "=".repeat(50))?;

    let last = |v: &[f64]| v.last().copied().unwrap_or(0.0);
    for e in experiments {
        writeln!(out, "Experiment: {}", e.name)?;
        writeln!(out, "{}", "-".repeat(30))?;
        if e.is_empty() {
            writeln!(out, "(no epochs recorded)\n")?;
            continue;
        }
        let (p, r) = (last(&e.precision), last(&e.recall));
        writeln!(out, "Final epoch: {}", last(&e.epochs))?;
        writeln!(out, "mAP@50: {:.4}", last(&e.map50))?;
        writeln!(out, "mAP@50-95: {:.4}", last(&e.map50_95))?;
        writeln!(out, "Precision: {:.4}", p)?;
        writeln!(out, "Recall: {:.4}", r)?;
        writeln!(out, "F1-Score: {:.4}\n", f1_score(p, r))?;
    }
    Ok(())
}
