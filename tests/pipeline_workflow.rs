// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 端到端流程: 内存视频后端 + 记录型训练引擎 + 固定输出的检测器

use image::{Rgb, RgbImage};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use yolo_pipeline::config::AugmentConfig;
use yolo_pipeline::dataset::{DatasetManifest, Subset, MANIFEST_FILE};
use yolo_pipeline::detection::{Bbox, Detector};
use yolo_pipeline::train::{TrainRequest, TrainingEngine, TrainingRun};
use yolo_pipeline::video::{MemoryBackend, VideoInfo};
use yolo_pipeline::{MenuAction, Pipeline, PipelineConfig, PipelineError, Result};

const W: u32 = 32;
const H: u32 = 24;

#[derive(Clone, Default)]
struct RecordingEngine {
    requests: Rc<RefCell<Vec<TrainRequest>>>,
}

impl TrainingEngine for RecordingEngine {
    fn train(&mut self, request: &TrainRequest) -> Result<TrainingRun> {
        self.requests.borrow_mut().push(request.clone());
        Ok(TrainingRun {
            command: format!("yolo {}", request.to_args().join(" ")),
            exit_code: Some(0),
            run_dir: request.project.join(&request.name),
        })
    }
}

struct CenterDetector {
    names: Vec<String>,
}

impl Detector for CenterDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Bbox>> {
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        Ok(vec![Bbox::new(w / 4.0, h / 4.0, w / 2.0, h / 2.0, 0, 0.9)])
    }

    fn names(&self) -> &[String] {
        &self.names
    }
}

fn video_frames(n: usize, shade: u8) -> Vec<RgbImage> {
    (0..n)
        .map(|i| RgbImage::from_pixel(W, H, Rgb([shade, (i * 20) as u8, 100])))
        .collect()
}

struct Fixture {
    _dir: tempfile::TempDir,
    base: PathBuf,
    backend: MemoryBackend,
    engine: RecordingEngine,
    pipeline: Pipeline,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_path_buf();

    let mut config = PipelineConfig::default();
    config.paths.videos = (1..=3)
        .map(|i| PathBuf::from(format!("videos/video{}.mov", i)))
        .collect();
    config.augmentation = AugmentConfig {
        seed: Some(42),
        ..AugmentConfig::disabled()
    };
    config.fonts.clear();

    let backend = MemoryBackend::new();
    let info = VideoInfo {
        width: W,
        height: H,
        fps: 30.0,
    };
    for (i, video) in config.paths.videos.iter().enumerate() {
        backend.insert(base.join(video), info, video_frames(10, 60 * i as u8));
    }

    let engine = RecordingEngine::default();
    let detector = CenterDetector {
        names: config.classes.clone(),
    };
    let pipeline = Pipeline::new(
        config,
        &base,
        Box::new(backend.clone()),
        Box::new(engine.clone()),
    )
    .with_detector(Box::new(detector));

    Fixture {
        _dir: dir,
        base,
        backend,
        engine,
        pipeline,
    }
}

fn count_files(dir: &Path, ext: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == ext).unwrap_or(false))
        .count()
}

#[test]
fn extract_three_videos_every_third_frame() {
    let mut fx = fixture();
    fx.pipeline.run(MenuAction::ExtractFrames).unwrap();

    let frames = fx.base.join("frames");
    assert_eq!(count_files(&frames, "jpg"), 12);
    for index in [0, 3, 6, 9] {
        assert!(frames.join(format!("video2_frame_{:05}.jpg", index)).exists());
    }
    assert!(!frames.join("video2_frame_00001.jpg").exists());
}

#[test]
fn sync_augment_split_train() {
    let mut fx = fixture();
    fx.pipeline.run(MenuAction::ExtractFrames).unwrap();

    // 只给 video1 的帧标注
    let annotations = fx.base.join("annotations");
    fs::create_dir_all(&annotations).unwrap();
    for index in [0, 3, 6, 9] {
        fs::write(
            annotations.join(format!("video1_frame_{:05}.txt", index)),
            "2 0.500000 0.500000 0.250000 0.250000\n",
        )
        .unwrap();
    }

    let summary = fx.pipeline.run(MenuAction::SyncAnnotations).unwrap();
    assert!(summary.contains('8'), "{}", summary);
    let synced = fx.base.join("annotations/dataset/train/labels");
    assert_eq!(count_files(&synced, "txt"), 4);

    fx.pipeline.run(MenuAction::Augment).unwrap();
    let aug_images = fx.base.join("annotations/augmented/images");
    let aug_labels = fx.base.join("annotations/augmented/labels");
    assert_eq!(count_files(&aug_images, "jpg"), 12);
    assert_eq!(count_files(&aug_labels, "txt"), 12);

    // 所有变换关闭时标注保持不变
    let label = fs::read_to_string(aug_labels.join("aug_video1_frame_00003.txt")).unwrap();
    assert_eq!(label.trim(), "2 0.500000 0.500000 0.250000 0.250000");
    let empty = fs::read_to_string(aug_labels.join("aug_video3_frame_00003.txt")).unwrap();
    assert!(empty.is_empty());

    fx.pipeline.run(MenuAction::BuildDataset).unwrap();
    let dataset = fx.base.join("annotations/dataset");
    let manifest = DatasetManifest::load(&dataset.join(MANIFEST_FILE)).unwrap();
    assert_eq!(manifest.nc, 11);
    let total: usize = Subset::ALL
        .iter()
        .map(|s| count_files(&dataset.join(s.name()).join("images"), "jpg"))
        .sum();
    assert_eq!(total, 12);

    fx.pipeline.run(MenuAction::TrainBaseline).unwrap();
    fx.pipeline.run(MenuAction::Optimize(3)).unwrap();

    let requests = fx.engine.requests.borrow();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].model, "yolo11s.pt");
    assert_eq!(requests[0].name, "baseline");
    assert_eq!(requests[0].manifest, dataset.join(MANIFEST_FILE));
    assert_eq!(requests[1].name, "optimized");
    assert_eq!(requests[1].hyperparameters.freeze, Some(10));
    assert!(requests[1].model.ends_with("best.pt"));
}

#[test]
fn metrics_without_results_fail_without_charts() {
    let mut fx = fixture();
    let experiments = fx.base.join("annotations/experiments");
    fs::create_dir_all(experiments.join("baseline")).unwrap();

    let err = fx.pipeline.run(MenuAction::PlotMetrics).unwrap_err();
    assert!(matches!(err, PipelineError::NoExperimentData(_)));
    assert!(!experiments.join("plots/loss_curves.png").exists());
}

#[test]
fn metrics_from_results_csv() {
    let mut fx = fixture();
    let run = fx.base.join("annotations/experiments/baseline");
    fs::create_dir_all(&run).unwrap();
    fs::write(
        run.join("results.csv"),
        "epoch,train/box_loss,val/box_loss,metrics/precision(B),metrics/recall(B),metrics/mAP50(B),metrics/mAP50-95(B)\n\
         1,1.2,1.4,0.5,0.4,0.3,0.1\n\
         2,1.0,1.1,0.8,0.6,0.6,0.4\n",
    )
    .unwrap();

    fx.pipeline.run(MenuAction::PlotMetrics).unwrap();
    let plots = fx.base.join("annotations/experiments/plots");
    for chart in [
        "loss_curves.png",
        "map_metrics.png",
        "precision_recall_f1.png",
        "experiments_comparison.png",
    ] {
        assert!(plots.join(chart).exists(), "{}", chart);
    }
    let report = fs::read_to_string(plots.join("metrics_report.txt")).unwrap();
    assert!(report.contains("F1-Score: 0.6857"));
}

#[test]
fn render_inference_concatenates_all_videos() {
    let mut fx = fixture();
    fx.pipeline.run(MenuAction::RenderInference).unwrap();

    let output = fx.base.join("inference.mp4");
    let frames = fx.backend.frames(&output).unwrap();
    assert_eq!(frames.len(), 30);
    // 检测框左上角被绘制成类别0的颜色
    assert_eq!(*frames[0].get_pixel(W / 4, H / 4), Rgb([255, 0, 0]));
    assert!(!fx.base.join("temp_inference_0.mp4").exists());
}

#[test]
fn render_with_no_openable_video() {
    let mut fx = fixture();
    fx.pipeline.config.paths.videos = vec![PathBuf::from("videos/missing.mov")];

    let err = fx.pipeline.run(MenuAction::RenderInference).unwrap_err();
    assert!(matches!(err, PipelineError::NoVideoOpened));
    assert!(!fx.base.join("inference.mp4").exists());
}
