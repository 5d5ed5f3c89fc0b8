// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 数据集划分: train / val / test 目录 + data.yaml

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::annotation::{list_files, YoloBox};
use crate::config::SplitConfig;
use crate::error::{IoContext, Result};
use crate::report::{BatchReport, Diagnostic, DiagnosticKind};

pub const MANIFEST_FILE: &str = "data.yaml";

/// 训练清单 (Ultralytics data.yaml)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub train: String,
    pub val: String,
    pub test: String,
    pub nc: usize,
    pub names: Vec<String>,
}

impl DatasetManifest {
    pub fn new(root: &Path, names: &[String]) -> Self {
        let dir = |subset: Subset| {
            root.join(subset.name())
                .join("images")
                .to_string_lossy()
                .to_string()
        };
        Self {
            train: dir(Subset::Train),
            val: dir(Subset::Val),
            test: dir(Subset::Test),
            nc: names.len(),
            names: names.to_vec(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).at(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_yaml::to_string(self)?;
        fs::write(path, text).at(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    Train,
    Val,
    Test,
}

impl Subset {
    pub const ALL: [Subset; 3] = [Subset::Train, Subset::Val, Subset::Test];

    pub fn name(&self) -> &'static str {
        match self {
            Subset::Train => "train",
            Subset::Val => "val",
            Subset::Test => "test",
        }
    }
}

/// 三路划分结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Split<T> {
    pub train: Vec<T>,
    pub val: Vec<T>,
    pub test: Vec<T>,
}

impl<T> Split<T> {
    pub fn get(&self, subset: Subset) -> &[T] {
        match subset {
            Subset::Train => &self.train,
            Subset::Val => &self.val,
            Subset::Test => &self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 打乱后切出 ceil(n * ratio) 个作为留出部分, 其余保留
fn holdout<T: Clone>(items: &[T], ratio: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut shuffled = items.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let n_holdout = ((items.len() as f64) * ratio).ceil() as usize;
    let n_holdout = n_holdout.min(items.len());
    let rest = shuffled.split_off(n_holdout);
    (rest, shuffled)
}

/// 两阶段划分: 先留出 holdout_ratio, 再把留出部分按 test_ratio 分成测试/验证
///
/// 两次打乱都使用同一个种子重新初始化随机数生成器。
pub fn partition<T: Clone>(items: &[T], config: &SplitConfig) -> Split<T> {
    let (train, rest) = holdout(items, config.holdout_ratio, config.seed);
    let (val, test) = holdout(&rest, config.test_ratio, config.seed);
    Split { train, val, test }
}

#[derive(Debug, Default)]
pub struct SplitOutcome {
    pub split: Split<String>,
    pub labels_copied: usize,
    pub labels_absent: usize,
    pub manifest_path: PathBuf,
    pub report: BatchReport,
}

/// 划分图片并复制到 `{root}/{train,val,test}/{images,labels}`, 写出 data.yaml
///
/// 标注不存在时只复制图片; 类别ID越界的标注原样复制并记录诊断。
pub fn split_dataset(
    image_dir: &Path,
    label_dir: &Path,
    dataset_root: &Path,
    config: &SplitConfig,
    classes: &[String],
) -> Result<SplitOutcome> {
    let names: Vec<String> = list_files(image_dir, "jpg")?
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();

    let mut outcome = SplitOutcome {
        split: partition(&names, config),
        ..Default::default()
    };

    for subset in Subset::ALL {
        let images_out = dataset_root.join(subset.name()).join("images");
        let labels_out = dataset_root.join(subset.name()).join("labels");
        fs::create_dir_all(&images_out).at(&images_out)?;
        fs::create_dir_all(&labels_out).at(&labels_out)?;

        for name in outcome.split.get(subset) {
            let src = image_dir.join(name);
            let dst = images_out.join(name);
            if let Err(e) = fs::copy(&src, &dst) {
                outcome.report.fail(Diagnostic::new(
                    DiagnosticKind::WriteFailed,
                    &dst,
                    e.to_string(),
                ));
                continue;
            }
            outcome.report.succeed();

            let label = Path::new(name).with_extension("txt");
            let src_label = label_dir.join(&label);
            if !src_label.is_file() {
                outcome.labels_absent += 1;
                log::debug!("{} 没有标注, 只复制图片", name);
                continue;
            }
            check_class_ids(&src_label, classes.len(), &mut outcome.report);

            let dst_label = labels_out.join(&label);
            match fs::copy(&src_label, &dst_label) {
                Ok(_) => outcome.labels_copied += 1,
                Err(e) => outcome.report.fail(Diagnostic::new(
                    DiagnosticKind::WriteFailed,
                    &dst_label,
                    e.to_string(),
                )),
            }
        }
    }

    let manifest = DatasetManifest::new(dataset_root, classes);
    let manifest_path = dataset_root.join(MANIFEST_FILE);
    manifest.save(&manifest_path)?;
    outcome.manifest_path = manifest_path;

    log::info!(
        "✅ 数据集已创建: train {} | val {} | test {} → {}",
        outcome.split.train.len(),
        outcome.split.val.len(),
        outcome.split.test.len(),
        dataset_root.display()
    );
    Ok(outcome)
}

/// 只报告, 不修改文件
fn check_class_ids(path: &Path, class_count: usize, report: &mut BatchReport) {
    let Ok(text) = fs::read_to_string(path) else {
        return;
    };
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match YoloBox::parse_line(line) {
            Ok(b) if b.class_id >= class_count => report.note(
                Diagnostic::new(
                    DiagnosticKind::ClassOutOfRange,
                    path,
                    format!("class id {} (only {} classes)", b.class_id, class_count),
                )
                .at_line(i + 1),
            ),
            Ok(_) => {}
            Err(e) => report.note(
                Diagnostic::new(DiagnosticKind::MalformedLine, path, e.to_string())
                    .at_line(i + 1),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_classes;
    use std::collections::HashSet;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("aug_img_{:04}.jpg", i)).collect()
    }

    #[test]
    fn test_split_sizes_100() {
        let split = partition(&names(100), &SplitConfig::default());
        assert_eq!(split.train.len(), 70);
        assert_eq!(split.val.len(), 15);
        assert_eq!(split.test.len(), 15);
    }

    #[test]
    fn test_split_disjoint_and_exhaustive() {
        for n in [0, 1, 2, 7, 10, 33] {
            let items = names(n);
            let split = partition(&items, &SplitConfig::default());
            assert_eq!(split.len(), n);

            let all: HashSet<&String> = split
                .train
                .iter()
                .chain(&split.val)
                .chain(&split.test)
                .collect();
            assert_eq!(all.len(), n, "n = {}", n);
        }
    }

    #[test]
    fn test_split_deterministic() {
        let items = names(50);
        let a = partition(&items, &SplitConfig::default());
        let b = partition(&items, &SplitConfig::default());
        assert_eq!(a, b);

        let other = SplitConfig {
            seed: 7,
            ..SplitConfig::default()
        };
        assert_ne!(a, partition(&items, &other));
    }

    #[test]
    fn test_ceil_rounding() {
        // ceil(10 * 0.3) = 3, ceil(3 * 0.5) = 2
        let split = partition(&names(10), &SplitConfig::default());
        assert_eq!(split.train.len(), 7);
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.val.len(), 1);
    }

    #[test]
    fn test_split_dataset_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        let labels = dir.path().join("labels");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&labels).unwrap();
        for name in names(20) {
            fs::write(images.join(&name), b"jpeg").unwrap();
        }
        // 前10张有标注, 其中一张类别越界
        for name in names(20).iter().take(10) {
            let label = labels.join(Path::new(name).with_extension("txt"));
            fs::write(label, "1 0.5 0.5 0.2 0.2\n").unwrap();
        }
        fs::write(labels.join("aug_img_0003.txt"), "11 0.5 0.5 0.2 0.2\n").unwrap();

        let root = dir.path().join("dataset");
        let classes = default_classes();
        let outcome =
            split_dataset(&images, &labels, &root, &SplitConfig::default(), &classes).unwrap();

        assert_eq!(outcome.split.len(), 20);
        assert_eq!(outcome.labels_copied, 10);
        assert_eq!(outcome.labels_absent, 10);
        assert_eq!(outcome.report.count(DiagnosticKind::ClassOutOfRange), 1);

        let mut on_disk = 0;
        for subset in Subset::ALL {
            on_disk += fs::read_dir(root.join(subset.name()).join("images"))
                .unwrap()
                .count();
        }
        assert_eq!(on_disk, 20);

        let manifest = DatasetManifest::load(&outcome.manifest_path).unwrap();
        assert_eq!(manifest.nc, 11);
        assert_eq!(manifest.names, classes);
        assert!(manifest.train.ends_with("images"));
        assert!(manifest.val.contains("val"));
    }
}
