// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 离线数据增强: 图像与标注框同步变换
// 顺序: 水平翻转 → 亮度/对比度 → 旋转 → 随机裁剪 → 缩放

use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;

use crate::annotation::{list_files, read_annotation, write_annotation, YoloBox};
use crate::config::AugmentConfig;
use crate::error::{IoContext, Result};
use crate::extract::save_jpeg;
use crate::geometry::{warp_affine, AffineMatrix, BorderMode, InterpolationMethod};
use crate::report::{BatchReport, Diagnostic, DiagnosticKind};

/// 增强输出文件名前缀
pub const AUG_PREFIX: &str = "aug_";

/// 像素坐标下的框 (class, x1, y1, x2, y2)
#[derive(Debug, Clone, Copy, PartialEq)]
struct PixelBox {
    class_id: usize,
    rect: (f32, f32, f32, f32),
}

/// 随机增强器
pub struct Augmenter {
    config: AugmentConfig,
    rng: StdRng,
}

impl Augmenter {
    pub fn new(config: AugmentConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    fn roll(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    fn uniform(&mut self, limit: f32) -> f32 {
        let limit = limit.abs();
        self.rng.gen_range(-limit..=limit)
    }

    /// 对一张图片及其标注执行整条增强流水线
    pub fn apply(&mut self, mut img: RgbImage, boxes: &[YoloBox]) -> (RgbImage, Vec<YoloBox>) {
        let (w, h) = (img.width() as f32, img.height() as f32);
        let mut pixel_boxes: Vec<PixelBox> = boxes
            .iter()
            .map(|b| PixelBox {
                class_id: b.class_id,
                rect: b.to_xyxy(w, h),
            })
            .collect();

        // 1. 水平翻转
        if self.roll(self.config.flip_prob) {
            imageops::flip_horizontal_in_place(&mut img);
            let m = AffineMatrix::flip_horizontal(img.width() as f32);
            transform_boxes(&mut pixel_boxes, &m, img.dimensions());
        }

        // 2. 亮度/对比度: out = in * alpha + beta * 255
        if self.roll(self.config.brightness_contrast_prob) {
            let alpha = 1.0 + self.uniform(self.config.contrast_limit);
            let beta = self.uniform(self.config.brightness_limit) * 255.0;
            adjust_brightness_contrast(&mut img, alpha, beta);
        }

        // 3. 绕中心旋转, 反射填充边界
        if self.roll(self.config.rotate_prob) {
            let angle = self.uniform(self.config.rotate_limit);
            let (cw, ch) = (img.width() as f32 / 2.0, img.height() as f32 / 2.0);
            let m = AffineMatrix::rotation_around_center(cw, ch, angle);
            if let Some(rotated) = warp_affine(
                &img,
                &m,
                img.dimensions(),
                InterpolationMethod::Bilinear,
                BorderMode::Reflect101,
            ) {
                img = rotated;
                transform_boxes(&mut pixel_boxes, &m, img.dimensions());
            }
        }

        // 4. 随机裁剪; 图片比裁剪尺寸小时跳过
        let (crop_w, crop_h) = self.config.crop_size;
        if self.roll(self.config.crop_prob) && img.width() >= crop_w && img.height() >= crop_h {
            let x0 = self.rng.gen_range(0..=img.width() - crop_w);
            let y0 = self.rng.gen_range(0..=img.height() - crop_h);
            img = imageops::crop_imm(&img, x0, y0, crop_w, crop_h).to_image();
            let m = AffineMatrix::translation(-(x0 as f32), -(y0 as f32));
            transform_boxes(&mut pixel_boxes, &m, img.dimensions());
        }

        // 5. 缩放到输出尺寸
        if let Some((ow, oh)) = self.config.output_size {
            if (ow, oh) != img.dimensions() && ow > 0 && oh > 0 {
                let m = AffineMatrix::scale(
                    ow as f32 / img.width() as f32,
                    oh as f32 / img.height() as f32,
                );
                img = imageops::resize(&img, ow, oh, FilterType::Triangle);
                transform_boxes(&mut pixel_boxes, &m, img.dimensions());
            }
        }

        let (w, h) = (img.width() as f32, img.height() as f32);
        let out = pixel_boxes
            .into_iter()
            .filter_map(|b| YoloBox::from_xyxy(b.class_id, b.rect, w, h))
            .collect();
        (img, out)
    }
}

/// 框四角做同样的变换, 取外接矩形并裁剪到图像内; 完全移出的框丢弃
fn transform_boxes(boxes: &mut Vec<PixelBox>, m: &AffineMatrix, (w, h): (u32, u32)) {
    let (w, h) = (w as f32, h as f32);
    boxes.retain_mut(|b| {
        let (x1, y1, x2, y2) = m.transform_rect(b.rect);
        let clipped = (x1.max(0.0), y1.max(0.0), x2.min(w), y2.min(h));
        if clipped.2 - clipped.0 <= 0.0 || clipped.3 - clipped.1 <= 0.0 {
            return false;
        }
        b.rect = clipped;
        true
    });
}

fn adjust_brightness_contrast(img: &mut RgbImage, alpha: f32, beta: f32) {
    let lut: Vec<u8> = (0..=255u32)
        .map(|v| (v as f32 * alpha + beta).round().clamp(0.0, 255.0) as u8)
        .collect();
    for px in img.pixels_mut() {
        for c in px.0.iter_mut() {
            *c = lut[*c as usize];
        }
    }
}

#[derive(Debug, Default)]
pub struct AugmentOutcome {
    pub written: usize,
    pub boxes_in: usize,
    pub boxes_out: usize,
    pub report: BatchReport,
}

/// 增强目录下所有 `*.jpg`, 输出 `aug_` 前缀的图片和标注
///
/// 标注中类别ID >= `class_count` 的行被丢弃并记录。
pub fn augment_dataset(
    image_dir: &Path,
    annotation_dir: &Path,
    out_images: &Path,
    out_labels: &Path,
    config: &AugmentConfig,
    class_count: usize,
) -> Result<AugmentOutcome> {
    fs::create_dir_all(out_images).at(out_images)?;
    fs::create_dir_all(out_labels).at(out_labels)?;

    let mut augmenter = Augmenter::new(config.clone());
    let mut outcome = AugmentOutcome::default();

    for image_path in list_files(image_dir, "jpg")? {
        let (Some(name), Some(stem)) = (image_path.file_name(), image_path.file_stem()) else {
            continue;
        };
        let (name, stem) = (name.to_string_lossy(), stem.to_string_lossy());

        let img = match image::open(&image_path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                outcome.report.skip(Diagnostic::new(
                    DiagnosticKind::UnreadableImage,
                    &image_path,
                    e.to_string(),
                ));
                continue;
            }
        };

        // 标注文件读不出来时整张跳过
        let label_path = annotation_dir.join(format!("{}.txt", stem));
        let mut boxes = if label_path.is_file() {
            match read_annotation(&label_path, &mut outcome.report) {
                Ok(boxes) => boxes,
                Err(e) => {
                    outcome.report.skip(Diagnostic::new(
                        DiagnosticKind::UnreadableLabel,
                        &label_path,
                        e.to_string(),
                    ));
                    continue;
                }
            }
        } else {
            Vec::new()
        };
        boxes.retain(|b| {
            if b.class_id < class_count {
                return true;
            }
            outcome.report.note(Diagnostic::new(
                DiagnosticKind::ClassOutOfRange,
                &label_path,
                format!("class id {} (only {} classes)", b.class_id, class_count),
            ));
            false
        });
        outcome.boxes_in += boxes.len();

        let (aug_img, aug_boxes) = augmenter.apply(img, &boxes);

        let img_out = out_images.join(format!("{}{}", AUG_PREFIX, name));
        let label_out = out_labels.join(format!("{}{}.txt", AUG_PREFIX, stem));
        let written = save_jpeg(&aug_img, &img_out, config.jpeg_quality)
            .and_then(|_| write_annotation(&label_out, &aug_boxes));
        match written {
            Ok(()) => {
                outcome.written += 1;
                outcome.boxes_out += aug_boxes.len();
                outcome.report.succeed();
            }
            Err(e) => outcome.report.fail(Diagnostic::new(
                DiagnosticKind::WriteFailed,
                &img_out,
                e.to_string(),
            )),
        }
    }

    log::info!(
        "✅ 增强完成: {} 张图片, 标注框 {} → {}",
        outcome.written,
        outcome.boxes_in,
        outcome.boxes_out
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn always(config: AugmentConfig) -> AugmentConfig {
        AugmentConfig {
            seed: Some(7),
            ..config
        }
    }

    #[test]
    fn test_identity_keeps_boxes() {
        let mut aug = Augmenter::new(always(AugmentConfig::disabled()));
        let img = RgbImage::from_pixel(320, 240, Rgb([10, 20, 30]));
        let boxes = vec![
            YoloBox::new(0, 0.5, 0.5, 0.2, 0.3),
            YoloBox::new(4, 0.1, 0.9, 0.1, 0.05),
        ];
        let (out, out_boxes) = aug.apply(img.clone(), &boxes);
        assert_eq!(out, img);
        assert_eq!(out_boxes.len(), 2);
        for (a, b) in boxes.iter().zip(&out_boxes) {
            assert_eq!(a.class_id, b.class_id);
            assert!((a.cx - b.cx).abs() < 1e-5);
            assert!((a.cy - b.cy).abs() < 1e-5);
            assert!((a.w - b.w).abs() < 1e-5);
            assert!((a.h - b.h).abs() < 1e-5);
        }
    }

    #[test]
    fn test_flip_mirrors_center() {
        let config = AugmentConfig {
            flip_prob: 1.0,
            ..AugmentConfig::disabled()
        };
        let mut aug = Augmenter::new(always(config));
        let img = RgbImage::new(100, 50);
        let (_, out) = aug.apply(img, &[YoloBox::new(1, 0.2, 0.4, 0.1, 0.2)]);
        assert!((out[0].cx - 0.8).abs() < 1e-5);
        assert!((out[0].cy - 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_resize_keeps_normalized_box() {
        let config = AugmentConfig {
            output_size: Some((640, 640)),
            ..AugmentConfig::disabled()
        };
        let mut aug = Augmenter::new(always(config));
        let img = RgbImage::new(1280, 720);
        let b = YoloBox::new(2, 0.3, 0.6, 0.2, 0.1);
        let (out_img, out) = aug.apply(img, &[b]);
        assert_eq!(out_img.dimensions(), (640, 640));
        assert!((out[0].cx - 0.3).abs() < 1e-5);
        assert!((out[0].h - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_crop_drops_outside_boxes() {
        let config = AugmentConfig {
            crop_prob: 1.0,
            crop_size: (100, 100),
            ..AugmentConfig::disabled()
        };
        let mut aug = Augmenter::new(always(config));
        // 图片与裁剪同宽同高: 偏移只能为 0
        let img = RgbImage::new(100, 100);
        let (_, out) = aug.apply(img, &[YoloBox::new(0, 0.5, 0.5, 0.2, 0.2)]);
        assert_eq!(out.len(), 1);

        let config = AugmentConfig {
            crop_prob: 1.0,
            crop_size: (50, 200),
            ..AugmentConfig::disabled()
        };
        let mut aug = Augmenter::new(always(config));
        // 红色通道等于 x 坐标, 用来读出裁剪偏移
        let img = RgbImage::from_fn(100, 200, |x, _| Rgb([x as u8, 0, 0]));
        let boxes = [
            YoloBox::new(0, 0.055, 0.5, 0.02, 0.1), // x 4.5..6.5
            YoloBox::new(1, 0.955, 0.5, 0.02, 0.1), // x 94.5..96.5
            YoloBox::new(2, 0.50, 0.5, 0.10, 0.1), // x 45..55, 任何窗口都覆盖
        ];
        let (out_img, out) = aug.apply(img, &boxes);
        assert_eq!(out_img.dimensions(), (50, 200));
        let x0 = out_img.get_pixel(0, 0)[0] as f32;
        assert!(x0 <= 50.0);

        let mut expected = Vec::new();
        if x0 <= 6.0 {
            expected.push(0);
        }
        if x0 >= 45.0 {
            expected.push(1);
        }
        expected.push(2);
        expected.sort();
        let mut classes: Vec<usize> = out.iter().map(|b| b.class_id).collect();
        classes.sort();
        assert_eq!(classes, expected);

        let middle = out.iter().find(|b| b.class_id == 2).unwrap();
        let (x1, x2) = ((45.0 - x0).max(0.0), (55.0 - x0).min(50.0));
        assert!((middle.cx - (x1 + x2) / 2.0 / 50.0).abs() < 1e-5);
        assert!((middle.w - (x2 - x1) / 50.0).abs() < 1e-5);
        assert!((middle.cy - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_resize_to_source_size_is_identity() {
        let config = AugmentConfig {
            output_size: Some((320, 240)),
            ..AugmentConfig::disabled()
        };
        let mut aug = Augmenter::new(always(config));
        let img = RgbImage::from_fn(320, 240, |x, y| Rgb([x as u8, y as u8, 9]));
        let boxes = vec![
            YoloBox::new(0, 0.5, 0.5, 0.2, 0.3),
            YoloBox::new(3, 0.9, 0.1, 0.1, 0.1),
        ];
        let (out_img, out) = aug.apply(img.clone(), &boxes);
        assert_eq!(out_img, img);
        assert_eq!(out.len(), boxes.len());
        for (a, b) in boxes.iter().zip(&out) {
            assert_eq!(a.class_id, b.class_id);
            assert!((a.cx - b.cx).abs() < 1e-5 && (a.cy - b.cy).abs() < 1e-5);
            assert!((a.w - b.w).abs() < 1e-5 && (a.h - b.h).abs() < 1e-5);
        }
    }

    #[test]
    fn test_crop_skipped_on_small_image() {
        let config = AugmentConfig {
            crop_prob: 1.0,
            crop_size: (512, 512),
            ..AugmentConfig::disabled()
        };
        let mut aug = Augmenter::new(always(config));
        let (out, _) = aug.apply(RgbImage::new(320, 240), &[]);
        assert_eq!(out.dimensions(), (320, 240));
    }

    #[test]
    fn test_rotation_stays_inside() {
        let config = AugmentConfig {
            rotate_prob: 1.0,
            rotate_limit: 30.0,
            ..AugmentConfig::disabled()
        };
        let mut aug = Augmenter::new(always(config));
        let img = RgbImage::from_pixel(64, 48, Rgb([200, 100, 50]));
        let (_, out) = aug.apply(img, &[YoloBox::new(3, 0.5, 0.5, 0.9, 0.9)]);
        assert_eq!(out.len(), 1);
        let b = out[0];
        assert!(b.cx - b.w / 2.0 >= -1e-6 && b.cx + b.w / 2.0 <= 1.0 + 1e-6);
        assert!(b.cy - b.h / 2.0 >= -1e-6 && b.cy + b.h / 2.0 <= 1.0 + 1e-6);
    }

    #[test]
    fn test_brightness_lut() {
        let mut img = RgbImage::from_pixel(2, 2, Rgb([100, 200, 250]));
        adjust_brightness_contrast(&mut img, 1.2, 10.0);
        assert_eq!(img.get_pixel(0, 0), &Rgb([130, 250, 255]));
    }

    #[test]
    fn test_augment_dataset_writes_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("frames");
        let labels = dir.path().join("labels");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&labels).unwrap();

        RgbImage::new(32, 32).save(images.join("a_frame_00000.jpg")).unwrap();
        RgbImage::new(32, 32).save(images.join("a_frame_00003.jpg")).unwrap();
        fs::write(images.join("broken.jpg"), b"not a jpeg").unwrap();
        fs::write(
            labels.join("a_frame_00000.txt"),
            "0 0.5 0.5 0.5 0.5\n12 0.5 0.5 0.1 0.1\nbad\n",
        )
        .unwrap();

        let out_i = dir.path().join("aug/images");
        let out_l = dir.path().join("aug/labels");
        let outcome = augment_dataset(
            &images,
            &labels,
            &out_i,
            &out_l,
            &always(AugmentConfig::disabled()),
            11,
        )
        .unwrap();

        assert_eq!(outcome.written, 2);
        assert_eq!(outcome.report.count(DiagnosticKind::UnreadableImage), 1);
        assert_eq!(outcome.report.count(DiagnosticKind::ClassOutOfRange), 1);
        assert_eq!(outcome.report.count(DiagnosticKind::MalformedLine), 1);
        assert!(out_i.join("aug_a_frame_00000.jpg").exists());
        assert_eq!(
            fs::read_to_string(out_l.join("aug_a_frame_00000.txt")).unwrap(),
            "0 0.500000 0.500000 0.500000 0.500000\n"
        );
        // 没有标注的帧也输出空标注文件
        assert_eq!(
            fs::read_to_string(out_l.join("aug_a_frame_00003.txt")).unwrap(),
            ""
        );
    }

    #[test]
    fn test_unreadable_label_skips_sample() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("frames");
        let labels = dir.path().join("labels");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&labels).unwrap();

        RgbImage::new(32, 32).save(images.join("a_frame_00000.jpg")).unwrap();
        RgbImage::new(32, 32).save(images.join("a_frame_00003.jpg")).unwrap();
        // 非 UTF-8 内容: 整个文件读不出来
        fs::write(labels.join("a_frame_00000.txt"), b"0 0.5 0.5 0.5 0.5\n\xff\n").unwrap();

        let out_i = dir.path().join("aug/images");
        let out_l = dir.path().join("aug/labels");
        let outcome = augment_dataset(
            &images,
            &labels,
            &out_i,
            &out_l,
            &always(AugmentConfig::disabled()),
            11,
        )
        .unwrap();

        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.report.skipped, 1);
        assert_eq!(outcome.report.count(DiagnosticKind::UnreadableLabel), 1);
        assert_eq!(outcome.report.count(DiagnosticKind::MalformedLine), 0);
        assert!(!out_i.join("aug_a_frame_00000.jpg").exists());
        assert!(!out_l.join("aug_a_frame_00000.txt").exists());
        assert!(out_l.join("aug_a_frame_00003.txt").exists());
    }
}
