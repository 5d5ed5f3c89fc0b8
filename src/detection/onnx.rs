// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 检测器: 预处理 → 推理 → 后处理

use fast_image_resize as fr;
use image::RgbImage;
use ndarray::{s, Array, Array4, ArrayView2, Axis};
use once_cell::sync::Lazy;
use ort::{GraphOptimizationLevel, Session};
use regex::Regex;
use std::path::Path;

use super::{non_max_suppression, Bbox, Detector};
use crate::config::InferenceConfig;
use crate::error::{PipelineError, Result};

const CXYWH_OFFSET: usize = 4;
const PAD_VALUE: f32 = 144.0 / 255.0;

/// 模型元数据里的类别表: `{0: 'person', 1: 'car'}`
static NAMES_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#).expect("names pattern"));

pub struct OnnxDetector {
    session: Session,
    input_name: String,
    output_name: String,
    size: u32,
    conf: f32,
    iou: f32,
    names: Vec<String>,
    resizer: fr::Resizer,
}

impl OnnxDetector {
    /// 加载模型; 元数据没有类别表时使用 `fallback_names`
    pub fn new(model: &Path, config: &InferenceConfig, fallback_names: &[String]) -> Result<Self> {
        let builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
        #[cfg(feature = "tensorrt")]
        let builder = builder
            .with_execution_providers([ort::TensorRTExecutionProvider::default().build()])?;
        #[cfg(feature = "cuda")]
        let builder =
            builder.with_execution_providers([ort::CUDAExecutionProvider::default().build()])?;
        let session = builder.commit_from_file(model)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| PipelineError::InvalidConfig("model has no inputs".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| PipelineError::InvalidConfig("model has no outputs".to_string()))?;

        let names = session
            .metadata()
            .ok()
            .and_then(|m| m.custom("names").ok().flatten())
            .map(|raw| parse_names(&raw))
            .filter(|names| !names.is_empty())
            .unwrap_or_else(|| fallback_names.to_vec());

        log::info!(
            "🧠 模型已加载: {} | 输入 {} | 类别 {} | conf {:.2} | iou {:.2}",
            model.display(),
            config.input_size,
            names.len(),
            config.conf_threshold,
            config.iou_threshold
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            size: config.input_size,
            conf: config.conf_threshold,
            iou: config.iou_threshold,
            names,
            resizer: fr::Resizer::new(),
        })
    }

    /// 等比缩放后贴到左上角, 其余填充灰色; NCHW, 归一化到 [0, 1]
    fn preprocess(&mut self, frame: &RgbImage) -> Result<(Array4<f32>, f32)> {
        let (w0, h0) = frame.dimensions();
        let (ratio, w_new, h_new) = scale_wh(w0 as f32, h0 as f32, self.size as f32, self.size as f32);
        let (w_new, h_new) = ((w_new as u32).max(1), (h_new as u32).max(1));

        let src = fr::images::Image::from_vec_u8(w0, h0, frame.as_raw().clone(), fr::PixelType::U8x3)
            .map_err(|e| PipelineError::Resize(e.to_string()))?;
        let mut dst = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);
        self.resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )
            .map_err(|e| PipelineError::Resize(e.to_string()))?;

        let size = self.size as usize;
        let mut ys = Array::from_elem((1, 3, size, size), PAD_VALUE);
        for (i, rgb) in dst.buffer().chunks_exact(3).enumerate() {
            let x = i % w_new as usize;
            let y = i / w_new as usize;
            ys[[0, 0, y, x]] = rgb[0] as f32 / 255.0;
            ys[[0, 1, y, x]] = rgb[1] as f32 / 255.0;
            ys[[0, 2, y, x]] = rgb[2] as f32 / 255.0;
        }
        Ok((ys, ratio))
    }
}

impl Detector for OnnxDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Bbox>> {
        let (input, ratio) = self.preprocess(frame)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input.view()]?)?;
        let preds = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        let preds = preds.into_dimensionality::<ndarray::Ix3>()?;

        let (w0, h0) = frame.dimensions();
        Ok(decode_predictions(
            preds.slice(s![0, .., ..]),
            ratio,
            (w0 as f32, h0 as f32),
            self.conf,
            self.iou,
        ))
    }

    fn names(&self) -> &[String] {
        &self.names
    }
}

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 解码 `[4 + nc, N]` 输出: 每列 (cx, cy, w, h, 各类别分数)
pub fn decode_predictions(
    preds: ArrayView2<f32>,
    ratio: f32,
    (width_original, height_original): (f32, f32),
    conf: f32,
    iou: f32,
) -> Vec<Bbox> {
    let mut data = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        if pred.len() <= CXYWH_OFFSET {
            break;
        }
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let clss = pred.slice(s![CXYWH_OFFSET..]);

        let Some((id, &confidence)) = clss
            .iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };
        if confidence < conf {
            continue;
        }

        let cx = bbox[0] / ratio;
        let cy = bbox[1] / ratio;
        let w = bbox[2] / ratio;
        let h = bbox[3] / ratio;
        let x = cx - w / 2.;
        let y = cy - h / 2.;
        data.push(Bbox::new(
            x.max(0.0f32).min(width_original),
            y.max(0.0f32).min(height_original),
            w,
            h,
            id,
            confidence,
        ));
    }

    non_max_suppression(&mut data, iou);
    data
}

/// 解析 `{0: 'a', 1: 'b'}`, 按ID排序
fn parse_names(raw: &str) -> Vec<String> {
    let mut entries: Vec<(usize, String)> = NAMES_ENTRY
        .captures_iter(raw)
        .filter_map(|c| Some((c[1].parse().ok()?, c[2].to_string())))
        .collect();
    entries.sort_by_key(|(id, _)| *id);
    entries.into_iter().map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_scale_wh() {
        let (r, w, h) = scale_wh(1280.0, 720.0, 640.0, 640.0);
        assert!((r - 0.5).abs() < 1e-6);
        assert_eq!((w, h), (640.0, 360.0));
    }

    #[test]
    fn test_decode_predictions() {
        // 3 个候选, 2 个类别
        let mut preds = Array2::<f32>::zeros((6, 3));
        // 候选0: 类别1, 0.9
        preds.column_mut(0).assign(&ndarray::arr1(&[100.0, 100.0, 40.0, 20.0, 0.1, 0.9]));
        // 候选1: 与候选0重叠, 0.8, NMS 去掉
        preds.column_mut(1).assign(&ndarray::arr1(&[102.0, 100.0, 40.0, 20.0, 0.8, 0.2]));
        // 候选2: 低于阈值
        preds.column_mut(2).assign(&ndarray::arr1(&[300.0, 300.0, 40.0, 20.0, 0.3, 0.1]));

        let boxes = decode_predictions(preds.view(), 0.5, (1280.0, 720.0), 0.5, 0.45);
        assert_eq!(boxes.len(), 1);
        let b = &boxes[0];
        assert_eq!(b.id(), 1);
        // 还原到原图: cx 200, w 80
        assert!((b.xmin() - 160.0).abs() < 1e-4);
        assert!((b.width() - 80.0).abs() < 1e-4);
    }

    #[test]
    fn test_parse_names() {
        let names = parse_names("{1: 'salad', 0: 'steak', 2: \"soup\"}");
        assert_eq!(names, vec!["steak", "salad", "soup"]);
        assert!(parse_names("").is_empty());
    }
}
