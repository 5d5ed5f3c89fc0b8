// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 在帧上绘制检测框和 "类别 置信度" 标签

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use super::Bbox;

const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 18.0;
const LABEL_PAD: i32 = 3;

/// 高亮调色板, 按类别ID循环取色
const BRIGHT_COLORS: [(u8, u8, u8); 12] = [
    (255, 0, 0),     // 红色
    (0, 255, 0),     // 绿色
    (0, 0, 255),     // 蓝色
    (255, 255, 0),   // 黄色
    (255, 0, 255),   // 品红
    (0, 255, 255),   // 青色
    (255, 128, 0),   // 橙色
    (255, 0, 128),   // 粉红
    (128, 255, 0),   // 黄绿
    (0, 128, 255),   // 天蓝
    (255, 255, 255), // 白色
    (128, 0, 255),   // 紫色
];

pub fn class_color(id: usize) -> Rgb<u8> {
    let (r, g, b) = BRIGHT_COLORS[id % BRIGHT_COLORS.len()];
    Rgb([r, g, b])
}

pub fn label_text(bbox: &Bbox, names: &[String]) -> String {
    let name = names
        .get(bbox.id())
        .cloned()
        .unwrap_or_else(|| format!("class_{}", bbox.id()));
    format!("{} {:.2}", name, bbox.confidence())
}

/// 绘制所有检测结果; 没有字体时只画框
pub fn draw_detections(img: &mut RgbImage, boxes: &[Bbox], names: &[String], font: Option<&FontVec>) {
    let (w, h) = (img.width() as i32, img.height() as i32);
    for bbox in boxes {
        let color = class_color(bbox.id());
        let x1 = (bbox.xmin().round() as i32).clamp(0, w - 1);
        let y1 = (bbox.ymin().round() as i32).clamp(0, h - 1);
        let x2 = (bbox.xmax().round() as i32).clamp(0, w - 1);
        let y2 = (bbox.ymax().round() as i32).clamp(0, h - 1);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        for t in 0..BOX_THICKNESS {
            let bw = x2 - x1 - 2 * t;
            let bh = y2 - y1 - 2 * t;
            if bw <= 0 || bh <= 0 {
                break;
            }
            draw_hollow_rect_mut(img, Rect::at(x1 + t, y1 + t).of_size(bw as u32, bh as u32), color);
        }

        let Some(font) = font else {
            continue;
        };
        let text = label_text(bbox, names);
        let scale = PxScale::from(LABEL_SCALE);
        let (tw, th) = text_size(scale, font, &text);
        let (tw, th) = (tw as i32 + 2 * LABEL_PAD, th as i32 + 2 * LABEL_PAD);
        // 框上方放不下时画在框内
        let ty = if y1 - th >= 0 { y1 - th } else { y1 };
        draw_filled_rect_mut(img, Rect::at(x1, ty).of_size(tw as u32, th as u32), color);
        draw_text_mut(img, Rgb([0, 0, 0]), x1 + LABEL_PAD, ty + LABEL_PAD, scale, font, &text);
    }
}
