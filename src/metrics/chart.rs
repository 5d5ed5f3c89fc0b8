// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 折线图绘制 (imageproc): 网格、坐标轴、图例、多子图布局

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const TICKS: usize = 5;

const MARGIN_LEFT: i32 = 70;
const MARGIN_RIGHT: i32 = 20;
const MARGIN_TOP: i32 = 40;
const MARGIN_BOTTOM: i32 = 50;

/// tab10 调色板
pub const PALETTE: [Rgb<u8>; 10] = [
    Rgb([31, 119, 180]),
    Rgb([255, 127, 14]),
    Rgb([44, 160, 44]),
    Rgb([214, 39, 40]),
    Rgb([148, 103, 189]),
    Rgb([140, 86, 75]),
    Rgb([227, 119, 194]),
    Rgb([127, 127, 127]),
    Rgb([188, 189, 34]),
    Rgb([23, 190, 207]),
];

pub fn color(i: usize) -> Rgb<u8> {
    PALETTE[i % PALETTE.len()]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
}

impl LineStyle {
    /// (实线段长度, 间隔长度), 像素
    fn pattern(&self) -> Option<(f32, f32)> {
        match self {
            LineStyle::Solid => None,
            LineStyle::Dashed => Some((10.0, 6.0)),
            LineStyle::Dotted => Some((2.0, 4.0)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Series {
    pub label: String,
    pub color: Rgb<u8>,
    pub style: LineStyle,
    pub width: u32,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

impl Series {
    pub fn new(label: impl Into<String>, color: Rgb<u8>, xs: &[f64], ys: &[f64]) -> Self {
        Self {
            label: label.into(),
            color,
            style: LineStyle::Solid,
            width: 1,
            xs: xs.to_vec(),
            ys: ys.to_vec(),
        }
    }

    pub fn style(mut self, style: LineStyle) -> Self {
        self.style = style;
        self
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = width.max(1);
        self
    }
}

/// 一个子图
#[derive(Debug, Clone, Default)]
pub struct Panel {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub y_range: Option<(f64, f64)>,
    pub series: Vec<Series>,
}

impl Panel {
    pub fn new(title: &str, x_label: &str, y_label: &str) -> Self {
        Self {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            ..Default::default()
        }
    }

    pub fn y_range(mut self, lo: f64, hi: f64) -> Self {
        self.y_range = Some((lo, hi));
        self
    }

    fn data_range(&self) -> ((f64, f64), (f64, f64)) {
        let finite = |v: &&f64| v.is_finite();
        let xs = self.series.iter().flat_map(|s| s.xs.iter()).filter(finite);
        let x = expand(min_max(xs));

        let y = match self.y_range {
            Some(r) => r,
            None => {
                let ys = self.series.iter().flat_map(|s| s.ys.iter()).filter(finite);
                let (lo, hi) = expand(min_max(ys));
                let pad = (hi - lo) * 0.05;
                (lo - pad, hi + pad)
            }
        };
        (x, y)
    }
}

fn min_max<'a>(values: impl Iterator<Item = &'a f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// 空区间或单点时撑开, 避免除零
fn expand(range: Option<(f64, f64)>) -> (f64, f64) {
    match range {
        None => (0.0, 1.0),
        Some((lo, hi)) if (hi - lo).abs() < 1e-12 => (lo - 0.5, hi + 0.5),
        Some(r) => r,
    }
}

/// 文字绘制; 没有字体时什么都不画
struct Pen<'a> {
    font: Option<&'a FontVec>,
}

impl Pen<'_> {
    fn size(&self, scale: f32, text: &str) -> (i32, i32) {
        match self.font {
            Some(font) => {
                let (w, h) = text_size(PxScale::from(scale), font, text);
                (w as i32, h as i32)
            }
            None => (0, 0),
        }
    }

    fn text(&self, img: &mut RgbImage, x: i32, y: i32, scale: f32, color: Rgb<u8>, text: &str) {
        if let Some(font) = self.font {
            draw_text_mut(img, color, x, y, PxScale::from(scale), font, text);
        }
    }
}

/// 渲染 rows × cols 个子图, 按行优先排列
pub fn render_grid(
    panels: &[Panel],
    cols: u32,
    rows: u32,
    panel_size: (u32, u32),
    font: Option<&FontVec>,
) -> RgbImage {
    let (pw, ph) = panel_size;
    let mut img = RgbImage::from_pixel(pw * cols.max(1), ph * rows.max(1), WHITE);
    let pen = Pen { font };

    for (i, panel) in panels.iter().enumerate().take((cols * rows) as usize) {
        let col = i as u32 % cols;
        let row = i as u32 / cols;
        draw_panel(&mut img, &pen, panel, (col * pw) as i32, (row * ph) as i32, pw, ph);
    }
    img
}

fn draw_panel(img: &mut RgbImage, pen: &Pen, panel: &Panel, ox: i32, oy: i32, pw: u32, ph: u32) {
    let left = ox + MARGIN_LEFT;
    let top = oy + MARGIN_TOP;
    let width = (pw as i32 - MARGIN_LEFT - MARGIN_RIGHT).max(10);
    let height = (ph as i32 - MARGIN_TOP - MARGIN_BOTTOM).max(10);
    let ((x0, x1), (y0, y1)) = panel.data_range();

    let to_px = |x: f64, y: f64| -> (f32, f32) {
        let px = left as f64 + (x - x0) / (x1 - x0) * width as f64;
        let py = (top + height) as f64 - (y - y0) / (y1 - y0) * height as f64;
        (px as f32, py as f32)
    };

    // 网格与刻度
    for t in 0..=TICKS {
        let f = t as f64 / TICKS as f64;
        let gx = left as f32 + f as f32 * width as f32;
        let gy = (top + height) as f32 - f as f32 * height as f32;
        draw_line_segment_mut(img, (gx, top as f32), (gx, (top + height) as f32), GRID);
        draw_line_segment_mut(img, (left as f32, gy), ((left + width) as f32, gy), GRID);

        let xv = format_tick(x0 + f * (x1 - x0));
        let (tw, _) = pen.size(14.0, &xv);
        pen.text(img, gx as i32 - tw / 2, top + height + 6, 14.0, BLACK, &xv);

        let yv = format_tick(y0 + f * (y1 - y0));
        let (tw, th) = pen.size(14.0, &yv);
        pen.text(img, left - tw - 6, gy as i32 - th / 2, 14.0, BLACK, &yv);
    }
    draw_hollow_rect_mut(
        img,
        Rect::at(left, top).of_size(width as u32, height as u32),
        BLACK,
    );

    // 标题与坐标轴名称
    let (tw, _) = pen.size(20.0, &panel.title);
    pen.text(img, left + width / 2 - tw / 2, oy + 10, 20.0, BLACK, &panel.title);
    let (tw, _) = pen.size(15.0, &panel.x_label);
    pen.text(
        img,
        left + width / 2 - tw / 2,
        top + height + 26,
        15.0,
        BLACK,
        &panel.x_label,
    );
    pen.text(img, ox + 4, oy + 14, 15.0, BLACK, &panel.y_label);

    // 曲线
    for series in &panel.series {
        let points: Vec<(f32, f32)> = series
            .xs
            .iter()
            .zip(&series.ys)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(&x, &y)| to_px(x, y))
            .map(|(x, y)| {
                (
                    x.clamp(left as f32, (left + width) as f32),
                    y.clamp(top as f32, (top + height) as f32),
                )
            })
            .collect();
        draw_polyline(img, &points, series.color, series.style, series.width);
    }

    draw_legend(img, pen, panel, left + width, top);
}

fn draw_legend(img: &mut RgbImage, pen: &Pen, panel: &Panel, right: i32, top: i32) {
    if panel.series.is_empty() {
        return;
    }
    let line_h = 20;
    let label_w = panel
        .series
        .iter()
        .map(|s| pen.size(14.0, &s.label).0)
        .max()
        .unwrap_or(0);
    let box_w = 40 + label_w + 12;
    let box_h = line_h * panel.series.len() as i32 + 8;
    let x = right - box_w - 8;
    let y = top + 8;

    draw_filled_rect_mut(img, Rect::at(x, y).of_size(box_w as u32, box_h as u32), WHITE);
    draw_hollow_rect_mut(img, Rect::at(x, y).of_size(box_w as u32, box_h as u32), GRID);
    for (i, s) in panel.series.iter().enumerate() {
        let cy = (y + 4 + line_h * i as i32 + line_h / 2) as f32;
        let sample = [((x + 6) as f32, cy), ((x + 34) as f32, cy)];
        draw_polyline(img, &sample, s.color, s.style, s.width);
        let (_, th) = pen.size(14.0, &s.label);
        pen.text(img, x + 40, cy as i32 - th / 2, 14.0, BLACK, &s.label);
    }
}

/// 折线, 支持虚线/点线和线宽
fn draw_polyline(img: &mut RgbImage, points: &[(f32, f32)], color: Rgb<u8>, style: LineStyle, width: u32) {
    let mut phase = 0.0f32; // 在图案周期中的位置, 跨线段连续
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        match style.pattern() {
            None => thick_segment(img, a, b, color, width),
            Some((on, off)) => {
                let (dx, dy) = (b.0 - a.0, b.1 - a.1);
                let len = (dx * dx + dy * dy).sqrt();
                if len < 1e-3 {
                    continue;
                }
                let mut t = 0.0f32;
                while t < len {
                    let period_pos = phase % (on + off);
                    let (visible, remain) = if period_pos < on {
                        (true, on - period_pos)
                    } else {
                        (false, on + off - period_pos)
                    };
                    let step = remain.min(len - t);
                    if visible {
                        let p0 = (a.0 + dx * t / len, a.1 + dy * t / len);
                        let p1 = (a.0 + dx * (t + step) / len, a.1 + dy * (t + step) / len);
                        thick_segment(img, p0, p1, color, width);
                    }
                    t += step;
                    phase += step;
                }
            }
        }
    }
}

fn thick_segment(img: &mut RgbImage, a: (f32, f32), b: (f32, f32), color: Rgb<u8>, width: u32) {
    for k in 0..width {
        let o = k as f32 - (width - 1) as f32 / 2.0;
        draw_line_segment_mut(img, (a.0, a.1 + o), (b.0, b.1 + o), color);
        if width > 1 {
            draw_line_segment_mut(img, (a.0 + o, a.1), (b.0 + o, b.1), color);
        }
    }
}

fn format_tick(v: f64) -> String {
    if v.abs() >= 100.0 || (v.fract().abs() < 1e-9 && v.abs() >= 1.0) {
        format!("{:.0}", v)
    } else {
        format!("{:.2}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_font() {
        let panel = Panel::new("Loss", "Epoch", "Loss").series_from(&[0.0, 1.0, 2.0], &[1.0, 0.5, 0.2]);
        let img = render_grid(&[panel], 1, 1, (400, 300), None);
        assert_eq!(img.dimensions(), (400, 300));
        // 曲线颜色出现在图中
        assert!(img.pixels().any(|p| *p == PALETTE[0]));
    }

    #[test]
    fn test_grid_layout_size() {
        let panels = vec![Panel::new("a", "x", "y"); 4];
        let img = render_grid(&panels, 2, 2, (300, 200), None);
        assert_eq!(img.dimensions(), (600, 400));
    }

    #[test]
    fn test_expand_degenerate_range() {
        assert_eq!(expand(None), (0.0, 1.0));
        assert_eq!(expand(Some((3.0, 3.0))), (2.5, 3.5));
        assert_eq!(expand(Some((0.0, 2.0))), (0.0, 2.0));
    }

    #[test]
    fn test_dashed_line_has_gaps() {
        let mut solid = RgbImage::from_pixel(200, 10, WHITE);
        let mut dashed = RgbImage::from_pixel(200, 10, WHITE);
        let pts = [(0.0, 5.0), (199.0, 5.0)];
        draw_polyline(&mut solid, &pts, BLACK, LineStyle::Solid, 1);
        draw_polyline(&mut dashed, &pts, BLACK, LineStyle::Dashed, 1);
        let count = |img: &RgbImage| img.pixels().filter(|p| **p == BLACK).count();
        assert!(count(&dashed) < count(&solid));
        assert!(count(&dashed) > 0);
    }

    impl Panel {
        fn series_from(mut self, xs: &[f64], ys: &[f64]) -> Self {
            self.series.push(Series::new("s", color(0), xs, ys));
            self
        }
    }
}
