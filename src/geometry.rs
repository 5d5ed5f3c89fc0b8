// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 仿射变换工具模块
// 图像 warp 与标注框坐标使用同一个矩阵, 保证两者一致
use image::{Rgb, RgbImage};

/// 仿射变换矩阵 (2x3)
/// | a11 a12 b1 |
/// | a21 a22 b2 |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix {
    pub a11: f32,
    pub a12: f32,
    pub b1: f32,
    pub a21: f32,
    pub a22: f32,
    pub b2: f32,
}

impl AffineMatrix {
    /// 创建单位仿射矩阵
    pub fn identity() -> Self {
        Self::translation(0.0, 0.0)
    }

    /// 应用仿射变换到点 (x, y)
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a11 * x + self.a12 * y + self.b1,
            self.a21 * x + self.a22 * y + self.b2,
        )
    }

    /// 计算逆矩阵 (用于反向映射)
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a11 * self.a22 - self.a12 * self.a21;
        if det.abs() < 1e-10 {
            return None; // 矩阵不可逆
        }

        let inv_det = 1.0 / det;
        Some(Self {
            a11: self.a22 * inv_det,
            a12: -self.a12 * inv_det,
            b1: (self.a12 * self.b2 - self.a22 * self.b1) * inv_det,
            a21: -self.a21 * inv_det,
            a22: self.a11 * inv_det,
            b2: (self.a21 * self.b1 - self.a11 * self.b2) * inv_det,
        })
    }

    /// 创建平移矩阵
    pub fn translation(dx: f32, dy: f32) -> Self {
        Self {
            a11: 1.0,
            a12: 0.0,
            b1: dx,
            a21: 0.0,
            a22: 1.0,
            b2: dy,
        }
    }

    /// 创建缩放矩阵
    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a11: sx,
            a12: 0.0,
            b1: 0.0,
            a21: 0.0,
            a22: sy,
            b2: 0.0,
        }
    }

    /// 水平镜像 (x → width - x)
    pub fn flip_horizontal(width: f32) -> Self {
        Self {
            a11: -1.0,
            a12: 0.0,
            b1: width,
            a21: 0.0,
            a22: 1.0,
            b2: 0.0,
        }
    }

    /// 创建旋转矩阵 (角度制, 图像坐标系下正角度为逆时针)
    pub fn rotation(angle_degrees: f32) -> Self {
        let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();
        Self {
            a11: cos_a,
            a12: sin_a,
            b1: 0.0,
            a21: -sin_a,
            a22: cos_a,
            b2: 0.0,
        }
    }

    /// 创建围绕中心点旋转的矩阵
    pub fn rotation_around_center(center_x: f32, center_y: f32, angle_degrees: f32) -> Self {
        let t1 = Self::translation(-center_x, -center_y);
        let r = Self::rotation(angle_degrees);
        let t2 = Self::translation(center_x, center_y);
        t2.compose(&r.compose(&t1))
    }

    /// 矩阵组合 (self * other): 先 other 后 self
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            a11: self.a11 * other.a11 + self.a12 * other.a21,
            a12: self.a11 * other.a12 + self.a12 * other.a22,
            b1: self.a11 * other.b1 + self.a12 * other.b2 + self.b1,
            a21: self.a21 * other.a11 + self.a22 * other.a21,
            a22: self.a21 * other.a12 + self.a22 * other.a22,
            b2: self.a21 * other.b1 + self.a22 * other.b2 + self.b2,
        }
    }

    /// 矩形四个角变换后的外接矩形 (x1, y1, x2, y2)
    pub fn transform_rect(&self, (x1, y1, x2, y2): (f32, f32, f32, f32)) -> (f32, f32, f32, f32) {
        let corners = [
            self.transform_point(x1, y1),
            self.transform_point(x2, y1),
            self.transform_point(x1, y2),
            self.transform_point(x2, y2),
        ];
        corners.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(lx, ly, hx, hy), &(x, y)| (lx.min(x), ly.min(y), hx.max(x), hy.max(y)),
        )
    }
}

/// 插值方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterpolationMethod {
    Nearest,  // 最近邻插值
    Bilinear, // 双线性插值
}

/// 边界处理方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BorderMode {
    Constant(u8), // 常数填充
    Replicate,    // 边缘复制
    Reflect,      // 反射 (fedcba|abcdef)
    Reflect101,   // 反射不含边缘像素 (gfedcb|abcdef)
}

/// 仿射变换 (RGB图像)
///
/// 使用逆矩阵做反向映射; 矩阵不可逆时返回 None。
pub fn warp_affine(
    src: &RgbImage,
    matrix: &AffineMatrix,
    dst_size: (u32, u32),
    interpolation: InterpolationMethod,
    border_mode: BorderMode,
) -> Option<RgbImage> {
    let inv = matrix.inverse()?;
    let (dst_w, dst_h) = dst_size;

    let dst = RgbImage::from_fn(dst_w, dst_h, |dx, dy| {
        // 矩阵作用在像素边缘坐标上 (像素 i 占 [i, i+1)), 与标注框一致; 采样取像素中心
        let (sx, sy) = inv.transform_point(dx as f32 + 0.5, dy as f32 + 0.5);
        let (sx, sy) = (sx - 0.5, sy - 0.5);
        match interpolation {
            InterpolationMethod::Nearest => {
                border_pixel(src, sx.round() as i64, sy.round() as i64, border_mode)
            }
            InterpolationMethod::Bilinear => bilinear(src, sx, sy, border_mode),
        }
    });
    Some(dst)
}

fn bilinear(src: &RgbImage, x: f32, y: f32, border_mode: BorderMode) -> Rgb<u8> {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = border_pixel(src, x0, y0, border_mode);
    let p10 = border_pixel(src, x0 + 1, y0, border_mode);
    let p01 = border_pixel(src, x0, y0 + 1, border_mode);
    let p11 = border_pixel(src, x0 + 1, y0 + 1, border_mode);

    let mut out = [0u8; 3];
    for (c, v) in out.iter_mut().enumerate() {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        *v = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

fn border_pixel(src: &RgbImage, x: i64, y: i64, border_mode: BorderMode) -> Rgb<u8> {
    let (w, h) = (src.width() as i64, src.height() as i64);
    match (map_coord(x, w, border_mode), map_coord(y, h, border_mode)) {
        (Some(bx), Some(by)) => *src.get_pixel(bx as u32, by as u32),
        _ => match border_mode {
            BorderMode::Constant(val) => Rgb([val, val, val]),
            _ => Rgb([0, 0, 0]),
        },
    }
}

/// 单轴边界坐标处理
fn map_coord(p: i64, len: i64, border_mode: BorderMode) -> Option<i64> {
    if (0..len).contains(&p) {
        return Some(p);
    }
    if len <= 0 {
        return None;
    }
    match border_mode {
        BorderMode::Constant(_) => None,
        BorderMode::Replicate => Some(p.clamp(0, len - 1)),
        BorderMode::Reflect => {
            let period = 2 * len;
            let m = p.rem_euclid(period);
            Some(if m < len { m } else { period - 1 - m })
        }
        BorderMode::Reflect101 => {
            if len == 1 {
                return Some(0);
            }
            let period = 2 * (len - 1);
            let m = p.rem_euclid(period);
            Some(if m < len { m } else { period - m })
        }
    }
}
