// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 字体加载 (图表和检测标签共用)

use ab_glyph::FontVec;
use std::fs;
use std::path::PathBuf;

/// 依次尝试候选字体文件, 返回第一个能解析的
pub fn load_font(candidates: &[PathBuf]) -> Option<FontVec> {
    for path in candidates {
        let Ok(bytes) = fs::read(path) else {
            continue;
        };
        match FontVec::try_from_vec_and_index(bytes, 0) {
            Ok(font) => {
                log::info!("🔤 使用字体: {}", path.display());
                return Some(font);
            }
            Err(e) => log::warn!("字体无法解析 {}: {}", path.display(), e),
        }
    }
    log::warn!("⚠️ 没有找到可用字体, 文字将不被绘制");
    None
}
