// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 目标检测数据准备与训练流水线
// 抽帧 → 标注同步 → 数据增强 → 数据集划分 → 训练 → 指标图表 → 推理视频

pub mod annotation; // YOLO 标注格式与帧命名
pub mod augment; // 数据增强
pub mod config; // 流水线配置 (pipeline.json)
pub mod dataset; // 数据集划分与 data.yaml
pub mod detection; // 检测框, NMS, ONNX 推理, 绘制
pub mod error; // 错误类型
pub mod extract; // 抽帧
pub mod font; // 字体加载
pub mod geometry; // 仿射变换
pub mod menu; // 交互菜单
pub mod metrics; // 训练指标与图表
pub mod render; // 推理视频
pub mod report; // 批处理报告
pub mod sync; // 标注同步与复制
pub mod train; // 训练调用
pub mod video; // 视频读写后端

pub use crate::config::PipelineConfig;
pub use crate::error::{PipelineError, Result};
pub use crate::menu::{MenuAction, Pipeline};
pub use crate::report::{BatchReport, Diagnostic, DiagnosticKind};
