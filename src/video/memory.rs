// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 内存视频后端: 帧保存在进程内, 用于离线调试和测试

use image::RgbImage;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{FrameSink, FrameSource, VideoBackend, VideoInfo};
use crate::error::{PipelineError, Result};

type Store = Arc<Mutex<HashMap<PathBuf, (VideoInfo, Vec<RgbImage>)>>>;

/// 以路径为键保存帧序列
///
/// `create` 写出的视频在 `finish` 后可以再次 `open`, 同时在磁盘上留下
/// 一个占位文件, 方便按文件存在与否检查输出。
#[derive(Clone, Default)]
pub struct MemoryBackend {
    store: Store,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl AsRef<Path>, info: VideoInfo, frames: Vec<RgbImage>) {
        if let Ok(mut store) = self.store.lock() {
            store.insert(path.as_ref().to_path_buf(), (info, frames));
        }
    }

    /// 已写入的帧
    pub fn frames(&self, path: impl AsRef<Path>) -> Option<Vec<RgbImage>> {
        let store = self.store.lock().ok()?;
        store.get(path.as_ref()).map(|(_, frames)| frames.clone())
    }
}

impl VideoBackend for MemoryBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let store = self
            .store
            .lock()
            .map_err(|_| PipelineError::video(path, "store poisoned"))?;
        let (info, frames) = store
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::video(path, "no such video"))?;
        Ok(Box::new(MemorySource {
            info,
            frames: frames.into(),
        }))
    }

    fn create(&self, path: &Path, info: VideoInfo) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(MemorySink {
            path: path.to_path_buf(),
            info,
            frames: Vec::new(),
            store: Arc::clone(&self.store),
        }))
    }
}

struct MemorySource {
    info: VideoInfo,
    frames: VecDeque<RgbImage>,
}

impl FrameSource for MemorySource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.frames.pop_front())
    }
}

struct MemorySink {
    path: PathBuf,
    info: VideoInfo,
    frames: Vec<RgbImage>,
    store: Store,
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.info.width, self.info.height) {
            return Err(PipelineError::video(&self.path, "frame size mismatch"));
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let Self {
            path,
            info,
            frames,
            store,
        } = *self;
        fs::write(&path, format!("{} frames\n", frames.len()))
            .map_err(|e| PipelineError::io(&path, e))?;
        store
            .lock()
            .map_err(|_| PipelineError::video(&path, "store poisoned"))?
            .insert(path, (info, frames));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let backend = MemoryBackend::new();
        let info = VideoInfo {
            width: 4,
            height: 2,
            fps: 25.0,
        };

        let mut sink = backend.create(&path, info).unwrap();
        sink.write_frame(&RgbImage::from_pixel(4, 2, Rgb([1, 2, 3])))
            .unwrap();
        assert!(sink
            .write_frame(&RgbImage::new(3, 3))
            .is_err());
        sink.finish().unwrap();
        assert!(path.exists());

        let mut source = backend.open(&path).unwrap();
        assert_eq!(source.info(), info);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_open_unknown() {
        let backend = MemoryBackend::new();
        assert!(backend.open(Path::new("nope.mov")).is_err());
    }
}
