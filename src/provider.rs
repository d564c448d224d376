//! 파일 제공자
//!
//! 응답 세션은 이름으로 파일 내용을 요청할 뿐, 경로 해석은 제공자의 몫

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::Result;

/// 이름으로 파일 내용을 여는 제공자
pub trait FileProvider: Send + Sync + 'static {
    /// 파일 열기. 없거나 읽을 수 없으면 에러
    fn open(&self, name: &str) -> impl Future<Output = Result<Bytes>> + Send;
}

/// 디렉터리 기반 제공자
///
/// 루트 밖을 가리키는 이름(절대 경로, `..` 포함)은 없는 파일로 취급
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let inside = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        inside.then(|| self.root.join(relative))
    }
}

impl FileProvider for DirectoryProvider {
    async fn open(&self, name: &str) -> Result<Bytes> {
        let path = self.resolve(name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} escapes root", name))
        })?;
        debug!("파일 로드: {:?}", path);
        let data = tokio::fs::read(&path).await?;
        Ok(Bytes::from(data))
    }
}

/// 메모리 기반 제공자
#[derive(Debug, Default)]
pub struct MemoryProvider {
    files: RwLock<HashMap<String, Bytes>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 파일 등록 (같은 이름이면 교체)
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.files.write().insert(name.into(), data.into());
    }

    pub fn with_file(self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.insert(name, data);
        self
    }
}

impl FileProvider for MemoryProvider {
    async fn open(&self, name: &str) -> Result<Bytes> {
        let found = self.files.read().get(name).cloned();
        found.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()).into())
    }
}
