use crate::core::Storage;
use crate::utils::error::Result;
use futures::stream::{self, StreamExt};

/// 一個輸入檔案的讀取結果；個別檔案失敗不會中斷整批列舉
#[derive(Debug)]
pub struct FetchedFile {
    pub path: String,
    pub content: Result<Vec<u8>>,
}

impl FetchedFile {
    pub fn file_name(&self) -> &str {
        file_name(&self.path)
    }
}

pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Read every `*suffix` object under `prefix`, at most `concurrency` at a
/// time. Results keep the sorted listing order.
pub async fn read_all<S: Storage>(
    storage: &S,
    prefix: &str,
    suffix: &str,
    concurrency: usize,
) -> Result<Vec<FetchedFile>> {
    let paths = storage.list_files(prefix, suffix).await?;
    tracing::info!(
        "Found {} input file(s) under {}",
        paths.len(),
        storage.describe(prefix)
    );

    let files = stream::iter(paths)
        .map(|path| async move {
            let content = storage.read_file(&path).await;
            FetchedFile { path, content }
        })
        .buffered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    Ok(files)
}
