use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// 列出 `prefix` 底下以 `suffix` 結尾的物件，回傳排序後的相對路徑
    fn list_files(
        &self,
        prefix: &str,
        suffix: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
    /// 給日誌用的完整位置，例如 `gs://bucket/path`
    fn describe(&self, path: &str) -> String;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    type Extracted: Send;
    type Transformed: Send;
    type Output: Send;

    fn name(&self) -> &str;
    async fn extract(&self) -> Result<Self::Extracted>;
    async fn transform(&self, data: Self::Extracted) -> Result<Self::Transformed>;
    async fn load(&self, result: Self::Transformed) -> Result<Self::Output>;
}
