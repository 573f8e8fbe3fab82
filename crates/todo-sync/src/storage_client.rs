//! Object storage client for to-do image blobs

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use todo_sync_api::{RemoteBlobStore, Result, SyncError};
use tracing::{debug, info};

use crate::http::SupabaseHttp;

pub struct StorageClient {
    http: SupabaseHttp,
    bucket: String,
}

impl StorageClient {
    pub fn new(http: SupabaseHttp, bucket: impl Into<String>) -> Self {
        Self {
            http,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object URL with the bucket and every path segment percent-encoded
    fn object_url(&self, path: &str) -> Result<Url> {
        let root = self.http.url("storage/v1/object");
        let mut url = Url::parse(&root).map_err(|e| {
            SyncError::remote("storage", format!("invalid storage URL {}: {}", root, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| SyncError::remote("storage", format!("{} cannot take a path", root)))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }
}

#[async_trait]
impl RemoteBlobStore for StorageClient {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = self.object_url(path)?;
        let len = bytes.len();
        let request = self
            .http
            .client()
            .post(url.clone())
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.http.execute(request, url.as_str(), "upload").await?;

        info!(
            "[StorageClient] Uploaded {} ({} bytes, {}) to bucket {}",
            path, len, content_type, self.bucket
        );
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.object_url(path)?;
        let request = self.http.client().get(url.clone());
        let bytes = self.http.execute(request, url.as_str(), "download").await?;

        debug!(
            "[StorageClient] Downloaded {} ({} bytes) from bucket {}",
            path,
            bytes.len(),
            self.bucket
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client() -> StorageClient {
        let http =
            SupabaseHttp::new("https://demo.supabase.co", "key", Duration::from_secs(5)).unwrap();
        StorageClient::new(http, "todos_images")
    }

    #[test]
    fn test_object_url() {
        let client = client();
        assert_eq!(client.bucket(), "todos_images");
        assert_eq!(
            client.object_url("abc.jpg").unwrap().as_str(),
            "https://demo.supabase.co/storage/v1/object/todos_images/abc.jpg"
        );
        assert_eq!(
            client.object_url("/nested/abc.jpg").unwrap().as_str(),
            "https://demo.supabase.co/storage/v1/object/todos_images/nested/abc.jpg"
        );
    }

    #[test]
    fn test_object_url_encodes_path_segments() {
        let url = client().object_url("my photo?v=1#top.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://demo.supabase.co/storage/v1/object/todos_images/my%20photo%3Fv=1%23top.png"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }
}
