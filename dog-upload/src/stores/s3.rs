use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::BytesMut;
use futures_util::StreamExt;
use std::env;
use tokio_util::io::ReaderStream;

use crate::store::{ChunkStore, PutResult};
use crate::{ByteStream, UploadError, UploadResult};

/// Bodies larger than this are sent as multipart uploads, one part at a time
const PART_SIZE: usize = 8 * 1024 * 1024;

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub force_path_style: bool,
}

impl S3Config {
    /// Read `DOG_UPLOAD__S3_*` environment variables
    pub fn from_env() -> UploadResult<Self> {
        fn get_env(key: &str) -> UploadResult<String> {
            env::var(key).map_err(|_| UploadError::config(format!("{} environment variable required", key)))
        }

        Ok(Self {
            bucket: get_env("DOG_UPLOAD__S3_BUCKET")?,
            region: get_env("DOG_UPLOAD__S3_REGION")?,
            endpoint_url: env::var("DOG_UPLOAD__S3_ENDPOINT_URL").ok(),
            access_key_id: get_env("DOG_UPLOAD__S3_ACCESS_KEY_ID")?,
            secret_access_key: get_env("DOG_UPLOAD__S3_SECRET_ACCESS_KEY")?,
            force_path_style: env::var("DOG_UPLOAD__S3_FORCE_PATH_STYLE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        })
    }
}

/// S3-compatible store.
///
/// S3 objects are immutable, so this backend never offers native append and
/// sessions on it always take the merge path.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub async fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "dog-upload",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);
        if let Some(endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_config = loader.load().await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(config.force_path_style)
                .build(),
        );

        Self {
            client,
            bucket: config.bucket,
        }
    }

    /// Wrap an already configured client
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    async fn put_single(&self, path: &str, body: BytesMut) -> UploadResult<PutResult> {
        let size_bytes = body.len() as u64;
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(AwsByteStream::from(body.freeze()))
            .send()
            .await
            .map_err(UploadError::backend)?;

        Ok(PutResult {
            size_bytes,
            etag: output.e_tag().map(str::to_string),
        })
    }

    async fn upload_part(
        &self,
        path: &str,
        upload_id: &str,
        part_number: i32,
        body: BytesMut,
    ) -> UploadResult<CompletedPart> {
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(path)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(AwsByteStream::from(body.freeze()))
            .send()
            .await
            .map_err(UploadError::backend)?;

        Ok(CompletedPart::builder()
            .set_e_tag(output.e_tag().map(str::to_string))
            .part_number(part_number)
            .build())
    }

    /// Stream the remainder of `stream` as parts; `first` is already buffered
    async fn put_multipart(
        &self,
        path: &str,
        first: BytesMut,
        stream: &mut ByteStream,
    ) -> UploadResult<PutResult> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(UploadError::backend)?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| UploadError::storage("multipart upload returned no id"))?
            .to_string();

        match self.send_parts(path, &upload_id, first, stream).await {
            Ok(result) => Ok(result),
            Err(e) => {
                let _ = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(path)
                    .upload_id(&upload_id)
                    .send()
                    .await;
                Err(e)
            }
        }
    }

    async fn send_parts(
        &self,
        path: &str,
        upload_id: &str,
        mut buffer: BytesMut,
        stream: &mut ByteStream,
    ) -> UploadResult<PutResult> {
        let mut parts = Vec::new();
        let mut size_bytes = 0u64;

        loop {
            while buffer.len() >= PART_SIZE {
                let part = buffer.split_to(PART_SIZE);
                size_bytes += part.len() as u64;
                let number = parts.len() as i32 + 1;
                parts.push(self.upload_part(path, upload_id, number, part).await?);
            }

            match stream.next().await {
                Some(chunk) => buffer.extend_from_slice(&chunk?),
                None => break,
            }
        }

        if !buffer.is_empty() {
            size_bytes += buffer.len() as u64;
            let number = parts.len() as i32 + 1;
            parts.push(self.upload_part(path, upload_id, number, buffer).await?);
        }

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
            .send()
            .await
            .map_err(UploadError::backend)?;

        Ok(PutResult {
            size_bytes,
            etag: output.e_tag().map(str::to_string),
        })
    }

    async fn list_keys(&self, prefix: &str, delimiter: Option<&str>) -> UploadResult<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_delimiter(delimiter.map(str::to_string))
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(UploadError::backend)?;
            keys.extend(page.contents().iter().filter_map(|o| o.key().map(str::to_string)));
        }
        Ok(keys)
    }
}

fn dir_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_matches('/'))
}

#[async_trait]
impl ChunkStore for S3Store {
    async fn put(&self, path: &str, mut stream: ByteStream) -> UploadResult<PutResult> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
            if buffer.len() > PART_SIZE {
                return self.put_multipart(path, buffer, &mut stream).await;
            }
        }
        self.put_single(path, buffer).await
    }

    async fn read_stream(&self, path: &str) -> UploadResult<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(UploadError::backend)?;

        Ok(Box::pin(ReaderStream::new(output.body.into_async_read())))
    }

    async fn size(&self, path: &str) -> UploadResult<u64> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(UploadError::backend)?;

        Ok(head.content_length().unwrap_or(0).max(0) as u64)
    }

    async fn exists(&self, path: &str) -> UploadResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(UploadError::backend(e)),
        }
    }

    async fn list_files(&self, prefix: &str) -> UploadResult<Vec<String>> {
        self.list_keys(&dir_prefix(prefix), Some("/")).await
    }

    async fn delete(&self, path: &str) -> UploadResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(UploadError::backend)?;
        Ok(())
    }

    async fn delete_directory(&self, prefix: &str) -> UploadResult<bool> {
        let prefix = dir_prefix(prefix);
        if prefix == "/" {
            return Ok(false);
        }
        for key in self.list_keys(&prefix, None).await? {
            self.delete(&key).await?;
        }
        Ok(true)
    }

    fn driver(&self) -> &'static str {
        "s3"
    }
}
