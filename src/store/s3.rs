//! S3-backed blob store.

use crate::error::{PanforgeError, Result};
use crate::store::BlobStore;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use tracing::debug;

pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: String,
}

fn parse_uri(uri: &str) -> Result<(String, String)> {
    let rest = uri
        .strip_prefix("s3://")
        .ok_or_else(|| PanforgeError::Config(format!("not an s3:// URI: {uri}")))?;
    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket.to_string(), prefix.trim_matches('/').to_string()),
        None => (rest.to_string(), String::new()),
    };
    if bucket.is_empty() {
        return Err(PanforgeError::Config(format!("empty bucket in URI: {uri}")));
    }
    Ok((bucket, prefix))
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

fn strip_key<'a>(prefix: &str, full: &'a str) -> &'a str {
    if prefix.is_empty() {
        full
    } else {
        full.strip_prefix(prefix)
            .map(|key| key.trim_start_matches('/'))
            .unwrap_or(full)
    }
}

impl S3Store {
    /// Build a store from an `s3://bucket[/prefix]` URI using the ambient AWS
    /// credential chain.
    pub async fn from_uri(uri: &str) -> Result<Self> {
        let (bucket, prefix) = parse_uri(uri)?;
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self {
            client: Client::new(&config),
            bucket,
            prefix,
        })
    }

    fn full_key(&self, key: &str) -> String {
        join_key(&self.prefix, key)
    }

    fn store_err(&self, op: &str, key: &str, err: impl std::fmt::Display) -> PanforgeError {
        PanforgeError::Store(format!("{op} s3://{}/{key}: {err}", self.bucket))
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn exists(&self, key: &str) -> Result<bool> {
        let full = self.full_key(key);
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&full)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(self.store_err("head", &full, err))
                }
            }
        }
    }

    async fn get(&self, key: &str, dest: &Path) -> Result<()> {
        let full = self.full_key(key);
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full)
            .send()
            .await
            .map_err(|err| self.store_err("get", &full, err))?;
        let body = response
            .body
            .collect()
            .await
            .map_err(|err| self.store_err("read", &full, err))?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, body.into_bytes()).await?;
        debug!("fetched s3://{}/{full} to {}", self.bucket, dest.display());
        Ok(())
    }

    async fn put(&self, src: &Path, key: &str) -> Result<()> {
        let full = self.full_key(key);
        let body = ByteStream::from_path(src)
            .await
            .map_err(|err| self.store_err("stat", &full, err))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full)
            .body(body)
            .send()
            .await
            .map_err(|err| self.store_err("put", &full, err))?;
        debug!("uploaded {} to s3://{}/{full}", src.display(), self.bucket);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_prefix = self.full_key(prefix);
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&full_prefix)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| self.store_err("list", &full_prefix, err))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(strip_key(&self.prefix, key).to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<()> {
        for key in self.list(prefix).await? {
            let full = self.full_key(&key);
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&full)
                .send()
                .await
                .map_err(|err| self.store_err("delete", &full, err))?;
        }
        Ok(())
    }
}
