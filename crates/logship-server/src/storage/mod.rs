use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    types::{Delete, ObjectIdentifier},
    Client,
};
use tracing::{debug, info, instrument};

pub mod config;

/// The object store operations the pipeline needs. S3 has no native rename,
/// so `rename` is emulated as copy-then-delete.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn list(&self, prefix: &str, max_keys: i32) -> Result<Vec<String>>;

    async fn download(&self, key: &str) -> Result<Vec<u8>>;

    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<()>;

    async fn delete(&self, keys: &[String]) -> Result<()>;

    async fn rename(&self, source_key: &str, dest_key: &str) -> Result<()> {
        self.copy(source_key, dest_key).await?;
        self.delete(&[source_key.to_string()]).await
    }
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(config: config::StorageConfig) -> Result<Self> {
        debug!("Initializing storage with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "logship-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let s3_config = s3_config_builder.build();
        let client = Client::from_conf(s3_config);

        info!("Storage client initialized for bucket: {}", config.bucket);

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }
}

#[async_trait]
impl ObjectStore for Storage {
    #[instrument(skip(self))]
    async fn list(&self, prefix: &str, max_keys: i32) -> Result<Vec<String>> {
        debug!(
            "Listing objects in s3://{}/{} (max: {})",
            self.bucket, prefix, max_keys
        );

        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(max_keys)
            .send()
            .await
            .context("Failed to list S3 objects")?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(|k| k.to_string()))
            .collect();

        Ok(keys)
    }

    #[instrument(skip(self))]
    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to download from S3: {}", key))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!(
            "Downloaded {} bytes from s3://{}/{}",
            data.len(),
            self.bucket,
            key
        );

        Ok(data)
    }

    #[instrument(skip(self))]
    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<()> {
        debug!(
            "Copying s3://{}/{} to s3://{}/{}",
            self.bucket, source_key, self.bucket, dest_key
        );

        let copy_source = format!("{}/{}", self.bucket, source_key);

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(&copy_source)
            .key(dest_key)
            .send()
            .await
            .context("Failed to copy S3 object")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, keys: &[String]) -> Result<()> {
        debug!("Deleting {} objects from s3://{}", keys.len(), self.bucket);

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Invalid object identifier")?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .context("Invalid delete request")?;

        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .context("Failed to delete S3 objects")?;

        Ok(())
    }
}
