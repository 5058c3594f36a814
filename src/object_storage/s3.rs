use std::time::Duration;

use rusoto_core::credential::StaticProvider;
use rusoto_core::{HttpClient, Region};
use rusoto_s3::util::{PreSignedRequest, PreSignedRequestOption};
use rusoto_s3::{
    CopyObjectRequest, DeleteObjectRequest, GetObjectPresignRequest, GetObjectRequest, HeadObjectRequest,
    PutObjectRequest, S3Client, StreamingBody, S3 as RusotoS3,
};
use tokio::io::AsyncReadExt;
use tokio::runtime::Handle;

use crate::config::Config;

use super::errors::ObjectStorageError;
use super::{CredentialContext, ObjectMetadata, ObjectStorageGateway};

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    match Handle::try_current() {
        Ok(handle) => tokio::task::block_in_place(|| handle.block_on(f)),
        Err(_) => tokio::runtime::Runtime::new().expect("failed to start a tokio runtime").block_on(f),
    }
}

/// S3-compatible gateway backed by two `rusoto_s3::S3Client` instances, one
/// per credential context, since multi-part copies must be performed by the
/// original uploader principal.
pub struct S3Gateway {
    ims_client: S3Client,
    ims_credentials: StaticProvider,
    sts_client: S3Client,
    sts_credentials: StaticProvider,
    region: Region,
}

impl S3Gateway {
    pub fn from_config(config: &Config) -> S3Gateway {
        let region = Region::Custom {
            name: "ims".to_string(),
            endpoint: config.s3_endpoint.clone(),
        };

        let ims_credentials = StaticProvider::new(config.s3_access_key.clone(), config.s3_secret_key.clone(), None, None);
        let ims_client = S3Client::new_with(
            HttpClient::new().expect("unable to create S3 http client"),
            ims_credentials.clone(),
            region.clone(),
        );

        let sts_access_key = config.s3_sts_access_key.clone().unwrap_or_else(|| config.s3_access_key.clone());
        let sts_secret_key = config.s3_sts_secret_key.clone().unwrap_or_else(|| config.s3_secret_key.clone());
        let sts_credentials = StaticProvider::new(sts_access_key, sts_secret_key, None, None);
        let sts_region = match &config.s3_sts_endpoint {
            Some(endpoint) => Region::Custom {
                name: "ims-sts".to_string(),
                endpoint: endpoint.clone(),
            },
            None => region.clone(),
        };
        let sts_client = S3Client::new_with(
            HttpClient::new().expect("unable to create S3 STS http client"),
            sts_credentials.clone(),
            sts_region,
        );

        S3Gateway {
            ims_client,
            ims_credentials,
            sts_client,
            sts_credentials,
            region,
        }
    }

    fn client(&self, ctx: CredentialContext) -> &S3Client {
        match ctx {
            CredentialContext::Ims => &self.ims_client,
            CredentialContext::Sts => &self.sts_client,
        }
    }

    fn credentials(&self, ctx: CredentialContext) -> &StaticProvider {
        match ctx {
            CredentialContext::Ims => &self.ims_credentials,
            CredentialContext::Sts => &self.sts_credentials,
        }
    }
}

impl ObjectStorageGateway for S3Gateway {
    fn head(&self, ctx: CredentialContext, bucket: &str, key: &str) -> Result<ObjectMetadata, ObjectStorageError> {
        let client = self.client(ctx);
        let result = block_on(client.head_object(HeadObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            ..Default::default()
        }));

        match result {
            Ok(output) => Ok(ObjectMetadata {
                etag: super::normalize_etag(&output.e_tag.unwrap_or_default()),
                content_length: output.content_length.unwrap_or(0).max(0) as u64,
            }),
            Err(e) => {
                if is_not_found(&e) {
                    return Err(ObjectStorageError::ObjectNotFound {
                        bucket_name: bucket.to_string(),
                        key: key.to_string(),
                    });
                }
                Err(ObjectStorageError::CannotHeadObject {
                    bucket_name: bucket.to_string(),
                    key: key.to_string(),
                    raw_error_message: e.to_string(),
                })
            }
        }
    }

    fn get(&self, ctx: CredentialContext, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStorageError> {
        let client = self.client(ctx);
        let result = block_on(client.get_object(GetObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            ..Default::default()
        }));

        let output = result.map_err(|e| ObjectStorageError::CannotGetObjectFile {
            bucket_name: bucket.to_string(),
            key: key.to_string(),
            raw_error_message: e.to_string(),
        })?;

        let body = output.body.ok_or_else(|| ObjectStorageError::CannotGetObjectFile {
            bucket_name: bucket.to_string(),
            key: key.to_string(),
            raw_error_message: "empty response body".to_string(),
        })?;

        let mut buf = Vec::new();
        block_on(body.into_async_read().read_to_end(&mut buf)).map_err(|e| ObjectStorageError::CannotGetObjectFile {
            bucket_name: bucket.to_string(),
            key: key.to_string(),
            raw_error_message: e.to_string(),
        })?;

        Ok(buf)
    }

    fn put(&self, ctx: CredentialContext, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ObjectStorageError> {
        let client = self.client(ctx);
        block_on(client.put_object(PutObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body: Some(StreamingBody::from(body)),
            ..Default::default()
        }))
        .map(|_| ())
        .map_err(|e| ObjectStorageError::CannotUploadFile {
            bucket_name: bucket.to_string(),
            key: key.to_string(),
            raw_error_message: e.to_string(),
        })
    }

    fn delete(&self, ctx: CredentialContext, bucket: &str, key: &str) -> Result<(), ObjectStorageError> {
        let client = self.client(ctx);
        block_on(client.delete_object(DeleteObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            ..Default::default()
        }))
        .map(|_| ())
        .map_err(|e| ObjectStorageError::CannotDeleteFile {
            bucket_name: bucket.to_string(),
            key: key.to_string(),
            raw_error_message: e.to_string(),
        })
    }

    fn copy(
        &self,
        ctx: CredentialContext,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<ObjectMetadata, ObjectStorageError> {
        let client = self.client(ctx);
        let copy_source = format!("{src_bucket}/{src_key}");

        block_on(client.copy_object(CopyObjectRequest {
            bucket: dst_bucket.to_string(),
            key: dst_key.to_string(),
            copy_source,
            ..Default::default()
        }))
        .map_err(|e| ObjectStorageError::CannotCopyFile {
            src_bucket: src_bucket.to_string(),
            src_key: src_key.to_string(),
            dst_bucket: dst_bucket.to_string(),
            dst_key: dst_key.to_string(),
            raw_error_message: e.to_string(),
        })?;

        self.head(ctx, dst_bucket, dst_key)
    }

    fn presign_get(
        &self,
        ctx: CredentialContext,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStorageError> {
        let request = GetObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            ..Default::default()
        };

        let options = PreSignedRequestOption { expires_in: ttl };
        let credentials = Self::static_credentials(self.credentials(ctx));

        Ok(request.get_presigned_url(&self.region, &credentials, &options))
    }
}

impl S3Gateway {
    /// `PreSignedRequest` needs a resolved `AwsCredentials` value, not the
    /// provider; static credentials resolve instantly and never rotate
    /// mid-process, so this is safe to call per presign.
    fn static_credentials(provider: &StaticProvider) -> rusoto_core::credential::AwsCredentials {
        use rusoto_core::credential::ProvideAwsCredentials;
        block_on(provider.credentials()).expect("static credentials never fail")
    }
}

fn is_not_found(err: &rusoto_core::RusotoError<rusoto_s3::HeadObjectError>) -> bool {
    matches!(err, rusoto_core::RusotoError::Unknown(resp) if resp.status.as_u16() == 404)
}
