//! `ObjectStore` backed by Amazon S3 (or any S3-compatible endpoint).

use crate::services::object_store::{
    ETag, ObjectPage, ObjectStore, PutCondition, StoreError, StoreResult, StoredObject,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Region, http::HttpResponse},
    error::{DisplayErrorContext, SdkError},
    operation::get_object::GetObjectError,
    primitives::ByteStream,
};
use bytes::Bytes;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores; switches to path-style addressing.
    pub endpoint: Option<String>,
}

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from the default AWS provider chain (environment,
    /// profile, instance metadata) with the configured overrides applied.
    pub async fn new(cfg: S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &cfg.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: cfg.bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        let start = Instant::now();
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(output) => {
                let etag = output.e_tag().map(ETag::new);
                let body = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StoreError::Body {
                        key: key.to_string(),
                        message: e.to_string(),
                    })?
                    .into_bytes();
                debug!(key, latency_ms = start.elapsed().as_millis(), "S3 GET ok");
                Ok(Some(StoredObject { body, etag }))
            }
            Err(err) if is_no_such_key(&err) => {
                debug!(key, "S3 GET found nothing");
                Ok(None)
            }
            Err(err) => {
                let message = DisplayErrorContext(&err).to_string();
                warn!(key, bucket = %self.bucket, error = %message, "S3 GET failed");
                Err(StoreError::Get {
                    key: key.to_string(),
                    message,
                })
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        condition: PutCondition,
    ) -> StoreResult<Option<ETag>> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body));

        let request = match &condition {
            PutCondition::Overwrite => request,
            PutCondition::IfMatch(etag) => request.if_match(etag.as_str()),
            PutCondition::IfNoneMatch => request.if_none_match("*"),
        };

        match request.send().await {
            Ok(output) => {
                debug!(key, ?condition, "S3 PUT ok");
                Ok(output.e_tag().map(ETag::new))
            }
            // 412 for a stale version, 409 when another conditional write is in flight.
            Err(err) if matches!(http_status(&err), Some(412 | 409)) => {
                debug!(key, ?condition, "S3 PUT precondition failed");
                Err(StoreError::PreconditionFailed {
                    key: key.to_string(),
                })
            }
            Err(err) => {
                let message = DisplayErrorContext(&err).to_string();
                warn!(key, bucket = %self.bucket, error = %message, "S3 PUT failed");
                Err(StoreError::Put {
                    key: key.to_string(),
                    message,
                })
            }
        }
    }

    async fn list_page(
        &self,
        prefix: Option<&str>,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ObjectPage> {
        let max_keys = max_keys.clamp(1, 1000) as i32;
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(max_keys)
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(continuation.map(str::to_string))
            .send()
            .await
            .map_err(|err| {
                let message = DisplayErrorContext(&err).to_string();
                warn!(bucket = %self.bucket, error = %message, "S3 LIST failed");
                StoreError::List(message)
            })?;

        let keys: Vec<String> = output
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .map(str::to_string)
            .collect();

        let next_continuation =
            next_page_cursor(output.is_truncated(), output.next_continuation_token())
                .inspect_err(|err| warn!(bucket = %self.bucket, error = %err, "S3 LIST failed"))?;

        Ok(ObjectPage {
            keys,
            next_continuation,
        })
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

fn is_no_such_key(err: &SdkError<GetObjectError, HttpResponse>) -> bool {
    matches!(err.as_service_error(), Some(GetObjectError::NoSuchKey(_)))
        || http_status(err) == Some(404)
}

fn http_status<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response()
        .map(|response| response.status().as_u16())
}

/// A truncated page must carry a cursor, otherwise the rest of the bucket is unreachable.
fn next_page_cursor(is_truncated: Option<bool>, token: Option<&str>) -> StoreResult<Option<String>> {
    match (is_truncated.unwrap_or(false), token) {
        (false, _) => Ok(None),
        (true, Some(token)) if !token.is_empty() => Ok(Some(token.to_string())),
        (true, _) => Err(StoreError::List(
            "truncated listing without continuation token".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_page_has_no_cursor() {
        assert_eq!(next_page_cursor(Some(false), Some("stale")).unwrap(), None);
        assert_eq!(next_page_cursor(None, None).unwrap(), None);
    }

    #[test]
    fn truncated_page_follows_its_cursor() {
        assert_eq!(
            next_page_cursor(Some(true), Some("abc")).unwrap().as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn truncated_page_without_cursor_is_a_list_error() {
        for token in [None, Some("")] {
            let err = next_page_cursor(Some(true), token).unwrap_err();
            assert!(matches!(err, StoreError::List(_)));
        }
    }
}
