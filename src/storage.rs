use crate::error::{Result, SqueezeError};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Head-only view of a stored object: metadata and headers, no body.
#[derive(Debug, Clone, Default)]
pub struct ObjectHead {
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct FetchedObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PutRequest {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub cache_control: String,
    pub acl: String,
    pub metadata: HashMap<String, String>,
}

/// One page of a bucket listing, in the backend's native key order.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub is_truncated: bool,
}

/// Narrow storage capability injected into every component that touches the
/// bucket. Implementations must be shareable across workers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<FetchedObject>;

    async fn put_object(&self, request: PutRequest) -> Result<()>;

    /// Lists up to `max_keys` keys lexically after `start_after`, restricted
    /// to `prefix` when given. `is_truncated` signals that more pages exist.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        start_after: Option<&str>,
        max_keys: i32,
    ) -> Result<ListPage>;
}

/// S3-backed store using the ambient AWS environment (credentials chain,
/// region, endpoint overrides).
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub async fn from_env() -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_s3::Client::new(&shared),
        }
    }

    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| SqueezeError::Storage(format!("head {bucket}/{key}: {e}")))?;

        Ok(ObjectHead {
            content_length: response.content_length(),
            content_type: response.content_type().map(str::to_string),
            metadata: response.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<FetchedObject> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| SqueezeError::Storage(format!("get {bucket}/{key}: {e}")))?;

        let content_type = response.content_type().map(str::to_string);
        let body = response
            .body
            .collect()
            .await
            .map_err(|e| SqueezeError::Storage(format!("read body of {bucket}/{key}: {e}")))?
            .into_bytes()
            .to_vec();

        Ok(FetchedObject { body, content_type })
    }

    async fn put_object(&self, request: PutRequest) -> Result<()> {
        let PutRequest {
            bucket,
            key,
            body,
            content_type,
            cache_control,
            acl,
            metadata,
        } = request;

        self.client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .set_content_type(content_type)
            .cache_control(cache_control)
            .acl(ObjectCannedAcl::from(acl.as_str()))
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| SqueezeError::Storage(format!("put {bucket}/{key}: {e}")))?;

        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        start_after: Option<&str>,
        max_keys: i32,
    ) -> Result<ListPage> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(max_keys)
            .set_prefix(prefix.map(str::to_string))
            .set_start_after(start_after.map(str::to_string))
            .send()
            .await
            .map_err(|e| SqueezeError::Storage(format!("list {bucket}: {e}")))?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .map(str::to_string)
            .collect();

        Ok(ListPage {
            keys,
            is_truncated: response.is_truncated().unwrap_or(false),
        })
    }
}

/// A stored object as the in-memory fake keeps it, including the write
/// attributes a test may want to assert on.
#[derive(Debug, Clone, Default)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub acl: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl StoredObject {
    pub fn new(body: Vec<u8>, content_type: Option<&str>) -> Self {
        Self {
            body,
            content_type: content_type.map(str::to_string),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct MemoryInner {
    // bucket -> key -> object; BTreeMap keeps listing order lexicographic.
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    head_calls: usize,
    get_calls: usize,
    put_calls: usize,
    list_calls: usize,
}

/// In-memory `ObjectStore` used by the test suites. Tracks per-operation
/// call counts so tests can assert on traffic, not just final state.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, object: StoredObject) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        let inner = self.inner.lock().unwrap();
        inner
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn head_calls(&self) -> usize {
        self.inner.lock().unwrap().head_calls
    }

    pub fn get_calls(&self) -> usize {
        self.inner.lock().unwrap().get_calls
    }

    pub fn put_calls(&self) -> usize {
        self.inner.lock().unwrap().put_calls
    }

    pub fn list_calls(&self) -> usize {
        self.inner.lock().unwrap().list_calls
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead> {
        let mut inner = self.inner.lock().unwrap();
        inner.head_calls += 1;
        let object = inner
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| SqueezeError::Storage(format!("head {bucket}/{key}: not found")))?;

        Ok(ObjectHead {
            content_length: Some(object.body.len() as i64),
            content_type: object.content_type.clone(),
            metadata: object.metadata.clone(),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<FetchedObject> {
        let mut inner = self.inner.lock().unwrap();
        inner.get_calls += 1;
        let object = inner
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| SqueezeError::Storage(format!("get {bucket}/{key}: not found")))?;

        Ok(FetchedObject {
            body: object.body.clone(),
            content_type: object.content_type.clone(),
        })
    }

    async fn put_object(&self, request: PutRequest) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.put_calls += 1;
        inner
            .buckets
            .entry(request.bucket)
            .or_default()
            .insert(
                request.key,
                StoredObject {
                    body: request.body,
                    content_type: request.content_type,
                    cache_control: Some(request.cache_control),
                    acl: Some(request.acl),
                    metadata: request.metadata,
                },
            );
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        start_after: Option<&str>,
        max_keys: i32,
    ) -> Result<ListPage> {
        let mut inner = self.inner.lock().unwrap();
        inner.list_calls += 1;

        let matching: Vec<String> = inner
            .buckets
            .get(bucket)
            .map(|objects| {
                objects
                    .keys()
                    .filter(|key| prefix.is_none_or(|p| key.starts_with(p)))
                    .filter(|key| start_after.is_none_or(|marker| key.as_str() > marker))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let page_len = max_keys.max(0) as usize;
        let is_truncated = matching.len() > page_len;
        Ok(ListPage {
            keys: matching.into_iter().take(page_len).collect(),
            is_truncated,
        })
    }
}
