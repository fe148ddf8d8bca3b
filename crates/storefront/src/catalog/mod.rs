//! Product catalog REST API client.
//!
//! # Endpoints
//!
//! - `GET /products` and `GET /products/{id}` (public)
//! - `GET /products/{id}/image-url` (public, short-lived image link)
//! - `POST /products` (Bearer token)
//! - `POST /products/{id}/presign-upload` -> `{url, key}` (Bearer token)
//! - `PUT <presigned url>` with the image bytes (no token)
//! - `POST /products/{id}/confirm-upload` with `{key}` (Bearer token)
//!
//! Reads are cached with `moka`. Any write that changes what a read would
//! return clears the cache.

mod publish;

pub use publish::{ImageOutcome, ImageUpload, PublishOutcome, UploadStage, publish_product};

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use moka::future::Cache;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use ann_traders_core::{NewProduct, Product, ProductError, ProductId};

use crate::config::StorefrontConfig;

const CACHE_CAPACITY: u64 = 1000;

/// Image-url lookups in flight at once while listing.
const IMAGE_URL_CONCURRENCY: usize = 8;

/// Errors that can occur when talking to the catalog API.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or rejected bearer token.
    #[error("Not authorized for this catalog operation")]
    Unauthorized,

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success response.
    #[error("Catalog API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The presign response lacked a URL or key.
    #[error("Presign response missing url/key")]
    MissingPresignFields,

    /// The product draft failed validation.
    #[error("Invalid product: {0}")]
    InvalidProduct(#[from] ProductError),

    /// The file is not an image type the catalog accepts.
    #[error("Unsupported image file: {0}")]
    UnsupportedImage(String),

    /// Reading a local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Target of a presigned image upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUpload {
    /// Presigned `PUT` URL.
    pub url: String,
    /// Object key to confirm once the upload is done.
    pub key: String,
}

#[derive(Debug, Clone)]
enum CacheValue {
    Product(Box<Product>),
    Products(Vec<Product>),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignRequest<'a> {
    filename: &'a str,
    content_type: &'a str,
}

#[derive(Deserialize)]
struct PresignResponse {
    url: Option<String>,
    key: Option<String>,
}

#[derive(Serialize)]
struct ConfirmRequest<'a> {
    key: &'a str,
}

#[derive(Deserialize)]
struct ImageUrlResponse {
    url: Option<String>,
}

/// Client for the catalog REST API.
#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogClientInner>,
}

struct CatalogClientInner {
    client: reqwest::Client,
    base_url: String,
    cache: Cache<String, CacheValue>,
}

impl CatalogClient {
    /// Create a client for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration, cache_ttl: Duration) -> Result<Self, CatalogError> {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(cache_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(CatalogClientInner {
                client: reqwest::Client::builder().timeout(timeout).build()?,
                base_url: base_url.trim_end_matches('/').to_string(),
                cache,
            }),
        })
    }

    /// Create a client from the storefront configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &StorefrontConfig) -> Result<Self, CatalogError> {
        Self::new(&config.api_url, config.http_timeout, config.catalog_cache_ttl)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.base_url)
    }

    /// Send a request and turn non-success statuses into errors.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, CatalogError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::NOT_FOUND => Err(CatalogError::NotFound(what.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CatalogError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(1);
                Err(CatalogError::RateLimited(retry_after))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(
                    status = %status,
                    what,
                    body = %body.chars().take(500).collect::<String>(),
                    "Catalog API returned non-success status"
                );
                Err(CatalogError::Status {
                    status: status.as_u16(),
                    body: body.chars().take(200).collect(),
                })
            }
        }
    }

    /// Read a JSON body, logging what could not be parsed.
    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, CatalogError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse catalog response"
            );
            CatalogError::Parse(e)
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// List all products.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        let cache_key = "products".to_string();

        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let response = self
            .send(self.inner.client.get(self.url("/products")), "products")
            .await?;
        let products: Vec<Product> = Self::json(response).await?;
        let products: Vec<Product> = stream::iter(products)
            .map(|mut product| async move {
                self.attach_image_url(&mut product).await;
                product
            })
            .buffered(IMAGE_URL_CONCURRENCY)
            .collect()
            .await;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(products.clone()))
            .await;

        Ok(products)
    }

    /// Get a product by id.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the product does not exist.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        let cache_key = format!("product:{id}");

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let response = self
            .send(
                self.inner.client.get(self.url(&format!("/products/{id}"))),
                &format!("product {id}"),
            )
            .await?;
        let mut product: Product = Self::json(response).await?;
        self.attach_image_url(&mut product).await;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    /// Short-lived download URL for a product's image, if it has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn image_url(&self, id: ProductId) -> Result<Option<String>, CatalogError> {
        let response = self
            .send(
                self.inner
                    .client
                    .get(self.url(&format!("/products/{id}/image-url"))),
                &format!("image for product {id}"),
            )
            .await?;
        let body: ImageUrlResponse = Self::json(response).await?;
        Ok(body.url.filter(|url| !url.is_empty()))
    }

    /// Fill in `image_url` when the record does not carry one. Failures
    /// leave the product without an image.
    async fn attach_image_url(&self, product: &mut Product) {
        if product.image_url.is_some() {
            return;
        }
        match self.image_url(product.id).await {
            Ok(url) => product.image_url = url,
            Err(e) => debug!(product_id = %product.id, error = %e, "No image for product"),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create a product. The draft is validated first.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::InvalidProduct` for a bad draft, or an error
    /// if the API rejects the request.
    #[instrument(skip(self, product, token), fields(sku = %product.sku))]
    pub async fn create_product(
        &self,
        product: &NewProduct,
        token: &SecretString,
    ) -> Result<Product, CatalogError> {
        product.validate()?;

        let request = self
            .inner
            .client
            .post(self.url("/products"))
            .header(AUTHORIZATION, bearer(token))
            .json(product);
        let response = self.send(request, "products").await?;
        let saved: Product = Self::json(response).await?;

        self.inner.cache.invalidate_all();
        debug!(product_id = %saved.id, "Product created");
        Ok(saved)
    }

    /// Ask the API for a presigned upload URL for the product's image.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::MissingPresignFields` if the response lacks a
    /// URL or key, or an error if the API request fails.
    #[instrument(skip(self, token), fields(product_id = %id))]
    pub async fn presign_upload(
        &self,
        id: ProductId,
        filename: &str,
        content_type: &str,
        token: &SecretString,
    ) -> Result<PresignedUpload, CatalogError> {
        let request = self
            .inner
            .client
            .post(self.url(&format!("/products/{id}/presign-upload")))
            .header(AUTHORIZATION, bearer(token))
            .json(&PresignRequest {
                filename,
                content_type,
            });
        let response = self.send(request, &format!("product {id}")).await?;
        let body: PresignResponse = Self::json(response).await?;

        match (body.url, body.key) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => {
                Ok(PresignedUpload { url, key })
            }
            _ => Err(CatalogError::MissingPresignFields),
        }
    }

    /// Upload image bytes to a presigned URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage service rejects the upload.
    #[instrument(skip(self, upload, bytes), fields(key = %upload.key, size = bytes.len()))]
    pub async fn upload_image(
        &self,
        upload: &PresignedUpload,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), CatalogError> {
        let request = self
            .inner
            .client
            .put(&upload.url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes);
        self.send(request, "upload target").await?;
        Ok(())
    }

    /// Link an uploaded object to its product.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, token), fields(product_id = %id))]
    pub async fn confirm_upload(
        &self,
        id: ProductId,
        key: &str,
        token: &SecretString,
    ) -> Result<(), CatalogError> {
        let request = self
            .inner
            .client
            .post(self.url(&format!("/products/{id}/confirm-upload")))
            .header(AUTHORIZATION, bearer(token))
            .json(&ConfirmRequest { key });
        self.send(request, &format!("product {id}")).await?;

        self.inner.cache.invalidate_all();
        Ok(())
    }
}

fn bearer(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
