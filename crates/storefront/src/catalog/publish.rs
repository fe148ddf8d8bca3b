//! Publishing a product together with its image.
//!
//! The product record is saved first. The image then goes through three
//! stages (presign, upload, confirm). Once the record exists it is never
//! discarded: an image failure is reported in the outcome alongside the
//! saved product.

use std::fmt;
use std::path::Path;

use secrecy::SecretString;
use serde::Serialize;
use tracing::{info, instrument, warn};

use ann_traders_core::{NewProduct, Product};

use super::{CatalogClient, CatalogError};
use crate::error::add_breadcrumb;

/// An image file ready to upload.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageUpload {
    filename: String,
    content_type: &'static str,
    bytes: Vec<u8>,
}

impl ImageUpload {
    /// Wrap image bytes, deriving the content type from the file extension.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnsupportedImage` if the extension is not a
    /// known image type.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self, CatalogError> {
        let filename = filename.into();
        let content_type = image_content_type(&filename)
            .ok_or_else(|| CatalogError::UnsupportedImage(filename.clone()))?;

        Ok(Self {
            filename,
            content_type,
            bytes,
        })
    }

    /// Read an image from disk.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnsupportedImage` for a non-image extension
    /// and `CatalogError::Io` if the file cannot be read.
    pub async fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| CatalogError::UnsupportedImage(path.display().to_string()))?
            .to_string();
        // Check the type before reading a possibly large file.
        if image_content_type(&filename).is_none() {
            return Err(CatalogError::UnsupportedImage(filename));
        }
        let bytes = tokio::fs::read(path).await?;
        Self::new(filename, bytes)
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        self.content_type
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn image_content_type(filename: &str) -> Option<&'static str> {
    let (_, extension) = filename.rsplit_once('.')?;
    match extension.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Stage of the image flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadStage {
    Presign,
    Upload,
    Confirm,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presign => write!(f, "presign"),
            Self::Upload => write!(f, "upload"),
            Self::Confirm => write!(f, "confirm"),
        }
    }
}

/// What happened to the image of a published product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImageOutcome {
    /// No image was supplied.
    NotRequested,
    /// The image is stored and linked to the product.
    Uploaded { key: String },
    /// The product was saved but its image was not.
    Failed { stage: UploadStage, reason: String },
}

/// Result of [`publish_product`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    /// The saved product record.
    pub product: Product,
    pub image: ImageOutcome,
}

/// Save a product, then upload and link its image if one is given.
///
/// # Errors
///
/// Returns an error only if the product itself could not be saved. Image
/// failures are reported through [`ImageOutcome::Failed`].
#[instrument(skip_all, fields(sku = %draft.sku, with_image = image.is_some()))]
pub async fn publish_product(
    catalog: &CatalogClient,
    draft: &NewProduct,
    image: Option<ImageUpload>,
    token: &SecretString,
) -> Result<PublishOutcome, CatalogError> {
    let product = catalog.create_product(draft, token).await?;
    let product_id = product.id.to_string();
    add_breadcrumb(
        "catalog",
        "Product created",
        Some(&[("product_id", product_id.as_str())]),
    );

    let image = match image {
        None => ImageOutcome::NotRequested,
        Some(image) => upload_for(catalog, &product, image, token).await,
    };

    match &image {
        ImageOutcome::Failed { stage, reason } => {
            warn!(product_id = %product.id, %stage, reason, "Product saved without image");
        }
        _ => info!(product_id = %product.id, "Product published"),
    }

    Ok(PublishOutcome { product, image })
}

async fn upload_for(
    catalog: &CatalogClient,
    product: &Product,
    image: ImageUpload,
    token: &SecretString,
) -> ImageOutcome {
    let failed = |stage, e: CatalogError| ImageOutcome::Failed {
        stage,
        reason: e.to_string(),
    };

    let target = match catalog
        .presign_upload(product.id, &image.filename, image.content_type, token)
        .await
    {
        Ok(target) => target,
        Err(e) => return failed(UploadStage::Presign, e),
    };

    if let Err(e) = catalog
        .upload_image(&target, image.content_type, image.bytes)
        .await
    {
        return failed(UploadStage::Upload, e);
    }

    if let Err(e) = catalog.confirm_upload(product.id, &target.key, token).await {
        return failed(UploadStage::Confirm, e);
    }

    ImageOutcome::Uploaded { key: target.key }
}
