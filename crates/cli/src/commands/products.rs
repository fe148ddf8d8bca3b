//! Catalog commands.
//!
//! # Usage
//!
//! ```bash
//! ann-cli products list
//! ann-cli products show 42
//! ann-cli products add --sku TEA-1 --title "Green Tea" --description "Loose leaf" \
//!     --price 12.50 --category tea --image ./tea.png
//! ```

use std::path::Path;

use ann_traders_core::{CurrencyCode, NewProduct, Product, ProductId, RouteDecision};
use ann_traders_storefront::catalog::{ImageOutcome, ImageUpload, publish_product};
use ann_traders_storefront::routes::Route;
use ann_traders_storefront::{AppError, AppState};

/// Product fields as typed on the command line.
pub struct Draft {
    pub sku: String,
    pub title: String,
    pub description: String,
    pub price: String,
    pub currency: CurrencyCode,
    pub category: String,
}

impl Draft {
    fn into_new_product(self) -> Result<NewProduct, AppError> {
        let product = NewProduct {
            price: NewProduct::parse_price(&self.price)?,
            sku: self.sku.trim().to_string(),
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            currency: self.currency,
            category: self.category.trim().to_string(),
        };
        product.validate()?;
        Ok(product)
    }
}

pub async fn list(state: &AppState) -> Result<(), AppError> {
    let products = state.catalog().list_products().await?;
    if products.is_empty() {
        println!("No products yet.");
        return Ok(());
    }
    for product in &products {
        print_row(product);
    }
    Ok(())
}

pub async fn show(state: &AppState, id: ProductId) -> Result<(), AppError> {
    let product = state.catalog().get_product(id).await?;
    print_detail(&product);
    Ok(())
}

pub async fn add(state: &AppState, draft: Draft, image: Option<&Path>) -> Result<(), AppError> {
    state.session().restore_session().await;

    match state.session().decide(Route::AddProduct.access()) {
        RouteDecision::Allow => {}
        RouteDecision::RedirectToLogin => {
            return Err(AppError::Unauthorized(
                "sign in with `ann-cli login` first".to_string(),
            ));
        }
        RouteDecision::RedirectToHome => {
            return Err(AppError::Unauthorized(
                "only admins can add products".to_string(),
            ));
        }
    }
    let token = state
        .session()
        .bearer_token()
        .ok_or_else(|| AppError::Unauthorized("session ended".to_string()))?;

    let draft = draft.into_new_product()?;
    let image = match image {
        Some(path) => Some(ImageUpload::from_path(path).await?),
        None => None,
    };

    let outcome = publish_product(state.catalog(), &draft, image, &token).await?;
    println!("Product metadata saved (id {}).", outcome.product.id);
    match outcome.image {
        ImageOutcome::NotRequested => {}
        ImageOutcome::Uploaded { key } => println!("Image uploaded and linked ({key})."),
        ImageOutcome::Failed { stage, reason } => {
            println!("Image {stage} failed: {reason}");
            println!("The product was saved without an image.");
        }
    }
    Ok(())
}

/// One-line summary used by listings.
pub fn print_row(product: &Product) {
    println!(
        "{:>6}  {:<28}  {:>10}  {}",
        product.id,
        product.title,
        product.unit_price().to_string(),
        product.category
    );
}

pub fn print_detail(product: &Product) {
    println!("{} ({})", product.title, product.sku);
    println!("  Price:    {}", product.unit_price());
    println!("  Category: {}", product.category);
    if !product.description.is_empty() {
        println!("  {}", product.description);
    }
    if let Some(url) = &product.image_url {
        println!("  Image:    {url}");
    }
}
