//! In-memory cart store.
//!
//! The cart is an ordered list of lines, one per product, in the order the
//! products were first added. It lives for one storefront session and is
//! never persisted.
//!
//! # Invariants
//!
//! - At most one line per product id.
//! - Every stored line has a quantity of at least 1; setting a quantity to
//!   zero removes the line.
//! - Totals are computed from the lines on every call.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{Price, Product, ProductId};

/// One product and its requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    product: Product,
    quantity: u32,
}

impl CartLine {
    #[must_use]
    pub const fn product(&self) -> &Product {
        &self.product
    }

    /// Quantity, always at least 1.
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.unit_price().times(self.quantity)
    }
}

/// The cart store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

/// Snapshot of a cart taken at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSummary {
    pub lines: Vec<CartLine>,
    pub total_quantity: u64,
    pub subtotal: Decimal,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Add `quantity` units of `product`.
    ///
    /// Increments the existing line for the same product id, otherwise
    /// appends a new line. A quantity of zero adds nothing.
    pub fn add_item(&mut self, product: Product, quantity: u32) {
        if quantity == 0 {
            return;
        }
        if let Some(line) = self.line_mut(product.id) {
            line.quantity = line.quantity.saturating_add(quantity);
        } else {
            self.lines.push(CartLine { product, quantity });
        }
    }

    /// Set the quantity of a line. Zero removes it; unknown ids are ignored.
    pub fn update_quantity(&mut self, product_id: ProductId, quantity: u32) {
        if quantity == 0 {
            self.remove_item(product_id);
        } else if let Some(line) = self.line_mut(product_id) {
            line.quantity = quantity;
        }
    }

    /// Add one unit to an existing line.
    pub fn increment(&mut self, product_id: ProductId) {
        if let Some(line) = self.line_mut(product_id) {
            line.quantity = line.quantity.saturating_add(1);
        }
    }

    /// Remove one unit from an existing line, dropping it at zero.
    pub fn decrement(&mut self, product_id: ProductId) {
        if let Some(quantity) = self.line(product_id).map(CartLine::quantity) {
            self.update_quantity(product_id, quantity - 1);
        }
    }

    /// Remove a line if present.
    pub fn remove_item(&mut self, product_id: ProductId) {
        self.lines.retain(|line| line.product.id != product_id);
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Take a snapshot of the cart and empty it.
    ///
    /// Returns `None` when there is nothing to check out.
    pub fn checkout(&mut self) -> Option<CheckoutSummary> {
        if self.is_empty() {
            return None;
        }
        let summary = CheckoutSummary {
            total_quantity: self.total_quantity(),
            subtotal: self.subtotal(),
            lines: std::mem::take(&mut self.lines),
        };
        Some(summary)
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.product.id == product_id)
    }

    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.line(product_id).map_or(0, CartLine::quantity)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Sum of price times quantity over all lines.
    ///
    /// Amounts are summed as-is; the catalog prices everything in one
    /// currency.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(|line| line.line_total().amount).sum()
    }

    fn line_mut(&mut self, product_id: ProductId) -> Option<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|line| line.product.id == product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CurrencyCode;

    fn product(id: i64, cents: i64) -> Product {
        Product {
            id: ProductId::new(id),
            sku: format!("SKU-{id}"),
            title: format!("Product {id}"),
            description: String::new(),
            price: Decimal::new(cents, 2),
            currency: CurrencyCode::USD,
            category: "misc".to_string(),
            image_url: None,
        }
    }

    fn assert_total_matches_lines(cart: &Cart) {
        let sum: u64 = cart.lines().iter().map(|l| u64::from(l.quantity())).sum();
        assert_eq!(cart.total_quantity(), sum);
        assert!(cart.lines().iter().all(|l| l.quantity() >= 1));
    }

    #[test]
    fn test_repeated_adds_sum_quantities() {
        let mut cart = Cart::new();
        for quantity in [1, 4, 2, 7] {
            cart.add_item(product(1, 100), quantity);
            assert_total_matches_lines(&cart);
        }
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.quantity_of(ProductId::new(1)), 14);
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let mut cart = Cart::new();
        cart.add_item(product(3, 100), 1);
        cart.add_item(product(1, 100), 1);
        cart.add_item(product(3, 100), 1);
        cart.add_item(product(2, 100), 1);

        let ids: Vec<i64> = cart.lines().iter().map(|l| l.product().id.as_i64()).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_add_zero_is_noop() {
        let mut cart = Cart::new();
        cart.add_item(product(1, 100), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_saturates() {
        let mut cart = Cart::new();
        cart.add_item(product(1, 100), u32::MAX);
        cart.add_item(product(1, 100), 5);
        assert_eq!(cart.quantity_of(ProductId::new(1)), u32::MAX);
    }

    #[test]
    fn test_update_to_zero_equals_remove() {
        let mut via_update = Cart::new();
        via_update.add_item(product(1, 100), 2);
        via_update.add_item(product(2, 100), 3);
        let mut via_remove = via_update.clone();

        via_update.update_quantity(ProductId::new(1), 0);
        via_remove.remove_item(ProductId::new(1));

        assert_eq!(via_update, via_remove);
        assert_total_matches_lines(&via_update);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let mut cart = Cart::new();
        cart.add_item(product(1, 100), 2);
        cart.update_quantity(ProductId::new(99), 5);
        cart.remove_item(ProductId::new(99));
        assert_eq!(cart.total_quantity(), 2);
    }

    #[test]
    fn test_increment_and_decrement() {
        let mut cart = Cart::new();
        cart.add_item(product(1, 100), 1);
        cart.increment(ProductId::new(1));
        assert_eq!(cart.quantity_of(ProductId::new(1)), 2);

        cart.decrement(ProductId::new(1));
        cart.decrement(ProductId::new(1));
        assert!(cart.is_empty());

        cart.decrement(ProductId::new(1));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut cart = Cart::new();
        cart.add_item(product(1, 100), 2);
        cart.add_item(product(2, 100), 1);
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.total_quantity(), 0);
        assert_eq!(cart.subtotal(), Decimal::ZERO);
    }

    #[test]
    fn test_add_update_remove_scenario() {
        let mut cart = Cart::new();
        let a = product(1, 100);
        cart.add_item(a.clone(), 2);
        cart.add_item(a.clone(), 3);
        assert_eq!(cart.total_quantity(), 5);
        cart.update_quantity(a.id, 1);
        assert_eq!(cart.total_quantity(), 1);
        cart.remove_item(a.id);
        assert!(cart.is_empty());
        assert_eq!(cart.total_quantity(), 0);
    }

    #[test]
    fn test_subtotal_and_line_totals() {
        let mut cart = Cart::new();
        cart.add_item(product(1, 250), 2);
        cart.add_item(product(2, 1999), 1);
        assert_eq!(cart.line(ProductId::new(1)).map(|l| l.line_total().to_string()).as_deref(), Some("$5.00"));
        assert_eq!(cart.subtotal(), Decimal::new(2499, 2));
    }

    #[test]
    fn test_checkout_takes_snapshot_and_empties() {
        let mut cart = Cart::new();
        assert!(cart.checkout().is_none());

        cart.add_item(product(1, 250), 2);
        cart.add_item(product(2, 100), 3);
        let summary = cart.checkout().expect("non-empty cart");

        assert_eq!(summary.lines.len(), 2);
        assert_eq!(summary.total_quantity, 5);
        assert_eq!(summary.subtotal, Decimal::new(800, 2));
        assert!(cart.is_empty());
    }
}
