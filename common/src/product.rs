use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique product identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A catalogue entry. Models may come with a 3D preview file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "ProductID")]
    pub id: ProductId,
    #[serde(rename = "ProductName")]
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Category", default)]
    pub category: String,
    /// Price in minor units.
    #[serde(rename = "Price")]
    pub price: u64,
    #[serde(rename = "Stock", default)]
    pub stock: u32,
    #[serde(rename = "ModelUrl", default)]
    pub model_url: Option<String>,
    #[serde(rename = "AverageRating", default)]
    pub average_rating: Option<f32>,
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn has_model_preview(&self) -> bool {
        self.model_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// A purchasable variant (size, colour, material) of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    #[serde(rename = "VariantID")]
    pub id: String,
    #[serde(rename = "ProductID")]
    pub product_id: ProductId,
    #[serde(rename = "VariantName")]
    pub name: String,
    #[serde(rename = "Price")]
    pub price: u64,
    #[serde(rename = "Stock", default)]
    pub stock: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "ReviewID")]
    pub id: String,
    #[serde(rename = "ProductID")]
    pub product_id: ProductId,
    #[serde(rename = "Username", default)]
    pub username: String,
    #[serde(rename = "Rating")]
    pub rating: u8,
    #[serde(rename = "Comment", default)]
    pub comment: String,
    #[serde(rename = "Status")]
    pub status: ReviewStatus,
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
}

/// Body for a new review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDraft {
    #[serde(rename = "Rating")]
    pub rating: u8,
    #[serde(rename = "Comment")]
    pub comment: String,
}

impl ReviewDraft {
    /// Ratings run from 1 to 5 stars.
    pub fn new(rating: u8, comment: impl Into<String>) -> Option<Self> {
        (1..=5).contains(&rating).then(|| Self {
            rating,
            comment: comment.into(),
        })
    }
}

// ---------- Catalogue browsing ----------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Newest,
    PriceLowToHigh,
    PriceHighToLow,
    Name,
    Rating,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(SortOrder::Newest),
            "price-asc" => Ok(SortOrder::PriceLowToHigh),
            "price-desc" => Ok(SortOrder::PriceHighToLow),
            "name" => Ok(SortOrder::Name),
            "rating" => Ok(SortOrder::Rating),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// Client-side catalogue filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub in_stock_only: bool,
    pub sort: SortOrder,
}

impl CatalogQuery {
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category) = &self.category {
            if !product.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !product.name.to_lowercase().contains(&needle)
                && !product.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| product.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price > max) {
            return false;
        }
        !self.in_stock_only || product.in_stock()
    }

    /// Filter then sort a fetched product list.
    pub fn apply(&self, products: &[Product]) -> Vec<Product> {
        let mut out: Vec<Product> = products.iter().filter(|p| self.matches(p)).cloned().collect();
        match self.sort {
            SortOrder::Newest => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortOrder::PriceLowToHigh => out.sort_by_key(|p| p.price),
            SortOrder::PriceHighToLow => out.sort_by(|a, b| b.price.cmp(&a.price)),
            SortOrder::Name => out.sort_by_key(|p| p.name.to_lowercase()),
            SortOrder::Rating => out.sort_by(|a, b| {
                let a = a.average_rating.unwrap_or(0.0);
                let b = b.average_rating.unwrap_or(0.0);
                b.total_cmp(&a)
            }),
        }
        out
    }
}

/// Distinct categories, sorted.
pub fn categories(products: &[Product]) -> Vec<String> {
    let set: std::collections::BTreeSet<String> = products
        .iter()
        .filter(|p| !p.category.is_empty())
        .map(|p| p.category.clone())
        .collect();
    set.into_iter().collect()
}
