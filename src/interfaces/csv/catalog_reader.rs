use crate::domain::purchase::SkuInfo;
use crate::error::{BillingError, Result};
use std::io::Read;

/// Reads store listings from a CSV source with the header
/// `product_id,title,price,currency`.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<SkuInfo>`.
/// It handles whitespace trimming automatically.
pub struct CatalogReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CatalogReader<R> {
    /// Creates a new `CatalogReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes listings.
    pub fn skus(self) -> impl Iterator<Item = Result<SkuInfo>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BillingError::from))
    }

    /// Reads the whole catalog, rejecting empty and duplicate product ids.
    pub fn read_all(self) -> Result<Vec<SkuInfo>> {
        let mut catalog: Vec<SkuInfo> = Vec::new();
        for sku in self.skus() {
            let sku = sku?;
            if sku.product_id.is_empty() {
                return Err(BillingError::ValidationError(
                    "catalog entry without product_id".to_string(),
                ));
            }
            if catalog.iter().any(|s| s.product_id == sku.product_id) {
                return Err(BillingError::ValidationError(format!(
                    "duplicate product_id {} in catalog",
                    sku.product_id
                )));
            }
            catalog.push(sku);
        }
        Ok(catalog)
    }
}
