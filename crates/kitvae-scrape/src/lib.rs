//! # kitvae-scrape
//!
//! Collects raw kit images from an online catalog. A catalog page lists item
//! links; each item page carries a title and a product image on a CDN. The
//! scraper pages through the catalog, keeps the links accepted by a
//! [`LinkFilter`], and saves every item image under a file name derived from
//! its title.

pub mod catalog;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod links;

pub use catalog::{CatalogScraper, ScrapeConfig};
pub use error::{ScrapeError, ScrapeResult};
pub use extract::{kit_file_name, CdnImageExtractor, ItemExtractor, KitPage};
pub use fetch::{HttpFetcher, PageFetcher, DEFAULT_USER_AGENT};
pub use links::{extract_links, KitLinkFilter, LinkFilter};
pub use url::Url;
