//! Catalog crawling and downloading.

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{ScrapeError, ScrapeResult},
    extract::ItemExtractor,
    fetch::PageFetcher,
    links::{extract_links, LinkFilter},
};

/// Crawl limits and pacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeConfig {
    /// Highest catalog page requested (`?page=N`).
    pub max_pages: usize,
    /// Pause between item downloads.
    pub delay: Duration,
    /// Whether existing files are downloaded again.
    pub overwrite: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            delay: Duration::from_millis(1500),
            overwrite: false,
        }
    }
}

/// Collects item links from a catalog and downloads each item's image.
#[derive(Debug)]
pub struct CatalogScraper<F: PageFetcher> {
    fetcher: F,
    config: ScrapeConfig,
}

impl<F: PageFetcher> CatalogScraper<F> {
    pub const fn new(fetcher: F, config: ScrapeConfig) -> Self {
        Self { fetcher, config }
    }

    /// Item links of every catalog page, in first-seen order.
    ///
    /// Pages `2, 3, ...` are requested until one adds no new link, fails, or
    /// `max_pages` is reached.
    ///
    /// # Errors
    ///
    /// Fails when the catalog URL is invalid or its first page cannot be fetched.
    pub fn collect_links(
        &self,
        catalog_url: &str,
        filter: &dyn LinkFilter,
    ) -> ScrapeResult<Vec<Url>> {
        let base = Url::parse(catalog_url).map_err(|source| ScrapeError::InvalidUrl {
            url: catalog_url.to_string(),
            source,
        })?;

        let first = self.fetcher.fetch_text(base.as_str())?;
        let mut links = extract_links(&first, &base, filter);
        debug!(page = 1, links = links.len(), "catalog page");

        for page in 2..=self.config.max_pages {
            let page_url = page_url(&base, page);
            let html = match self.fetcher.fetch_text(page_url.as_str()) {
                Ok(html) => html,
                Err(e) => {
                    debug!(page, error = %e, "stopping pagination");
                    break;
                }
            };

            let before = links.len();
            for link in extract_links(&html, &page_url, filter) {
                if !links.contains(&link) {
                    links.push(link);
                }
            }
            debug!(page, new_links = links.len() - before, "catalog page");
            if links.len() == before {
                break;
            }
        }

        info!(catalog = catalog_url, items = links.len(), "collected item links");
        Ok(links)
    }

    /// Downloads one item page's image into `dest`.
    pub fn download_item(
        &self,
        item_url: &Url,
        extractor: &dyn ItemExtractor,
        dest: &Path,
    ) -> ScrapeResult<PathBuf> {
        let html = self.fetcher.fetch_text(item_url.as_str())?;
        let page = extractor.extract(&html, item_url)?;
        let path = dest.join(page.file_name());

        if path.exists() && !self.config.overwrite {
            debug!(path = %path.display(), "already downloaded");
            return Ok(path);
        }

        let bytes = self.fetcher.fetch_bytes(page.image_url.as_str())?;
        fs::write(&path, bytes).map_err(|source| ScrapeError::Io {
            path: path.clone(),
            source,
        })?;
        info!(title = %page.title, path = %path.display(), "saved");
        Ok(path)
    }

    /// Scrapes a catalog into `dest`, returning the saved files.
    ///
    /// Items that fail are logged and skipped.
    pub fn scrape(
        &self,
        catalog_url: &str,
        filter: &dyn LinkFilter,
        extractor: &dyn ItemExtractor,
        dest: &Path,
    ) -> ScrapeResult<Vec<PathBuf>> {
        fs::create_dir_all(dest).map_err(|source| ScrapeError::Io {
            path: dest.to_path_buf(),
            source,
        })?;

        let links = self.collect_links(catalog_url, filter)?;
        let mut saved = Vec::with_capacity(links.len());

        for (index, link) in links.iter().enumerate() {
            if index > 0 && !self.config.delay.is_zero() {
                thread::sleep(self.config.delay);
            }

            match self.download_item(link, extractor, dest) {
                Ok(path) => saved.push(path),
                Err(e) => warn!(url = %link, error = %e, "skipping item"),
            }
        }

        info!(
            catalog = catalog_url,
            saved = saved.len(),
            failed = links.len() - saved.len(),
            "catalog done"
        );
        Ok(saved)
    }
}

/// `base` with its `page` query parameter set to `page`.
fn page_url(base: &Url, page: usize) -> Url {
    let mut url = base.clone();
    let others: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in &others {
            query.append_pair(key, value);
        }
        query.append_pair("page", &page.to_string());
    }
    url
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashMap};

    use super::*;
    use crate::{extract::CdnImageExtractor, links::KitLinkFilter};

    #[derive(Default)]
    struct StubFetcher {
        pages: HashMap<String, String>,
        files: HashMap<String, Vec<u8>>,
        requests: RefCell<Vec<String>>,
    }

    impl StubFetcher {
        fn page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        fn file(mut self, url: &str, bytes: &[u8]) -> Self {
            self.files.insert(url.to_string(), bytes.to_vec());
            self
        }
    }

    impl PageFetcher for StubFetcher {
        fn fetch_text(&self, url: &str) -> ScrapeResult<String> {
            self.requests.borrow_mut().push(url.to_string());
            self.pages.get(url).cloned().ok_or(ScrapeError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
        }

        fn fetch_bytes(&self, url: &str) -> ScrapeResult<Vec<u8>> {
            self.files.get(url).cloned().ok_or(ScrapeError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    const CATALOG: &str = "https://kits.test/chivas/";

    fn item(title: &str, image: &str) -> String {
        format!(r#"<h1>{title}</h1><img src="https://cdn.footballkitarchive.com/{image}">"#)
    }

    fn config() -> ScrapeConfig {
        ScrapeConfig {
            max_pages: 5,
            delay: Duration::ZERO,
            overwrite: false,
        }
    }

    #[test]
    fn pagination_stops_when_no_new_links_appear() {
        let fetcher = StubFetcher::default()
            .page(CATALOG, r#"<a href="/a-home-kit/">a</a>"#)
            .page(
                "https://kits.test/chivas/?page=2",
                r#"<a href="/a-home-kit/">a</a><a href="/b-home-kit/">b</a>"#,
            )
            .page("https://kits.test/chivas/?page=3", r#"<a href="/b-home-kit/">b</a>"#);
        let scraper = CatalogScraper::new(fetcher, config());

        let links = scraper
            .collect_links(CATALOG, &KitLinkFilter::home_kits())
            .unwrap();

        assert_eq!(links.len(), 2);
        assert_eq!(scraper.fetcher.requests.borrow().len(), 3);
    }

    #[test]
    fn missing_catalog_is_an_error() {
        let scraper = CatalogScraper::new(StubFetcher::default(), config());

        assert!(matches!(
            scraper.collect_links(CATALOG, &KitLinkFilter::home_kits()),
            Err(ScrapeError::HttpStatus { status: 404, .. })
        ));
    }

    #[test]
    fn scrape_saves_items_and_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("raw");
        let fetcher = StubFetcher::default()
            .page(
                CATALOG,
                concat!(
                    r#"<a href="/a-home-kit/">a</a>"#,
                    r#"<a href="/b-home-kit/">b</a>"#,
                    r#"<a href="/c-home-kit/">c</a>"#,
                ),
            )
            .page("https://kits.test/a-home-kit/", &item("Chivas 2020/21 Home", "a.jpg"))
            .page("https://kits.test/b-home-kit/", "<h1>No image here</h1>")
            .page("https://kits.test/c-home-kit/", &item("Chivas 2021 Home", "missing.jpg"))
            .file("https://cdn.footballkitarchive.com/a.jpg", b"jpeg bytes");
        let scraper = CatalogScraper::new(fetcher, config());

        let saved = scraper
            .scrape(
                CATALOG,
                &KitLinkFilter::home_kits(),
                &CdnImageExtractor::default(),
                &dest,
            )
            .unwrap();

        assert_eq!(saved, vec![dest.join("chivas_2020-21_home.jpg")]);
        assert_eq!(fs::read(&saved[0]).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn existing_files_are_not_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kit.jpg"), b"old").unwrap();
        let fetcher = StubFetcher::default()
            .page("https://kits.test/kit-home-kit/", &item("Kit", "kit.jpg"))
            .file("https://cdn.footballkitarchive.com/kit.jpg", b"new");
        let scraper = CatalogScraper::new(fetcher, config());
        let url = Url::parse("https://kits.test/kit-home-kit/").unwrap();

        let path = scraper
            .download_item(&url, &CdnImageExtractor::default(), dir.path())
            .unwrap();

        assert_eq!(fs::read(path).unwrap(), b"old");
    }

    #[test]
    fn page_url_replaces_existing_page_parameter() {
        let base = Url::parse("https://kits.test/list/?sort=new&page=4").unwrap();
        assert_eq!(
            page_url(&base, 2).as_str(),
            "https://kits.test/list/?sort=new&page=2"
        );
    }
}
