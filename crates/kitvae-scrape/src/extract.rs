//! Item page parsing.

use scraper::{Html, Selector};
use url::Url;

use crate::error::{ScrapeError, ScrapeResult};

/// Host serving full-size product images.
pub const DEFAULT_IMAGE_HOST: &str = "cdn.footballkitarchive.com";

/// What an item page yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitPage {
    pub title: String,
    pub image_url: Url,
}

impl KitPage {
    /// File name the image is stored under.
    pub fn file_name(&self) -> String {
        kit_file_name(&self.title)
    }
}

/// Pulls the title and product image out of an item page.
pub trait ItemExtractor {
    fn extract(&self, html: &str, page_url: &Url) -> ScrapeResult<KitPage>;
}

/// Takes the first `<h1>` as title and the first `<img>` served from the
/// image host as product image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnImageExtractor {
    image_host: String,
}

impl Default for CdnImageExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_HOST)
    }
}

impl CdnImageExtractor {
    pub fn new(image_host: impl Into<String>) -> Self {
        Self {
            image_host: image_host.into(),
        }
    }
}

impl ItemExtractor for CdnImageExtractor {
    fn extract(&self, html: &str, page_url: &Url) -> ScrapeResult<KitPage> {
        let document = Html::parse_document(html);
        let missing_title = || ScrapeError::MissingTitle {
            url: page_url.to_string(),
        };
        let missing_image = || ScrapeError::MissingImage {
            url: page_url.to_string(),
        };

        let h1 = Selector::parse("h1").map_err(|_| missing_title())?;
        let title = document
            .select(&h1)
            .next()
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|text| !text.is_empty())
            .ok_or_else(missing_title)?;

        let img = Selector::parse("img[src]").map_err(|_| missing_image())?;
        let src = document
            .select(&img)
            .filter_map(|el| el.value().attr("src"))
            .find(|src| src.contains(&self.image_host))
            .ok_or_else(missing_image)?;

        let image_url = page_url
            .join(src.trim())
            .map_err(|source| ScrapeError::InvalidUrl {
                url: src.to_string(),
                source,
            })?;

        Ok(KitPage { title, image_url })
    }
}

/// `lowercase(trim(title))` with spaces as `_`, slashes as `-`, plus `.jpg`.
pub fn kit_file_name(title: &str) -> String {
    let stem: String = title
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' => '_',
            '/' | '\\' => '-',
            other => other,
        })
        .collect();
    format!("{stem}.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM: &str = r#"
        <html><body>
          <img src="/static/logo.png">
          <h1>  Chivas 2006/07   Home </h1>
          <h1>Related kits</h1>
          <img src="https://cdn.footballkitarchive.com/2023/07/01/chivas-home.jpg">
          <img src="https://cdn.footballkitarchive.com/2023/07/01/chivas-back.jpg">
        </body></html>
    "#;

    fn page_url() -> Url {
        Url::parse("https://www.footballkitarchive.com/chivas-2006-07-home-kit/").unwrap()
    }

    #[test]
    fn extracts_first_title_and_cdn_image() {
        let page = CdnImageExtractor::default().extract(ITEM, &page_url()).unwrap();

        assert_eq!(page.title, "Chivas 2006/07 Home");
        assert_eq!(
            page.image_url.as_str(),
            "https://cdn.footballkitarchive.com/2023/07/01/chivas-home.jpg"
        );
        assert_eq!(page.file_name(), "chivas_2006-07_home.jpg");
    }

    #[test]
    fn missing_parts_are_reported() {
        let no_title = r#"<img src="https://cdn.footballkitarchive.com/a.jpg">"#;
        let no_image = "<h1>Kit</h1><img src=\"/logo.png\">";
        let extractor = CdnImageExtractor::default();

        assert!(matches!(
            extractor.extract(no_title, &page_url()),
            Err(ScrapeError::MissingTitle { .. })
        ));
        assert!(matches!(
            extractor.extract(no_image, &page_url()),
            Err(ScrapeError::MissingImage { .. })
        ));
    }

    #[test]
    fn file_names_are_normalized() {
        assert_eq!(
            kit_file_name("  Real Madrid 2011/12 Home Kit "),
            "real_madrid_2011-12_home_kit.jpg"
        );
        assert_eq!(kit_file_name("CHIVAS"), "chivas.jpg");
    }
}
