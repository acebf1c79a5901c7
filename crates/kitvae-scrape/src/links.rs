//! Link discovery on catalog pages.

use scraper::{Html, Selector};
use url::Url;

/// Decides which catalog links point at items worth downloading.
pub trait LinkFilter {
    fn accept(&self, url: &Url) -> bool;
}

impl<F> LinkFilter for F
where
    F: Fn(&Url) -> bool,
{
    fn accept(&self, url: &Url) -> bool {
        self(url)
    }
}

/// Accepts links whose lowercase URL contains every required fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitLinkFilter {
    required: Vec<String>,
}

impl KitLinkFilter {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            required: required
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Home kit pages (`...-home-kit/`).
    pub fn home_kits() -> Self {
        Self::new(["-home-kit/"])
    }

    /// Any kit page of one team, e.g. `team_kits("chivas")`.
    pub fn team_kits(team: &str) -> Self {
        Self::new(["-kit/", team])
    }
}

impl LinkFilter for KitLinkFilter {
    fn accept(&self, url: &Url) -> bool {
        let url = url.as_str().to_lowercase();
        self.required.iter().all(|fragment| url.contains(fragment.as_str()))
    }
}

/// All `a[href]` targets of `html`, resolved against `base`, accepted by
/// `filter`, without duplicates, in document order.
pub fn extract_links(html: &str, base: &Url, filter: &dyn LinkFilter) -> Vec<Url> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links: Vec<Url> = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(mut url) = base.join(href.trim()) else {
            continue;
        };
        url.set_fragment(None);

        if matches!(url.scheme(), "http" | "https") && filter.accept(&url) && !links.contains(&url)
        {
            links.push(url);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r##"
        <html><body>
          <a href="/chivas-2023-24-home-kit/">Home 23</a>
          <a href="https://www.footballkitarchive.com/chivas-2023-24-away-kit/">Away 23</a>
          <a href="/chivas-2023-24-home-kit/#reviews">Home 23 again</a>
          <a href="/america-2022-home-kit/">Other team</a>
          <a href="mailto:kits@example.com">Mail</a>
          <a>No href</a>
        </body></html>
    "##;

    fn base() -> Url {
        Url::parse("https://www.footballkitarchive.com/chivas-kits/").unwrap()
    }

    #[test]
    fn home_kit_filter_resolves_and_deduplicates() {
        let links = extract_links(CATALOG, &base(), &KitLinkFilter::home_kits());

        let links: Vec<_> = links.iter().map(Url::as_str).collect();
        assert_eq!(
            links,
            [
                "https://www.footballkitarchive.com/chivas-2023-24-home-kit/",
                "https://www.footballkitarchive.com/america-2022-home-kit/",
            ]
        );
    }

    #[test]
    fn team_filter_requires_team_and_kit_suffix() {
        let links = extract_links(CATALOG, &base(), &KitLinkFilter::team_kits("Chivas"));

        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|u| u.as_str().contains("chivas")));
        assert!(links[1].as_str().ends_with("-away-kit/"));
    }

    #[test]
    fn closures_act_as_filters() {
        let only_away = |url: &Url| url.path().contains("away");
        let links = extract_links(CATALOG, &base(), &only_away);

        assert_eq!(links.len(), 1);
    }
}
