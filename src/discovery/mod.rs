//! Discovery domain: finding comic panels on a page and putting them in
//! reading order.
//!
//! Strategies run in a fixed order behind the `DiscoveryStrategy` trait.
//! Their results are unioned, deduplicated by resolved source locator
//! (first occurrence wins), filtered for panel-sized images, and stably
//! sorted by vertical position.

mod strategies;

pub use strategies::{AttributeScan, GenericImages, SiteStructure, COMIC_CONTAINERS};

use crate::error::DiscoveryError;
use crate::page::{closest, has_class, NodeId, Page, Selector};
use std::collections::HashSet;

/// Attributes lazy loaders park the real locator in, most specific first.
pub const LAZY_SOURCE_ATTRIBUTES: &[&str] =
    &["data-src", "data-original", "data-lazy", "data-original-src"];

/// Images at or below this size are icons, avatars, ads.
const PANEL_MIN_SIZE: u32 = 150;

/// How a strategy found an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoundVia {
    /// An image element with its own source.
    Element,
    /// A non-image element carrying the locator (background image or
    /// image-like attribute); the element itself is what gets highlighted.
    Virtual,
}

/// Raw hit produced by a strategy, before dedup and ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub node: NodeId,
    pub source: String,
    pub via: FoundVia,
}

/// One way of finding panel images on a page.
pub trait DiscoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Hits in document order. Must not mutate the page.
    fn find(&self, page: &dyn Page) -> Vec<Found>;
}

/// A panel image in the reading queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCandidate {
    pub node: NodeId,
    /// Resolved source locator; identity of the candidate.
    pub source: String,
    /// Vertical viewport offset at discovery time.
    pub top: f64,
    pub natural_size: Option<(u32, u32)>,
    pub via: FoundVia,
    pub processed: bool,
}

/// Resolve an element's source locator.
///
/// Lazy-load attributes win over the live `src`, which is often a
/// placeholder until the image scrolls into view. Relative locators are
/// resolved against the page base URL.
pub fn resolve_source(page: &dyn Page, node: NodeId) -> Option<String> {
    let raw = LAZY_SOURCE_ATTRIBUTES
        .iter()
        .chain(std::iter::once(&"src"))
        .filter_map(|attr| page.attribute(node, attr))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())?;
    Some(absolutize(page, &raw))
}

/// Resolve `raw` against the page base URL when possible.
pub fn absolutize(page: &dyn Page, raw: &str) -> String {
    if raw.starts_with("data:") {
        return raw.to_string();
    }
    match page.base_url() {
        Some(base) => base
            .join(raw)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| raw.to_string()),
        None => raw.to_string(),
    }
}

/// Ordered strategy list plus the ordering/dedup pass.
pub struct DiscoveryEngine {
    strategies: Vec<Box<dyn DiscoveryStrategy>>,
}

impl Default for DiscoveryEngine {
    fn default() -> Self {
        Self::new(vec![
            Box::new(SiteStructure),
            Box::new(GenericImages),
            Box::new(AttributeScan),
        ])
    }
}

impl DiscoveryEngine {
    pub fn new(strategies: Vec<Box<dyn DiscoveryStrategy>>) -> Self {
        Self { strategies }
    }

    /// Find, dedupe, filter and order the panels on `page`.
    ///
    /// Locators already in `processed` are skipped.
    pub fn discover(
        &self,
        page: &dyn Page,
        processed: &HashSet<String>,
    ) -> Result<Vec<ImageCandidate>, DiscoveryError> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for strategy in &self.strategies {
            let found = strategy.find(page);
            log::info!("[DISCOVERY] {}: {} hits", strategy.name(), found.len());
            for hit in found {
                if hit.source.is_empty() || !seen.insert(hit.source.clone()) {
                    continue;
                }
                if processed.contains(&hit.source) {
                    continue;
                }
                candidates.push(ImageCandidate {
                    node: hit.node,
                    top: page.top_offset(hit.node),
                    natural_size: page.natural_size(hit.node),
                    processed: false,
                    source: hit.source,
                    via: hit.via,
                });
            }
        }

        let containers = Selector::new(&COMIC_CONTAINERS.join(", "));
        candidates.retain(|c| {
            let keep = is_panel_sized(page, c, &containers);
            if !keep {
                log::debug!("[DISCOVERY] Skipping small image: {}", c.source);
            }
            keep
        });

        // Stable: ties keep encounter order.
        candidates.sort_by(|a, b| a.top.total_cmp(&b.top));

        if candidates.is_empty() {
            log::info!("[DISCOVERY] No comic images found");
            return Err(DiscoveryError::NoImagesFound);
        }

        log::info!("[DISCOVERY] {} unique images in reading order", candidates.len());
        for (i, c) in candidates.iter().enumerate() {
            log::debug!("[DISCOVERY] Image {}: {}", i + 1, truncate(&c.source, 100));
        }
        Ok(candidates)
    }
}

/// Reader-container images and `.el-image__inner` always pass. Elsewhere
/// both dimensions must exceed the minimum; unknown sizes pass, since the
/// image may simply not be materialized yet.
fn is_panel_sized(page: &dyn Page, candidate: &ImageCandidate, containers: &Selector) -> bool {
    if has_class(page, candidate.node, "el-image__inner")
        || closest(page, candidate.node, containers).is_some()
    {
        return true;
    }
    match display_size(page, candidate) {
        (Some(w), Some(h)) => w > PANEL_MIN_SIZE && h > PANEL_MIN_SIZE,
        _ => true,
    }
}

/// Per dimension: natural size, then the `width`/`height` attribute, then
/// the inline style. Zero counts as unknown.
fn display_size(page: &dyn Page, candidate: &ImageCandidate) -> (Option<u32>, Option<u32>) {
    let natural = candidate.natural_size;
    let style = page.attribute(candidate.node, "style").unwrap_or_default();
    let dimension = |known: Option<u32>, name: &str| {
        known
            .filter(|&v| v > 0)
            .or_else(|| {
                page.attribute(candidate.node, name)
                    .and_then(|v| leading_int(&v))
            })
            .or_else(|| style_length(&style, name))
            .filter(|&v| v > 0)
    };
    (
        dimension(natural.map(|(w, _)| w), "width"),
        dimension(natural.map(|(_, h)| h), "height"),
    )
}

/// `parseInt`-style: the leading digits of a length like `"300px"`.
fn leading_int(value: &str) -> Option<u32> {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Value of `property` in an inline style declaration list.
fn style_length(style: &str, property: &str) -> Option<u32> {
    style.split(';').find_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        if name.trim().eq_ignore_ascii_case(property) {
            leading_int(value)
        } else {
            None
        }
    })
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StaticPage;
    use reqwest::Url;

    #[test]
    fn lazy_attributes_win_over_live_src() {
        let page = StaticPage::from_html(
            r#"<img src="spacer.gif" data-original="p1.jpg"><img src="p2.jpg" data-src="">"#,
            Url::parse("https://comics.example/ch1/").ok(),
        );
        let imgs = page.elements_by_tag("img");
        assert_eq!(
            resolve_source(&page, imgs[0]).as_deref(),
            Some("https://comics.example/ch1/p1.jpg")
        );
        // Empty lazy attributes fall through to src.
        assert_eq!(
            resolve_source(&page, imgs[1]).as_deref(),
            Some("https://comics.example/ch1/p2.jpg")
        );
    }

    #[test]
    fn data_uris_are_left_alone() {
        let page = StaticPage::from_html(
            r#"<img src="data:image/png;base64,AAAA">"#,
            Url::parse("https://comics.example/").ok(),
        );
        let img = page.elements_by_tag("img")[0];
        assert_eq!(
            resolve_source(&page, img).as_deref(),
            Some("data:image/png;base64,AAAA")
        );
    }

    #[test]
    fn dedupes_and_sorts_by_position() {
        let page = StaticPage::from_html(
            r#"
            <img src="c.jpg">
            <img src="a.jpg">
            <img src="b.jpg">
            <img src="a.jpg">
            "#,
            None,
        );
        let imgs = page.elements_by_tag("img");
        page.set_layout_top(imgs[0], 900.0);
        page.set_layout_top(imgs[1], 100.0);
        page.set_layout_top(imgs[2], 500.0);

        let queue = DiscoveryEngine::default()
            .discover(&page, &HashSet::new())
            .unwrap();
        let order: Vec<_> = queue.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(order, vec!["a.jpg", "b.jpg", "c.jpg"]);
        // First occurrence of a.jpg wins.
        assert_eq!(queue[0].node, imgs[1]);
    }

    #[test]
    fn ties_keep_encounter_order() {
        let page = StaticPage::from_html(
            r#"<img src="1.jpg"><img src="2.jpg"><img src="3.jpg">"#,
            None,
        );
        for n in page.elements_by_tag("img") {
            page.set_layout_top(n, 300.0);
        }
        let queue = DiscoveryEngine::default()
            .discover(&page, &HashSet::new())
            .unwrap();
        let order: Vec<_> = queue.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(order, vec!["1.jpg", "2.jpg", "3.jpg"]);
        assert!(queue.windows(2).all(|w| w[0].top <= w[1].top));
    }

    #[test]
    fn small_images_are_filtered_outside_reader_containers() {
        let page = StaticPage::from_html(
            r#"
            <img src="logo.png">
            <div class="comic-container"><img src="thumb.jpg"></div>
            <img src="panel.jpg">
            "#,
            None,
        );
        let logo = page.find_by_attribute("src", "logo.png").unwrap();
        let thumb = page.find_by_attribute("src", "thumb.jpg").unwrap();
        let panel = page.find_by_attribute("src", "panel.jpg").unwrap();
        page.set_natural_size(logo, 120, 40);
        page.set_natural_size(thumb, 100, 100);
        page.set_natural_size(panel, 800, 1200);

        let queue = DiscoveryEngine::default()
            .discover(&page, &HashSet::new())
            .unwrap();
        let order: Vec<_> = queue.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(order, vec!["thumb.jpg", "panel.jpg"]);
    }

    #[test]
    fn reader_images_pass_regardless_of_size() {
        let page = StaticPage::from_html(
            r#"
            <div class="manga-page"><img src="tiny.jpg"></div>
            <img class="el-image__inner" src="inner.jpg">
            <img src="icon.png">
            "#,
            None,
        );
        for (src, size) in [("tiny.jpg", 20), ("inner.jpg", 10), ("icon.png", 20)] {
            let node = page.find_by_attribute("src", src).unwrap();
            page.set_natural_size(node, size, size);
        }

        let queue = DiscoveryEngine::default()
            .discover(&page, &HashSet::new())
            .unwrap();
        let order: Vec<_> = queue.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(order, vec!["tiny.jpg", "inner.jpg"]);
    }

    #[test]
    fn declared_sizes_stand_in_for_unknown_natural_size() {
        let page = StaticPage::from_html(
            r#"
            <img src="avatar.png" width="48" height="48">
            <img src="badge.png" style="width: 64px; height: 20px">
            <img src="wide.png" width="120">
            <img src="panel.jpg" width="800px" height="1200">
            <img src="unsized.jpg">
            "#,
            None,
        );
        let queue = DiscoveryEngine::default()
            .discover(&page, &HashSet::new())
            .unwrap();
        let order: Vec<_> = queue.iter().map(|c| c.source.as_str()).collect();
        // wide.png has no height anywhere, so its size counts as unknown.
        assert_eq!(order, vec!["wide.png", "panel.jpg", "unsized.jpg"]);
    }

    #[test]
    fn leading_int_reads_lengths() {
        assert_eq!(leading_int("300px"), Some(300));
        assert_eq!(leading_int(" 42 "), Some(42));
        assert_eq!(leading_int("auto"), None);
        assert_eq!(style_length("border: 0; Height: 90px", "height"), Some(90));
    }

    #[test]
    fn processed_locators_are_skipped() {
        let page = StaticPage::from_html(r#"<img src="a.jpg"><img src="b.jpg">"#, None);
        let processed: HashSet<String> = ["a.jpg".to_string()].into_iter().collect();
        let queue = DiscoveryEngine::default().discover(&page, &processed).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].source, "b.jpg");
    }

    #[test]
    fn empty_page_reports_no_images() {
        let page = StaticPage::from_html("<p>No comic here</p>", None);
        assert_eq!(
            DiscoveryEngine::default().discover(&page, &HashSet::new()),
            Err(DiscoveryError::NoImagesFound)
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("hi", 5), "hi");
    }
}
