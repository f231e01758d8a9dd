//! The three discovery strategies, in the order the engine runs them.

use super::{absolutize, resolve_source, DiscoveryStrategy, Found, FoundVia};
use crate::page::{query_all, query_within, Page, Selector};
use regex::Regex;
use std::sync::LazyLock;

/// Containers used by common comic/manga reader layouts.
pub const COMIC_CONTAINERS: &[&str] = &[
    ".read-box",
    ".read-box-block",
    ".comic-container",
    ".manga-reader",
    ".chapter-container",
    ".page-container",
    ".comic-page",
    ".manga-page",
    ".read-container",
    ".pager-read",
    ".el-image",
];

/// Hosts known to serve panels without a recognizable file extension.
const KNOWN_IMAGE_HOSTS: &[&str] = &["imgg.mangaina.com"];

/// Reader layout built from `.read-box` blocks: each box holds either an
/// `.el-image__inner` image or an `.el-image` container whose background
/// image is the panel.
pub struct SiteStructure;

impl DiscoveryStrategy for SiteStructure {
    fn name(&self) -> &'static str {
        "site-structure"
    }

    fn find(&self, page: &dyn Page) -> Vec<Found> {
        let boxes = query_all(page, &Selector::new(".read-box"));
        if boxes.is_empty() {
            return Vec::new();
        }
        log::debug!("[DISCOVERY] Found {} read-box elements", boxes.len());

        let inner = Selector::new(".el-image__inner");
        let container = Selector::new(".el-image");
        let mut found = Vec::new();

        for read_box in boxes {
            let image = query_within(page, read_box, &inner)
                .into_iter()
                .find_map(|img| resolve_source(page, img).map(|src| (img, src)));
            if let Some((node, source)) = image {
                found.push(Found {
                    node,
                    source,
                    via: FoundVia::Element,
                });
                continue;
            }

            let background = query_within(page, read_box, &container)
                .into_iter()
                .find_map(|c| page.background_image(c).map(|url| (c, url)));
            if let Some((node, url)) = background {
                log::debug!("[DISCOVERY] Found background image: {}", url);
                found.push(Found {
                    node,
                    source: absolutize(page, &url),
                    via: FoundVia::Virtual,
                });
            }
        }
        found
    }
}

/// Plain `img` elements, plus images inside known reader containers.
pub struct GenericImages;

impl DiscoveryStrategy for GenericImages {
    fn name(&self) -> &'static str {
        "generic-images"
    }

    fn find(&self, page: &dyn Page) -> Vec<Found> {
        let mut selector = String::from("img, .el-image__inner");
        for container in COMIC_CONTAINERS {
            selector.push_str(", ");
            selector.push_str(container);
            selector.push_str(" img");
        }
        query_all(page, &Selector::new(&selector))
            .into_iter()
            .filter_map(|node| {
                resolve_source(page, node).map(|source| Found {
                    node,
                    source,
                    via: FoundVia::Element,
                })
            })
            .collect()
    }
}

static IMAGE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(jpg|jpeg|png|gif|webp)").expect("image URL pattern is valid")
});

/// Any element whose resolved locator looks like an image URL.
pub struct AttributeScan;

impl AttributeScan {
    fn looks_like_image(&self, locator: &str) -> bool {
        locator.starts_with("data:image/")
            || IMAGE_URL_RE.is_match(locator)
            || KNOWN_IMAGE_HOSTS.iter().any(|host| locator.contains(host))
    }
}

impl DiscoveryStrategy for AttributeScan {
    fn name(&self) -> &'static str {
        "attribute-scan"
    }

    fn find(&self, page: &dyn Page) -> Vec<Found> {
        page.nodes()
            .into_iter()
            .filter_map(|node| {
                let tag = page.tag_name(node);
                // Script/link/source URLs are not panels.
                if matches!(tag.as_str(), "script" | "link" | "source" | "a") {
                    return None;
                }
                let source = resolve_source(page, node)?;
                if !self.looks_like_image(&source) {
                    return None;
                }
                let via = if tag == "img" {
                    FoundVia::Element
                } else {
                    FoundVia::Virtual
                };
                Some(Found { node, source, via })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StaticPage;

    #[test]
    fn site_structure_prefers_inner_image_then_background() {
        let page = StaticPage::from_html(
            r#"
            <div class="read-box" data-index="0">
              <div class="el-image"><img class="el-image__inner" src="p0.jpg"></div>
            </div>
            <div class="read-box" data-index="1">
              <div class="el-image" style="background-image: url(p1.jpg)"></div>
            </div>
            <div class="read-box" data-index="2"><span>loading</span></div>
            "#,
            None,
        );
        let found = SiteStructure.find(&page);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].source, "p0.jpg");
        assert_eq!(found[0].via, FoundVia::Element);
        assert_eq!(found[1].source, "p1.jpg");
        assert_eq!(found[1].via, FoundVia::Virtual);
        assert_eq!(page.tag_name(found[1].node), "div");
    }

    #[test]
    fn site_structure_ignores_pages_without_read_boxes() {
        let page = StaticPage::from_html(r#"<img src="a.jpg">"#, None);
        assert!(SiteStructure.find(&page).is_empty());
    }

    #[test]
    fn generic_images_skip_sourceless_elements() {
        let page = StaticPage::from_html(
            r#"<img><img src="a.jpg"><div class="manga-page"><img data-src="b.jpg"></div>"#,
            None,
        );
        let sources: Vec<_> = GenericImages.find(&page).into_iter().map(|f| f.source).collect();
        assert_eq!(sources, vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn attribute_scan_matches_extensions_and_hosts() {
        let page = StaticPage::from_html(
            r#"
            <div data-src="https://cdn.example/page-01.WEBP"></div>
            <div data-lazy="https://imgg.mangaina.com/abc123"></div>
            <div data-src="https://cdn.example/readme.txt"></div>
            <script src="https://cdn.example/app.js"></script>
            <img src="p.png">
            "#,
            None,
        );
        let found = AttributeScan.find(&page);
        let sources: Vec<_> = found.iter().map(|f| f.source.as_str()).collect();
        assert_eq!(
            sources,
            vec![
                "https://cdn.example/page-01.WEBP",
                "https://imgg.mangaina.com/abc123",
                "p.png"
            ]
        );
        assert_eq!(found[0].via, FoundVia::Virtual);
        assert_eq!(found[2].via, FoundVia::Element);
    }
}
