//! In-memory `Page` built from HTML text.
//!
//! HTML5 parsing via `scraper`, not a browser: it recovers the element
//! tree, attributes and direct text, and lays body elements out
//! top-to-bottom in document order. Hosts that know better (real layout, decoded pixels)
//! can inject it through the `set_*` methods. Every scroll and synthetic
//! event is recorded so callers can inspect what the pipeline did.

use super::{NodeId, Page, PageEvent, StyleProperty};
use image::{DynamicImage, GenericImageView};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, MutexGuard};

/// Synthetic layout: each element gets its own row.
const ROW_HEIGHT: f64 = 100.0;
const DEFAULT_VIEWPORT_HEIGHT: f64 = 800.0;

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attrs: Vec<(String, String)>,
    parent: Option<NodeId>,
    text: String,
    y: f64,
    /// Laid out in the body; scaffolding and head content are not.
    in_flow: bool,
    natural_size: Option<(u32, u32)>,
    pixels: Option<DynamicImage>,
    styles: HashMap<StyleProperty, String>,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: Vec<NodeData>,
    scroll_y: f64,
    scroll_history: Vec<f64>,
    events: Vec<(NodeId, PageEvent)>,
    scrolled_into_view: Vec<NodeId>,
}

pub struct StaticPage {
    base: Option<Url>,
    viewport_height: f64,
    inner: Mutex<Inner>,
}

impl StaticPage {
    /// Parse `html`. `base` is the document location, if known.
    pub fn from_html(html: &str, base: Option<Url>) -> Self {
        let nodes = parse_nodes(html);
        log::debug!("[PAGE] Parsed {} elements", nodes.len());
        Self {
            base,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            inner: Mutex::new(Inner {
                nodes,
                ..Inner::default()
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_node<T>(&self, node: NodeId, f: impl FnOnce(&NodeData) -> T) -> Option<T> {
        self.inner().nodes.get(node).map(f)
    }

    fn with_node_mut(&self, node: NodeId, f: impl FnOnce(&mut NodeData)) {
        if let Some(data) = self.inner().nodes.get_mut(node) {
            f(data);
        }
    }

    /// First node whose attribute `name` equals `value`.
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<NodeId> {
        self.inner().nodes.iter().position(|n| {
            n.attrs
                .iter()
                .any(|(k, v)| k == name && v == value)
        })
    }

    /// All elements with tag `tag`, in document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.inner()
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.tag == tag)
            .map(|(id, _)| id)
            .collect()
    }

    /// Override the absolute vertical position of an element.
    pub fn set_layout_top(&self, node: NodeId, y: f64) {
        self.with_node_mut(node, |n| n.y = y);
    }

    /// Mark an image as loaded with known dimensions but no pixels.
    pub fn set_natural_size(&self, node: NodeId, width: u32, height: u32) {
        self.with_node_mut(node, |n| n.natural_size = Some((width, height)));
    }

    /// Attach decoded pixels to an image; this also marks it loaded.
    pub fn set_pixels(&self, node: NodeId, pixels: DynamicImage) {
        let size = pixels.dimensions();
        self.with_node_mut(node, |n| {
            n.natural_size = Some(size);
            n.pixels = Some(pixels);
        });
    }

    pub fn set_viewport_height(&mut self, height: f64) {
        self.viewport_height = height;
    }

    pub fn scroll_history(&self) -> Vec<f64> {
        self.inner().scroll_history.clone()
    }

    pub fn events(&self) -> Vec<(NodeId, PageEvent)> {
        self.inner().events.clone()
    }

    pub fn scrolled_into_view(&self) -> Vec<NodeId> {
        self.inner().scrolled_into_view.clone()
    }
}

impl Page for StaticPage {
    fn base_url(&self) -> Option<Url> {
        self.base.clone()
    }

    fn nodes(&self) -> Vec<NodeId> {
        (0..self.inner().nodes.len()).collect()
    }

    fn tag_name(&self, node: NodeId) -> String {
        self.with_node(node, |n| n.tag.clone()).unwrap_or_default()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.with_node(node, |n| {
            n.attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
        .flatten()
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        self.with_node_mut(node, |n| {
            match n.attrs.iter_mut().find(|(k, _)| k == name) {
                Some((_, v)) => *v = value.to_string(),
                None => n.attrs.push((name.to_string(), value.to_string())),
            }
        });
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.with_node(node, |n| n.parent).flatten()
    }

    fn text_content(&self, node: NodeId) -> String {
        self.with_node(node, |n| n.text.trim().to_string())
            .unwrap_or_default()
    }

    fn top_offset(&self, node: NodeId) -> f64 {
        let inner = self.inner();
        inner
            .nodes
            .get(node)
            .map(|n| n.y - inner.scroll_y)
            .unwrap_or(f64::MAX)
    }

    fn natural_size(&self, node: NodeId) -> Option<(u32, u32)> {
        self.with_node(node, |n| n.natural_size).flatten()
    }

    fn is_loaded(&self, node: NodeId) -> bool {
        self.natural_size(node)
            .map(|(w, h)| w > 0 && h > 0)
            .unwrap_or(false)
    }

    fn background_image(&self, node: NodeId) -> Option<String> {
        let style = self.attribute(node, "style")?;
        extract_css_url(&style)
    }

    fn style(&self, node: NodeId, property: StyleProperty) -> String {
        self.with_node(node, |n| n.styles.get(&property).cloned())
            .flatten()
            .unwrap_or_default()
    }

    fn set_style(&self, node: NodeId, property: StyleProperty, value: &str) {
        self.with_node_mut(node, |n| {
            if value.is_empty() {
                n.styles.remove(&property);
            } else {
                n.styles.insert(property, value.to_string());
            }
        });
    }

    fn scroll_into_view(&self, node: NodeId) {
        let mut inner = self.inner();
        if let Some(y) = inner.nodes.get(node).map(|n| n.y) {
            // block: "center"
            let target = (y - self.viewport_height / 2.0).max(0.0);
            inner.scroll_y = target;
            inner.scroll_history.push(target);
            inner.scrolled_into_view.push(node);
        }
    }

    fn scroll_position(&self) -> f64 {
        self.inner().scroll_y
    }

    fn scroll_to(&self, y: f64) {
        let mut inner = self.inner();
        inner.scroll_y = y.max(0.0);
        inner.scroll_history.push(y.max(0.0));
    }

    fn document_height(&self) -> f64 {
        self.inner()
            .nodes
            .iter()
            .filter(|n| n.in_flow)
            .map(|n| n.y + ROW_HEIGHT)
            .fold(0.0, f64::max)
    }

    fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    fn dispatch(&self, node: NodeId, event: PageEvent) {
        self.inner().events.push((node, event));
    }

    fn render_pixels(&self, node: NodeId) -> Option<DynamicImage> {
        self.with_node(node, |n| n.pixels.clone()).flatten()
    }
}

static CSS_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*['"]?(.*?)['"]?\s*\)"#).expect("CSS url() pattern is valid")
});

/// Pull the first `url(...)` out of an inline style or computed value.
pub(crate) fn extract_css_url(style: &str) -> Option<String> {
    CSS_URL_RE
        .captures(style)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|u| !u.is_empty())
}

/// The highlight-relevant declarations of an inline `style` attribute.
fn inline_styles(style: &str) -> HashMap<StyleProperty, String> {
    style
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            let property = StyleProperty::ALL
                .into_iter()
                .find(|p| p.css_name() == name)?;
            let value = value.trim();
            (!value.is_empty()).then(|| (property, value.to_string()))
        })
        .collect()
}

/// Flatten the parsed document into the node table, in document order.
///
/// Only elements under `<body>` get a layout row; the document scaffolding
/// and `<head>` content sit at the top with no height.
fn parse_nodes(html: &str) -> Vec<NodeData> {
    let document = Html::parse_document(html);
    let mut nodes: Vec<NodeData> = Vec::new();
    let mut rows = 0usize;

    // (element, parent, inside body)
    let mut pending = vec![(document.root_element(), None, false)];
    while let Some((element, parent, in_body)) = pending.pop() {
        let tag = element.value().name().to_ascii_lowercase();
        let attrs: Vec<(String, String)> = element
            .value()
            .attrs()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect();
        let text = element
            .children()
            .filter_map(|child| child.value().as_text())
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let styles = attrs
            .iter()
            .find(|(k, _)| k == "style")
            .map(|(_, v)| inline_styles(v))
            .unwrap_or_default();

        let y = if in_body {
            rows += 1;
            (rows - 1) as f64 * ROW_HEIGHT
        } else {
            0.0
        };

        let id = nodes.len();
        nodes.push(NodeData {
            tag: tag.clone(),
            attrs,
            parent,
            text,
            y,
            in_flow: in_body,
            natural_size: None,
            pixels: None,
            styles,
        });

        let children_in_body = in_body || tag == "body";
        let children: Vec<ElementRef<'_>> = element.children().filter_map(ElementRef::wrap).collect();
        for child in children.into_iter().rev() {
            pending.push((child, Some(id), children_in_body));
        }
    }
    nodes
}
