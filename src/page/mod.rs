//! Page domain: the document the comic lives in.
//!
//! The pipeline never touches a concrete DOM. Everything it needs from the
//! host page goes through the `Page` trait: enumerating nodes, reading and
//! writing attributes and inline styles, scrolling, synthetic events and
//! pixel access. `StaticPage` is the in-memory implementation used by the
//! CLI and the tests.

pub mod selector;
mod static_html;

pub use selector::Selector;
pub use static_html::StaticPage;

use image::DynamicImage;
use reqwest::Url;

/// Opaque handle to a node of a `Page`. Stable for the lifetime of the page.
pub type NodeId = usize;

/// Synthetic events the lazy-render forcer may dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageEvent {
    Click,
    MouseOver,
    MouseEnter,
    Load,
}

/// Inline style properties touched by the highlighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleProperty {
    Outline,
    OutlineOffset,
    BoxShadow,
    Border,
}

impl StyleProperty {
    pub const ALL: [StyleProperty; 4] = [
        StyleProperty::Outline,
        StyleProperty::OutlineOffset,
        StyleProperty::BoxShadow,
        StyleProperty::Border,
    ];

    pub fn css_name(self) -> &'static str {
        match self {
            StyleProperty::Outline => "outline",
            StyleProperty::OutlineOffset => "outline-offset",
            StyleProperty::BoxShadow => "box-shadow",
            StyleProperty::Border => "border",
        }
    }
}

/// Capability interface over the host document.
///
/// Mutating methods take `&self`; implementations use interior mutability
/// because the page is shared between the session and its collaborators.
pub trait Page: Send + Sync {
    /// Location of the document, used to resolve relative locators and to
    /// decide same-origin vs cross-origin.
    fn base_url(&self) -> Option<Url>;

    /// All element nodes in document order.
    fn nodes(&self) -> Vec<NodeId>;

    /// Lowercase tag name.
    fn tag_name(&self, node: NodeId) -> String;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Text directly inside the element, whitespace-trimmed.
    fn text_content(&self, node: NodeId) -> String;

    /// Current vertical offset of the element relative to the viewport.
    fn top_offset(&self, node: NodeId) -> f64;

    /// Natural pixel size, when the image has finished loading.
    fn natural_size(&self, node: NodeId) -> Option<(u32, u32)>;

    fn is_loaded(&self, node: NodeId) -> bool;

    /// Computed `background-image` URL, if any.
    fn background_image(&self, node: NodeId) -> Option<String>;

    fn style(&self, node: NodeId, property: StyleProperty) -> String;

    fn set_style(&self, node: NodeId, property: StyleProperty, value: &str);

    fn scroll_into_view(&self, node: NodeId);

    fn scroll_position(&self) -> f64;

    fn scroll_to(&self, y: f64);

    fn document_height(&self) -> f64;

    fn viewport_height(&self) -> f64;

    fn dispatch(&self, node: NodeId, event: PageEvent);

    /// Draw the element's current pixels at natural size. `None` when the
    /// host cannot (tainted canvas, not an image, nothing rendered).
    fn render_pixels(&self, node: NodeId) -> Option<DynamicImage>;
}

/// True if the element's `class` attribute contains `class`.
pub fn has_class(page: &dyn Page, node: NodeId, class: &str) -> bool {
    page.attribute(node, "class")
        .map(|c| c.split_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

/// All nodes matching `selector`, in document order.
pub fn query_all(page: &dyn Page, selector: &Selector) -> Vec<NodeId> {
    page.nodes()
        .into_iter()
        .filter(|&n| selector.matches(page, n))
        .collect()
}

/// Descendants of `root` matching `selector`, in document order.
pub fn query_within(page: &dyn Page, root: NodeId, selector: &Selector) -> Vec<NodeId> {
    page.nodes()
        .into_iter()
        .filter(|&n| n != root && is_ancestor(page, root, n) && selector.matches(page, n))
        .collect()
}

/// Nearest inclusive ancestor of `node` matching `selector`.
pub fn closest(page: &dyn Page, node: NodeId, selector: &Selector) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(n) = current {
        if selector.matches(page, n) {
            return Some(n);
        }
        current = page.parent(n);
    }
    None
}

fn is_ancestor(page: &dyn Page, ancestor: NodeId, node: NodeId) -> bool {
    let mut current = page.parent(node);
    while let Some(n) = current {
        if n == ancestor {
            return true;
        }
        current = page.parent(n);
    }
    false
}
