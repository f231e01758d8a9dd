//! Single-image highlight; the replaced inline style is restored on clear.

use crate::page::{NodeId, Page, StyleProperty};

const HIGHLIGHT_STYLE: [(StyleProperty, &str); 4] = [
    (StyleProperty::Outline, "4px solid #4285f4"),
    (StyleProperty::OutlineOffset, "3px"),
    (StyleProperty::BoxShadow, "0 0 20px rgba(66, 133, 244, 0.8)"),
    (StyleProperty::Border, "2px solid #4285f4"),
];

/// Tracks the single highlighted image and the inline style it replaced.
#[derive(Debug, Default)]
pub struct Highlighter {
    current: Option<(NodeId, Vec<(StyleProperty, String)>)>,
}

impl Highlighter {
    pub fn current(&self) -> Option<NodeId> {
        self.current.as_ref().map(|(node, _)| *node)
    }

    /// Highlight `node`, restoring whichever image was highlighted before.
    pub fn apply(&mut self, page: &dyn Page, node: NodeId) {
        if self.current() == Some(node) {
            return;
        }
        self.clear(page);

        let saved = StyleProperty::ALL
            .iter()
            .map(|&p| (p, page.style(node, p)))
            .collect();
        for (property, value) in HIGHLIGHT_STYLE {
            page.set_style(node, property, value);
        }
        self.current = Some((node, saved));
    }

    /// Put back the saved style. No-op when nothing is highlighted.
    pub fn clear(&mut self, page: &dyn Page) {
        if let Some((node, saved)) = self.current.take() {
            for (property, value) in saved {
                page.set_style(node, property, &value);
            }
        }
    }
}
