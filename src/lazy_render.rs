//! Lazy-render forcer.
//!
//! Many readers only load a panel once it scrolls into view. Before the
//! final discovery pass we sweep the page, hover likely "next" controls,
//! poke reader containers and copy placeholder attributes into `src`.
//! Best effort only: it never fails, runs under a fixed time budget, and
//! stops as soon as the session is cancelled.

use crate::discovery::LAZY_SOURCE_ATTRIBUTES;
use crate::page::{has_class, query_all, Page, PageEvent, Selector};
use crate::settings::Pacing;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const NEXT_CONTROLS: &str = ".j-next, .cp-next, [aria-label=\"Next\"], [aria-label=\"next\"]";
const LAZY_CONTAINERS: &str = ".read-box, .read-box-block, .el-image";
const LAZY_IMAGES: &str = "[data-src], [data-original], [data-lazy], [data-original-src], \
    .lazy, .lazyload, .el-image__inner, .read-box img, .read-box-block img";

/// Fraction of the viewport covered by one scroll step.
const SCROLL_STEP_RATIO: f64 = 0.8;

/// Run the forcer. Returns once done, out of budget, or cancelled.
pub async fn force_render(page: &dyn Page, pacing: &Pacing, cancel: &CancellationToken) {
    let start = Instant::now();
    let initial = page.scroll_position();
    log::info!("[LAZY] Forcing lazy-loaded images");

    let work = async {
        sweep_scroll(page, pacing, cancel).await;
        if cancel.is_cancelled() {
            return;
        }
        let nudged = nudge_controls(page);
        let promoted = promote_placeholders(page);
        log::info!(
            "[LAZY] Nudged {} elements, promoted {} placeholder sources",
            nudged, promoted
        );
        wait(pacing.final_settle, cancel).await;
    };

    tokio::select! {
        _ = cancel.cancelled() => log::info!("[LAZY] Cancelled"),
        res = tokio::time::timeout(pacing.render_budget, work) => {
            if res.is_err() {
                log::warn!(
                    "[LAZY] Budget of {}ms exhausted, continuing with what loaded",
                    pacing.render_budget.as_millis()
                );
            }
        }
    }
    // The sweep may have been dropped mid-scroll.
    if page.scroll_position() != initial {
        page.scroll_to(initial);
    }
    log::info!("[LAZY] Done in {}ms", start.elapsed().as_millis());
}

/// Bottom, coarse steps back up, then a quarter-height sweep.
async fn sweep_scroll(page: &dyn Page, pacing: &Pacing, cancel: &CancellationToken) {
    let height = page.document_height();
    let step = (page.viewport_height() * SCROLL_STEP_RATIO).floor().max(1.0);

    let mut positions = vec![height];
    let mut pos = height;
    while pos >= 0.0 {
        positions.push(pos);
        pos -= step * 2.0;
    }
    positions.extend([0.0, height / 4.0, height / 2.0, height * 3.0 / 4.0, height]);

    if positions.len() > pacing.max_scroll_steps {
        // Keep the ends; thin out the middle.
        let keep = pacing.max_scroll_steps.max(2);
        let stride = positions.len().div_ceil(keep);
        positions = positions
            .iter()
            .enumerate()
            .filter(|(i, _)| i % stride == 0 || *i == positions.len() - 1)
            .map(|(_, p)| *p)
            .collect();
    }

    log::debug!(
        "[LAZY] Document height {}px, {} scroll steps",
        height,
        positions.len()
    );

    for (i, y) in positions.into_iter().enumerate() {
        page.scroll_to(y);
        let delay = if i == 0 { pacing.bottom_settle } else { pacing.scroll_step };
        if !wait(delay, cancel).await {
            break;
        }
    }
}

/// Hover "next" controls and poke reader containers.
///
/// Controls are hovered, never clicked: a click on "next" would navigate away.
fn nudge_controls(page: &dyn Page) -> usize {
    let mut count = 0;

    let next_selector = Selector::new(NEXT_CONTROLS);
    let text_controls = Selector::new("a, button");
    for node in page.nodes() {
        let is_next = next_selector.matches(page, node)
            || (text_controls.matches(page, node)
                && page.text_content(node).to_lowercase().contains("next"));
        if is_next {
            page.dispatch(node, PageEvent::MouseOver);
            page.dispatch(node, PageEvent::MouseEnter);
            count += 1;
        }
    }

    for node in query_all(page, &Selector::new(LAZY_CONTAINERS)) {
        page.dispatch(node, PageEvent::Click);
        page.dispatch(node, PageEvent::MouseOver);
        page.dispatch(node, PageEvent::MouseEnter);
        count += 1;
    }
    count
}

/// Copy lazy-load placeholders into the live `src`. Idempotent.
fn promote_placeholders(page: &dyn Page) -> usize {
    let mut promoted = 0;
    for node in query_all(page, &Selector::new(LAZY_IMAGES)) {
        let placeholder = LAZY_SOURCE_ATTRIBUTES
            .iter()
            .filter_map(|attr| page.attribute(node, attr))
            .find(|v| !v.trim().is_empty());

        match placeholder {
            Some(value) => {
                if page.attribute(node, "src").as_deref() != Some(value.as_str()) {
                    log::debug!("[LAZY] Setting src from placeholder: {}", value);
                    page.set_attribute(node, "src", &value);
                    promoted += 1;
                }
            }
            None => {
                let empty_src = page
                    .attribute(node, "src")
                    .map(|s| s.trim().is_empty())
                    .unwrap_or(true);
                if has_class(page, node, "el-image__inner") && empty_src {
                    page.dispatch(node, PageEvent::Load);
                }
            }
        }
    }
    promoted
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StaticPage;

    const READER: &str = r#"
        <div class="read-box"><div class="el-image"><img class="el-image__inner"></div></div>
        <div class="read-box"><img class="lazy" src="spacer.gif" data-src="p2.jpg"></div>
        <a class="cp-next" href="/ch/2">Next chapter</a>
        <button>Previous</button>
    "#;

    #[tokio::test]
    async fn sweeps_and_returns_to_original_position() {
        let page = StaticPage::from_html(READER, None);
        page.scroll_to(120.0);
        force_render(&page, &Pacing::instant(), &CancellationToken::new()).await;

        let history = page.scroll_history();
        let height = page.document_height();
        assert_eq!(history[1], height, "first jump goes to the bottom");
        assert!(history.contains(&0.0));
        assert_eq!(page.scroll_position(), 120.0);
    }

    #[tokio::test]
    async fn promotes_placeholders_and_nudges() {
        let page = StaticPage::from_html(READER, None);
        force_render(&page, &Pacing::instant(), &CancellationToken::new()).await;

        let lazy = page.find_by_attribute("data-src", "p2.jpg").unwrap();
        assert_eq!(page.attribute(lazy, "src").as_deref(), Some("p2.jpg"));

        let events = page.events();
        let next = page.find_by_attribute("class", "cp-next").unwrap();
        assert!(events.contains(&(next, PageEvent::MouseOver)));
        assert!(!events.contains(&(next, PageEvent::Click)));

        let empty_inner = page.find_by_attribute("class", "el-image__inner").unwrap();
        assert!(events.contains(&(empty_inner, PageEvent::Load)));

        let boxes = query_all(&page, &Selector::new(".read-box"));
        assert!(boxes
            .iter()
            .all(|b| events.contains(&(*b, PageEvent::Click))));
    }

    #[tokio::test]
    async fn running_twice_is_harmless() {
        let page = StaticPage::from_html(READER, None);
        let cancel = CancellationToken::new();
        force_render(&page, &Pacing::instant(), &cancel).await;
        let lazy = page.find_by_attribute("data-src", "p2.jpg").unwrap();
        force_render(&page, &Pacing::instant(), &cancel).await;
        assert_eq!(page.attribute(lazy, "src").as_deref(), Some("p2.jpg"));
        assert_eq!(promote_placeholders(&page), 0);
    }

    #[tokio::test]
    async fn scroll_steps_are_capped() {
        let html = "<p>x</p>".repeat(500);
        let page = StaticPage::from_html(&html, None);
        let pacing = Pacing {
            max_scroll_steps: 10,
            ..Pacing::instant()
        };
        force_render(&page, &pacing, &CancellationToken::new()).await;
        // Capped sweep plus the final restore.
        assert!(page.scroll_history().len() <= 12);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_still_restores_scroll_position() {
        let html = "<p>row</p>".repeat(200);
        let page = StaticPage::from_html(&html, None);
        page.scroll_to(120.0);
        let pacing = Pacing {
            scroll_step: Duration::from_secs(1),
            bottom_settle: Duration::from_secs(1),
            render_budget: Duration::from_secs(3),
            ..Pacing::instant()
        };
        force_render(&page, &pacing, &CancellationToken::new()).await;

        assert!(page.scroll_history().contains(&page.document_height()));
        assert_eq!(page.scroll_position(), 120.0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_sweep_restores_scroll_position() {
        let html = "<p>row</p>".repeat(200);
        let page = StaticPage::from_html(&html, None);
        page.scroll_to(300.0);
        let pacing = Pacing {
            scroll_step: Duration::from_secs(1),
            bottom_settle: Duration::from_secs(1),
            ..Pacing::instant()
        };
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel();
        });
        force_render(&page, &pacing, &cancel).await;

        assert!(page.scroll_history().len() > 2);
        assert_eq!(page.scroll_position(), 300.0);
    }

    #[tokio::test]
    async fn cancelled_token_stops_early() {
        let page = StaticPage::from_html(READER, None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        force_render(&page, &Pacing::default(), &cancel).await;
        assert!(page.events().is_empty());
    }
}
