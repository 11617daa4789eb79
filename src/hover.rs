//! Hover card for a note: when it shows, when it hides, and where it goes.
//!
//! Timers are kept as deadlines. The owner calls [`HoverState::tick`] with the
//! current time (or sleeps until [`HoverState::next_deadline`]) instead of the
//! state spawning timers of its own.

use std::time::{Duration, Instant};

/// Viewports narrower than this get the full-screen card.
pub const MOBILE_BREAKPOINT: f64 = 768.0;

pub const AUTO_HIDE_DESKTOP: Duration = Duration::from_millis(2000);
pub const AUTO_HIDE_MOBILE: Duration = Duration::from_millis(5000);
pub const HIDE_GRACE: Duration = Duration::from_millis(200);

const CARD_WIDTH: f64 = 320.0;
const CARD_HEIGHT: f64 = 220.0;
const CARD_MARGIN: f64 = 10.0;

/// Anchor element bounds in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_y: f64,
}

impl Viewport {
    pub fn is_mobile(&self) -> bool {
        self.width < MOBILE_BREAKPOINT
    }
}

#[derive(Debug)]
pub struct HoverState<T> {
    note: Option<T>,
    anchor: Option<Rect>,
    visible: bool,
    locked: bool,
    hide_at: Option<Instant>,
    auto_hide_at: Option<Instant>,
}

impl<T> Default for HoverState<T> {
    fn default() -> Self {
        Self {
            note: None,
            anchor: None,
            visible: false,
            locked: false,
            hide_at: None,
            auto_hide_at: None,
        }
    }
}

impl<T> HoverState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&self) -> Option<&T> {
        self.note.as_ref()
    }

    pub fn anchor(&self) -> Option<Rect> {
        self.anchor
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Shows the card for `note` and arms the auto-hide deadline.
    pub fn show(&mut self, note: T, anchor: Rect, viewport: Viewport, now: Instant) {
        self.clear_timers();
        self.note = Some(note);
        self.anchor = Some(anchor);
        self.visible = true;

        let delay = if viewport.is_mobile() {
            AUTO_HIDE_MOBILE
        } else {
            AUTO_HIDE_DESKTOP
        };
        self.auto_hide_at = Some(now + delay);
    }

    /// Pointer left the anchor; hide shortly unless the card gets locked.
    pub fn request_hide(&mut self, now: Instant) {
        self.clear_timers();
        self.hide_at = Some(now + HIDE_GRACE);
    }

    pub fn force_hide(&mut self) {
        self.clear_timers();
        self.locked = false;
        self.visible = false;
    }

    /// Pointer entered the card itself.
    pub fn lock(&mut self) {
        self.locked = true;
        self.auto_hide_at = None;
    }

    pub fn unlock(&mut self, now: Instant) {
        self.locked = false;
        self.request_hide(now);
    }

    /// Fires any expired deadline. Returns whether the card is visible.
    pub fn tick(&mut self, now: Instant) -> bool {
        for deadline in [&mut self.hide_at, &mut self.auto_hide_at] {
            if deadline.is_some_and(|at| at <= now) {
                *deadline = None;
                if !self.locked {
                    self.visible = false;
                }
            }
        }
        self.visible
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.hide_at, self.auto_hide_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn clear_timers(&mut self) {
        self.hide_at = None;
        self.auto_hide_at = None;
    }
}

/// Desktop popover position, in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub top: f64,
    pub left: f64,
    /// Card sits left of the anchor.
    pub flip_x: bool,
    /// Distance from the card's top to the anchor's vertical centre.
    pub arrow_offset: f64,
}

/// `None` on mobile viewports, where the card is shown full screen.
pub fn place_card(anchor: Rect, viewport: Viewport) -> Option<Placement> {
    if viewport.is_mobile() {
        return None;
    }

    let scroll_y = viewport.scroll_y;
    let mut top = anchor.y + scroll_y + anchor.height / 2.0 - CARD_HEIGHT / 2.0;
    let mut left = anchor.x + anchor.width + CARD_MARGIN;
    let mut flip_x = false;

    if left + CARD_WIDTH > viewport.width - CARD_MARGIN {
        left = anchor.x - CARD_WIDTH - CARD_MARGIN;
        flip_x = true;
    }

    if top + CARD_HEIGHT > viewport.height + scroll_y {
        top = viewport.height + scroll_y - CARD_HEIGHT - CARD_MARGIN;
    }
    if top < scroll_y + CARD_MARGIN {
        top = scroll_y + CARD_MARGIN;
    }

    let anchor_center = anchor.y + anchor.height / 2.0 + scroll_y;
    Some(Placement {
        top,
        left,
        flip_x,
        arrow_offset: anchor_center - top,
    })
}
