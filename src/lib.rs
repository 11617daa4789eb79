//! Calendar notes client with timezone-safe local dates.
//!
//! Every note belongs to a local calendar day, never to an instant. Incoming
//! dates go through [`DateNormalizer`] to become `YYYY-MM-DD` keys in the
//! user's zone; outgoing dates are sent as noon UTC on that day so no zone
//! within ±12h moves them to a neighbouring day.

pub mod api;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod date;
pub mod domain;
pub mod error;
pub mod hover;
pub mod interceptor;
pub mod journal;
pub mod logger;
pub mod notes;
pub mod notifier;
pub mod reminder;
pub mod state;

pub use clock::{Clock, FixedClock, LocalZone, SystemClock};
pub use date::{
    normalize_date_key, parse_local_date, to_local_date_key, CalendarDay, DateInput,
    DateNormalizer, NoteDateKey,
};
pub use domain::{Note, NoteDraft, Priority, RecordId};
pub use error::{ApiError, ErrorCode};
