//! Pre-fire and post-fire acquisition windows

use chrono::{DateTime, Duration, Utc};
use firescar_core::{Error, Result};
use std::fmt;

/// A time interval used to select scenes for a composite.
///
/// The start is always inclusive; the end is inclusive only when
/// `end_inclusive` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub end_inclusive: bool,
}

impl TimeWindow {
    /// `[start, end)`
    pub fn half_open(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            end_inclusive: false,
        }
    }

    /// `[start, end]`
    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            end_inclusive: true,
        }
    }

    /// Whether an instant falls inside the window
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        if t < self.start {
            return false;
        }
        if self.end_inclusive {
            t <= self.end
        } else {
            t < self.end
        }
    }

    /// Length of the window
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let close = if self.end_inclusive { ']' } else { ')' };
        write!(
            f,
            "[{}, {}{}",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S"),
            close
        )
    }
}

/// Acquisition windows around a fire event.
///
/// Returns `(pre, post)` with `pre = [start - delta, start)` and
/// `post = [end, end + delta]`.
///
/// # Errors
/// `delta_days == 0` or `fire_end` before `fire_start`.
pub fn fire_windows(
    fire_start: DateTime<Utc>,
    fire_end: DateTime<Utc>,
    delta_days: u32,
) -> Result<(TimeWindow, TimeWindow)> {
    if delta_days == 0 {
        return Err(Error::InvalidParameter {
            name: "delta_days",
            value: delta_days.to_string(),
            reason: "window length must be at least one day".into(),
        });
    }
    if fire_end < fire_start {
        return Err(Error::InvalidParameter {
            name: "fire_end",
            value: fire_end.to_rfc3339(),
            reason: format!("fire ends before it starts ({})", fire_start.to_rfc3339()),
        });
    }

    let delta = Duration::days(i64::from(delta_days));
    let pre = TimeWindow::half_open(fire_start - delta, fire_start);
    let post = TimeWindow::closed(fire_end, fire_end + delta);
    Ok((pre, post))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn windows_span_delta_days_around_fire() {
        let start = at(2016, 8, 8, 4, 9);
        let end = at(2016, 8, 16, 12, 1);
        let (pre, post) = fire_windows(start, end, 10).unwrap();

        assert_eq!(pre.start, at(2016, 7, 29, 4, 9));
        assert_eq!(pre.end, start);
        assert_eq!(post.start, end);
        assert_eq!(post.end, at(2016, 8, 26, 12, 1));
        assert_eq!(pre.duration(), Duration::days(10));
    }

    #[test]
    fn pre_window_excludes_fire_start() {
        let start = at(2016, 8, 8, 4, 9);
        let (pre, post) = fire_windows(start, at(2016, 8, 9, 0, 0), 10).unwrap();

        assert!(!pre.contains(start));
        assert!(pre.contains(start - Duration::milliseconds(1)));
        assert!(pre.contains(pre.start));
        assert!(post.contains(post.end));
        assert!(!post.contains(post.end + Duration::milliseconds(1)));
    }

    #[test]
    fn zero_delta_is_rejected() {
        let t = at(2016, 8, 8, 0, 0);
        assert!(matches!(
            fire_windows(t, t, 0),
            Err(Error::InvalidParameter { name: "delta_days", .. })
        ));
    }

    #[test]
    fn reversed_fire_dates_are_rejected() {
        let start = at(2016, 8, 8, 0, 0);
        assert!(fire_windows(start, start - Duration::hours(1), 10).is_err());
    }

    #[test]
    fn display_marks_open_and_closed_ends() {
        let t = at(2016, 8, 8, 0, 0);
        let (pre, post) = fire_windows(t, t, 1).unwrap();
        assert!(pre.to_string().ends_with(')'));
        assert!(post.to_string().ends_with(']'));
    }
}
