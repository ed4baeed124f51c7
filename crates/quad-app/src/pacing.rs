// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

/// What the event loop should do while it waits for the next frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pace {
    /// Renderer is paused: block until the next window event.
    Sleep,
    /// Redraw now; the frame after that is due at `next`.
    Redraw { next: Instant },
    /// Not due yet.
    WaitUntil(Instant),
}

pub fn pace(paused: bool, deadline: Option<Instant>, now: Instant, interval: Duration) -> Pace {
    if paused {
        return Pace::Sleep;
    }
    match deadline {
        Some(t) if now < t => Pace::WaitUntil(t),
        _ => Pace::Redraw {
            next: now + interval,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(10);

    #[test]
    fn paused_sleeps_even_when_overdue() {
        let now = Instant::now();
        assert_eq!(pace(true, None, now, TICK), Pace::Sleep);
        assert_eq!(pace(true, Some(now), now + TICK, TICK), Pace::Sleep);
    }

    #[test]
    fn first_frame_redraws_immediately() {
        let now = Instant::now();
        assert_eq!(pace(false, None, now, TICK), Pace::Redraw { next: now + TICK });
    }

    #[test]
    fn early_wakeup_waits_for_deadline() {
        let now = Instant::now();
        let due = now + TICK;
        assert_eq!(pace(false, Some(due), now, TICK), Pace::WaitUntil(due));
    }

    #[test]
    fn reaching_deadline_redraws_and_reschedules() {
        let start = Instant::now();
        let due = start + TICK;
        assert_eq!(pace(false, Some(due), due, TICK), Pace::Redraw { next: due + TICK });
    }
}
