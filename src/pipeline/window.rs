//! Two-slot minute window
//!
//! Records may arrive up to one minute late, so two minutes are open at any
//! time: `current` (the newest minute seen) and `previous` (the one before
//! it). A record for `current + 1` rolls the window forward: `previous` is
//! closed and handed off, `current` becomes `previous`, and a fresh bucket
//! opens as the new `current`.
//!
//! ```text
//!            previous   current
//! minute:      m-1        m        ← records for m-1 or m are accepted
//! advance:     m          m+1      (bucket of m-1 leaves the window)
//! ```

use crate::minute_stats::MinuteBucket;

/// A bucket labelled with its minute index
#[derive(Debug)]
pub struct MinuteSlot {
    pub minute: i64,
    pub bucket: MinuteBucket,
}

/// Where a record's minute falls relative to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Current,
    Previous,
    /// Ahead of the current minute by this many steps
    Ahead(u64),
    /// Older than the previous minute
    Behind,
}

#[derive(Debug)]
pub struct MinuteWindow {
    current: MinuteSlot,
    previous: Option<MinuteSlot>,
}

impl MinuteWindow {
    /// Window whose first open minute is `minute`
    pub fn open(minute: i64, bucket: MinuteBucket) -> Self {
        Self {
            current: MinuteSlot { minute, bucket },
            previous: None,
        }
    }

    pub fn current_minute(&self) -> i64 {
        self.current.minute
    }

    pub fn place(&self, minute: i64) -> Placement {
        let current = self.current.minute;
        if minute == current {
            Placement::Current
        } else if minute > current {
            Placement::Ahead((minute - current) as u64)
        } else if minute == current - 1 && self.previous.is_some() {
            Placement::Previous
        } else {
            Placement::Behind
        }
    }

    /// Open `current + 1` with `fresh`, returning the slot that closed
    pub fn advance(&mut self, fresh: MinuteBucket) -> Option<MinuteSlot> {
        let next = MinuteSlot {
            minute: self.current.minute + 1,
            bucket: fresh,
        };
        let demoted = std::mem::replace(&mut self.current, next);
        self.previous.replace(demoted)
    }

    /// Open a slot one minute before `current` when nothing older exists
    ///
    /// Used when the very first record turns out to be one minute late:
    /// minute labels shift up by one so the new slot becomes minute 0.
    /// Returns `fresh` back if the window already has a previous slot.
    pub fn extend_back(&mut self, fresh: MinuteBucket) -> Result<(), MinuteBucket> {
        if self.previous.is_some() {
            return Err(fresh);
        }
        self.current.minute += 1;
        self.previous = Some(MinuteSlot {
            minute: self.current.minute - 1,
            bucket: fresh,
        });
        Ok(())
    }

    /// Bucket for a minute that [`MinuteWindow::place`] accepted
    pub fn bucket_mut(&mut self, placement: Placement) -> Option<&mut MinuteBucket> {
        match placement {
            Placement::Current => Some(&mut self.current.bucket),
            Placement::Previous => self.previous.as_mut().map(|slot| &mut slot.bucket),
            Placement::Ahead(_) | Placement::Behind => None,
        }
    }

    /// Close the window, yielding the open slots oldest first
    pub fn into_slots(self) -> impl Iterator<Item = MinuteSlot> {
        self.previous.into_iter().chain(std::iter::once(self.current))
    }
}
