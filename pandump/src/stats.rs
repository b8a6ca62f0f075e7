use crate::Frame;
use chrono::{DateTime, Local};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Capture stats, reported whenever the wall-clock minute changes
#[derive(Default, Clone, Debug)]
pub struct Stats {
    pub frames: u64,
    pub bytes: u64,
    window_start: Option<DateTime<Local>>,
    window_frames: u64,
    buses: BTreeMap<u32, u64>,
    ids: HashMap<u16, u64>,
}

/// Summary of one reporting window
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub frames: u64,
    pub per_second: u64,
    pub buses: Vec<(u32, u64)>,
    pub ids: usize,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_frame(&mut self, frame: &Frame) {
        self.frames += 1;
        self.bytes += frame.bytes.len() as u64;
        self.window_frames += 1;
        *self.buses.entry(frame.bus).or_default() += 1;
        *self.ids.entry(frame.id).or_default() += 1;
    }

    /// Close the current window if `now` is in a later minute than the one
    /// the window started in. The first call only opens a window.
    pub fn periodic(&mut self, now: DateTime<Local>) -> Option<Report> {
        let start = match self.window_start {
            None => {
                self.window_start = Some(now);
                return None;
            }
            Some(start) => start,
        };
        if minute(&now) <= minute(&start) {
            return None;
        }

        let seconds = (now - start).num_seconds().max(1) as u64;
        let report = Report {
            start,
            end: now,
            frames: self.window_frames,
            per_second: self.window_frames / seconds,
            buses: self.buses.iter().map(|(b, n)| (*b, *n)).collect(),
            ids: self.ids.len(),
        };

        self.window_start = Some(now);
        self.window_frames = 0;
        self.buses.clear();
        self.ids.clear();
        Some(report)
    }
}

fn minute(time: &DateTime<Local>) -> i64 {
    time.timestamp().div_euclid(60)
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - Received {} messages since {} ({} per second), {} ids",
            self.end.format("%Y-%m-%d %H:%M:%S"),
            self.frames,
            self.start.format("%H:%M:%S"),
            self.per_second,
            self.ids
        )?;
        for (bus, count) in self.buses.iter() {
            write!(f, ", can{bus:x}: {count}")?;
        }
        Ok(())
    }
}
