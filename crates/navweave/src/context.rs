//! Hooks for profiling a navmesh build.
//!
//! Logging goes through [`tracing`]. Timing is opt-in through a [`BuildContext`] passed to
//! [`build_navmesh`](crate::build_navmesh).

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// The stages of [`build_navmesh`](crate::build_navmesh) that are timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerLabel {
    /// The whole build
    Total,
    /// Slope filtering and rasterization of the input triangles, plus the span filters
    Rasterization,
    /// Marking the spans reachable from above
    Filtering,
    /// [`Heightfield::into_compact`](crate::Heightfield::into_compact)
    CompactHeightfield,
    /// Eroding the walkable area by the agent radius
    Erosion,
    /// Painting the configured convex volumes
    MarkConvexVolumes,
    /// The distance field, watershed only
    DistanceField,
    /// Watershed or monotone partitioning
    Regions,
    /// Tracing and simplifying the region outlines
    Contours,
    /// Triangulating and merging the contours into polygons
    PolygonMesh,
    /// Building the height detail per polygon
    DetailMesh,
}

/// Receives timing events during a build. Both methods do nothing by default.
pub trait BuildContext {
    /// Called right before the stage starts.
    fn start_timer(&mut self, _label: TimerLabel) {}
    /// Called right after the stage finished, successfully or not.
    fn stop_timer(&mut self, _label: TimerLabel) {}
}

/// A context that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopContext;

impl BuildContext for NoopContext {}

/// A context that sums up the time spent per [`TimerLabel`].
#[derive(Debug, Clone, Default)]
pub struct BuildTimings {
    running: HashMap<TimerLabel, Instant>,
    elapsed: HashMap<TimerLabel, Duration>,
}

impl BuildTimings {
    /// Creates an empty set of timings.
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulated time of a label, or `None` if it never stopped.
    pub fn elapsed(&self, label: TimerLabel) -> Option<Duration> {
        self.elapsed.get(&label).copied()
    }

    /// Iterates over all labels that have been stopped at least once.
    pub fn iter(&self) -> impl Iterator<Item = (TimerLabel, Duration)> + '_ {
        self.elapsed.iter().map(|(label, duration)| (*label, *duration))
    }

    /// Forgets all measurements.
    pub fn reset(&mut self) {
        self.running.clear();
        self.elapsed.clear();
    }
}

impl BuildContext for BuildTimings {
    fn start_timer(&mut self, label: TimerLabel) {
        self.running.insert(label, Instant::now());
    }

    fn stop_timer(&mut self, label: TimerLabel) {
        let Some(start) = self.running.remove(&label) else {
            tracing::warn!("Stopped timer {label:?} that was never started");
            return;
        };
        *self.elapsed.entry(label).or_default() += start.elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_per_label() {
        let mut timings = BuildTimings::new();
        timings.start_timer(TimerLabel::Contours);
        timings.stop_timer(TimerLabel::Contours);
        let first = timings.elapsed(TimerLabel::Contours).unwrap();
        timings.start_timer(TimerLabel::Contours);
        timings.stop_timer(TimerLabel::Contours);
        assert!(timings.elapsed(TimerLabel::Contours).unwrap() >= first);
        assert_eq!(timings.elapsed(TimerLabel::Regions), None);
        assert_eq!(timings.iter().count(), 1);
    }

    #[test]
    fn unmatched_stop_is_ignored() {
        let mut timings = BuildTimings::new();
        timings.stop_timer(TimerLabel::Total);
        assert_eq!(timings.elapsed(TimerLabel::Total), None);
        timings.start_timer(TimerLabel::Total);
        timings.reset();
        timings.stop_timer(TimerLabel::Total);
        assert_eq!(timings.elapsed(TimerLabel::Total), None);
    }
}
