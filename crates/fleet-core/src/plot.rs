use crate::model::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Canvas size and scroll speed of the throughput strip chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotGeometry {
    pub width: u32,
    pub height: u32,
    pub pixels_per_second: f64,
}

impl Default for PlotGeometry {
    fn default() -> Self {
        Self {
            width: 600,
            height: 100,
            pixels_per_second: 10.0,
        }
    }
}

impl PlotGeometry {
    /// Seconds of history visible across the canvas.
    pub fn window_secs(&self) -> f64 {
        f64::from(self.width) / self.pixels_per_second
    }
}

/// Throughput of one finished work unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSample {
    pub at: Timestamp,
    pub value: f64,
    pub duration: f64,
    pub node_id: String,
}

/// A horizontal stroke: a sample drawn across the time it took.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlotSegment {
    pub x_start: f64,
    pub x_end: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlotFrame {
    /// Plotting is stopped; show a play triangle.
    Paused { glyph: [(f64, f64); 3] },
    Live { segments: Vec<PlotSegment> },
}

/// What the renderer has to do after a sample was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PlotUpdate {
    Ignored,
    /// Draw one new segment at the right edge; history is unchanged.
    Append(PlotSegment),
    /// The vertical scale grew; redraw everything.
    Redraw,
}

/// Sliding window of throughput samples, oldest first.
#[derive(Debug, Clone)]
pub struct PlotBuffer {
    geometry: PlotGeometry,
    samples: VecDeque<PlotSample>,
    y_max: f64,
    running: bool,
    slide_at: Timestamp,
}

impl PlotBuffer {
    pub fn new(geometry: PlotGeometry) -> Self {
        Self {
            geometry,
            samples: VecDeque::new(),
            y_max: 1.0,
            running: false,
            slide_at: 0.0,
        }
    }

    pub fn geometry(&self) -> PlotGeometry {
        self.geometry
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn y_max(&self) -> f64 {
        self.y_max
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &PlotSample> {
        self.samples.iter()
    }

    pub fn start(&mut self, now: Timestamp) {
        self.running = true;
        self.samples.clear();
        self.slide_at = now;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.samples.clear();
    }

    pub fn record(&mut self, sample: PlotSample) -> PlotUpdate {
        if !self.running {
            return PlotUpdate::Ignored;
        }
        let value = sample.value;
        let duration = sample.duration;
        self.samples.push_back(sample);
        if value > self.y_max {
            self.y_max = value.floor() + 1.0;
            return PlotUpdate::Redraw;
        }
        let x_start = f64::from(self.geometry.width);
        PlotUpdate::Append(PlotSegment {
            x_start,
            x_end: x_start - duration * self.geometry.pixels_per_second,
            y: self.y_to_px(value),
        })
    }

    /// Drop samples that have scrolled off the left edge.
    pub fn evict(&mut self, now: Timestamp) -> usize {
        let cutoff = now - self.geometry.window_secs();
        let mut evicted = 0;
        while self
            .samples
            .front()
            .is_some_and(|sample| sample.at < cutoff)
        {
            self.samples.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Periodic tick: whole pixels to scroll the canvas left since the last
    /// scroll, then eviction. An empty buffer only re-anchors the scroll clock.
    pub fn slide(&mut self, now: Timestamp) -> u32 {
        if self.samples.is_empty() {
            self.slide_at = now;
            return 0;
        }
        let delta = (self.geometry.pixels_per_second * (now - self.slide_at)).floor();
        let delta = if delta > 0.0 {
            self.slide_at = now;
            delta as u32
        } else {
            0
        };
        self.evict(now);
        delta
    }

    /// Vertical pixel for a value; larger values sit higher.
    pub fn y_to_px(&self, value: f64) -> f64 {
        let span = f64::from(self.geometry.height.saturating_sub(1));
        (span * (1.0 - value / self.y_max)).floor() + 0.5
    }

    /// Horizontal pixel for a sample taken at `at`; newest at the right edge.
    pub fn x_for(&self, at: Timestamp, now: Timestamp) -> f64 {
        f64::from(self.geometry.width) - ((now - at) * self.geometry.pixels_per_second).floor()
    }

    /// Full redraw as of `now`. Re-anchors the scroll clock.
    pub fn frame(&mut self, now: Timestamp) -> PlotFrame {
        self.slide_at = now;
        if !self.running {
            let width = f64::from(self.geometry.width);
            let height = f64::from(self.geometry.height);
            let half = height / 8.0 / 2.0;
            let (cx, cy) = (width / 2.0, height / 2.0);
            return PlotFrame::Paused {
                glyph: [(cx - half, cy + half), (cx - half, cy - half), (cx + half, cy)],
            };
        }
        let pps = self.geometry.pixels_per_second;
        let segments = self
            .samples
            .iter()
            .map(|sample| {
                let x_start = self.x_for(sample.at, now);
                PlotSegment {
                    x_start,
                    x_end: x_start - sample.duration * pps,
                    y: self.y_to_px(sample.value),
                }
            })
            .collect();
        PlotFrame::Live { segments }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(at: Timestamp, value: f64) -> PlotSample {
        PlotSample {
            at,
            value,
            duration: 2.0,
            node_id: "n1".to_string(),
        }
    }

    fn running(now: Timestamp) -> PlotBuffer {
        let mut plot = PlotBuffer::new(PlotGeometry::default());
        plot.start(now);
        plot
    }

    #[test]
    fn stopped_buffer_ignores_samples() {
        let mut plot = PlotBuffer::new(PlotGeometry::default());
        assert_eq!(plot.record(sample(0.0, 0.5)), PlotUpdate::Ignored);
        assert!(plot.is_empty());
    }

    #[test]
    fn larger_value_raises_scale_and_forces_redraw() {
        let mut plot = running(0.0);
        assert!(matches!(plot.record(sample(1.0, 0.5)), PlotUpdate::Append(_)));
        assert_eq!(plot.record(sample(2.0, 3.2)), PlotUpdate::Redraw);
        assert_eq!(plot.y_max(), 4.0);
        assert!(matches!(plot.record(sample(3.0, 4.0)), PlotUpdate::Append(_)));
        assert_eq!(plot.len(), 3);
    }

    #[test]
    fn append_segment_starts_at_right_edge() {
        let mut plot = running(0.0);
        match plot.record(sample(1.0, 0.5)) {
            PlotUpdate::Append(segment) => {
                assert_eq!(segment.x_start, 600.0);
                assert_eq!(segment.x_end, 580.0);
                assert_eq!(segment.y, 49.5);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn y_mapping_is_half_pixel_offset_and_monotonic() {
        let plot = running(0.0);
        assert_eq!(plot.y_to_px(0.0), 99.5);
        assert_eq!(plot.y_to_px(1.0), 0.5);
        assert!(plot.y_to_px(0.75) < plot.y_to_px(0.25));
    }

    #[test]
    fn eviction_keeps_only_the_visible_window() {
        let mut plot = running(0.0);
        for at in [0.0, 10.0, 45.0, 59.0, 70.0] {
            plot.record(sample(at, 0.5));
        }
        let now = 100.0;
        assert_eq!(plot.evict(now), 2);
        let window = plot.geometry().window_secs();
        assert!(plot.samples().all(|sample| now - sample.at <= window));
        assert_eq!(plot.len(), 3);
    }

    #[test]
    fn eviction_on_empty_buffer_is_a_no_op() {
        let mut plot = running(0.0);
        assert_eq!(plot.evict(1_000.0), 0);
        assert_eq!(plot.slide(1_000.0), 0);
    }

    #[test]
    fn slide_reports_whole_pixels_and_evicts() {
        let mut plot = running(0.0);
        plot.record(sample(0.0, 0.5));
        assert_eq!(plot.slide(0.05), 0);
        assert_eq!(plot.slide(0.25), 2);
        assert_eq!(plot.slide(0.30), 0);
        assert_eq!(plot.slide(61.0), 607);
        assert!(plot.is_empty());
    }

    #[test]
    fn stop_clears_history_and_shows_paused_glyph() {
        let mut plot = running(0.0);
        plot.record(sample(1.0, 0.5));
        plot.stop();
        assert!(plot.is_empty());
        match plot.frame(2.0) {
            PlotFrame::Paused { glyph } => {
                assert_eq!(glyph, [(293.75, 56.25), (293.75, 43.75), (306.25, 50.0)]);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn live_frame_places_samples_by_age() {
        let mut plot = running(0.0);
        plot.record(sample(10.0, 0.5));
        match plot.frame(15.0) {
            PlotFrame::Live { segments } => {
                assert_eq!(
                    segments,
                    vec![PlotSegment {
                        x_start: 550.0,
                        x_end: 530.0,
                        y: 49.5
                    }]
                );
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
