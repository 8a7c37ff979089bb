//! The sample-accurate parameter timeline (`set` / linear ramp / exponential
//! ramp) and the named [`Param`] that wraps it with audio-rate modulation.

/// One scheduled change to a [`Param`]'s value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamEvent {
    pub kind: ParamEventKind,
    pub value: f32,
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamEventKind {
    SetValue,
    LinearRampToValue,
    ExponentialRampToValue,
}

/// An ordered list of [`ParamEvent`]s, evaluated into a sample-accurate
/// value series over a time range.
///
/// Events are kept sorted by `time` ascending. Inserting a duplicate
/// `(time, kind)` pair replaces the existing event rather than appending.
#[derive(Debug, Clone, Default)]
pub struct ParamTimeline {
    events: Vec<ParamEvent>,
}

impl ParamTimeline {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[ParamEvent] {
        &self.events
    }

    fn insert(&mut self, event: ParamEvent) {
        match self
            .events
            .iter()
            .position(|e| e.time == event.time && e.kind == event.kind)
        {
            Some(idx) => self.events[idx] = event,
            None => {
                let idx = self.events.partition_point(|e| e.time < event.time);
                self.events.insert(idx, event);
            }
        }
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent {
            kind: ParamEventKind::SetValue,
            value,
            time,
        });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent {
            kind: ParamEventKind::LinearRampToValue,
            value,
            time,
        });
    }

    pub fn exponential_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent {
            kind: ParamEventKind::ExponentialRampToValue,
            value,
            time,
        });
    }

    /// Remove every event with `time >= start_time`.
    pub fn cancel_scheduled_values(&mut self, start_time: f64) {
        self.events.retain(|e| e.time < start_time);
    }

    /// Evaluate the timeline over the half-open range `[start_time, end_time)`
    /// at `sample_rate`, writing `out.len()` samples and returning the
    /// scalar value at the end of the range.
    pub fn values_for_time_range(
        &self,
        start_time: f64,
        end_time: f64,
        sample_rate: f64,
        default_value: f32,
        out: &mut [f32],
    ) -> f32 {
        let num_frames = out.len();
        if num_frames == 0 {
            return default_value;
        }

        if self.events.is_empty() || end_time <= self.events[0].time {
            out.fill(default_value);
            return default_value;
        }

        let frame_time = |frame: usize| start_time + frame as f64 / sample_rate;

        let mut last_value = default_value;
        let mut frame = 0usize;

        // Frames before the first event hold the default value.
        while frame < num_frames && frame_time(frame) < self.events[0].time {
            out[frame] = default_value;
            frame += 1;
        }

        for pair in self.events.windows(2) {
            let (e0, e1) = (pair[0], pair[1]);
            while frame < num_frames {
                let t = frame_time(frame);
                if t < e0.time {
                    frame += 1;
                    continue;
                }
                if t >= e1.time || t >= end_time {
                    break;
                }
                let v = match e1.kind {
                    ParamEventKind::LinearRampToValue => {
                        let k = 1.0 / (e1.time - e0.time);
                        let x = ((t - e0.time) * k) as f32;
                        (1.0 - x) * e0.value + x * e1.value
                    }
                    ParamEventKind::ExponentialRampToValue => {
                        if e0.value <= 0.0 || e1.value <= 0.0 {
                            e0.value
                        } else {
                            let n = (t - e0.time) * sample_rate;
                            let big_n = (e1.time - e0.time) * sample_rate;
                            e0.value * (e1.value / e0.value).powf((n / big_n) as f32)
                        }
                    }
                    ParamEventKind::SetValue => e0.value,
                };
                out[frame] = v;
                last_value = v;
                frame += 1;
            }
        }

        // After the last event (or between events when `end_time` cuts the
        // range short): hold the last produced/known value.
        if let Some(last_event) = self.events.last() {
            while frame < num_frames {
                let t = frame_time(frame);
                if t < last_event.time {
                    out[frame] = last_value;
                } else {
                    last_value = last_event.value;
                    out[frame] = last_value;
                }
                frame += 1;
            }
        }

        last_value
    }
}

/// A named scalar parameter with a default/min/max, a sample-accurate
/// timeline, and a summing junction for audio-rate modulation.
///
/// `min <= internal_value <= max` is intentionally **not** enforced: the
/// timeline and modulation inputs may legally drive the value outside that
/// range, matching the behavior of the system this was modeled on.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default_value: f32,
    pub min_value: f32,
    pub max_value: f32,
    internal_value: f32,
    timeline: ParamTimeline,
    /// `true` once a param output (audio-rate modulation source) is
    /// connected. Maintained by the graph, not this type, since `Param`
    /// does not own graph edges.
    pub has_connected_input: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, default_value: f32, min_value: f32, max_value: f32) -> Self {
        Self {
            name: name.into(),
            default_value,
            min_value,
            max_value,
            internal_value: default_value,
            timeline: ParamTimeline::new(),
            has_connected_input: false,
        }
    }

    pub fn value(&self) -> f32 {
        self.internal_value
    }

    pub fn set_value(&mut self, value: f32) {
        self.internal_value = value;
    }

    pub fn timeline(&self) -> &ParamTimeline {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut ParamTimeline {
        &mut self.timeline
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.timeline.set_value_at_time(value, time);
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.timeline.linear_ramp_to_value_at_time(value, time);
    }

    pub fn exponential_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.timeline
            .exponential_ramp_to_value_at_time(value, time);
    }

    pub fn cancel_scheduled_values(&mut self, start_time: f64) {
        self.timeline.cancel_scheduled_values(start_time);
    }

    pub fn has_sample_accurate_values(&self) -> bool {
        !self.timeline.is_empty() || self.has_connected_input
    }

    /// Fill `out` with the timeline's values over `[start_time, end_time)`;
    /// the caller (the graph) is responsible for summing any connected
    /// modulation outputs into `out` afterward, since `Param` does not own
    /// the audio-rate summing bus (that belongs to the graph's param
    /// modulation junction).
    pub fn calculate_sample_accurate_values(
        &mut self,
        start_time: f64,
        end_time: f64,
        sample_rate: f64,
        out: &mut [f32],
    ) {
        let last = self.timeline.values_for_time_range(
            start_time,
            end_time,
            sample_rate,
            self.default_value,
            out,
        );
        self.internal_value = last;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_timeline_holds_default() {
        let t = ParamTimeline::new();
        let mut out = [0.0f32; 8];
        let v = t.values_for_time_range(0.0, 8.0 / 44100.0, 44100.0, 0.75, &mut out);
        assert_eq!(v, 0.75);
        assert!(out.iter().all(|&s| s == 0.75));
    }

    #[test]
    fn exponential_ramp_midpoint() {
        let mut t = ParamTimeline::new();
        t.set_value_at_time(1.0, 0.0);
        t.exponential_ramp_to_value_at_time(4.0, 1.0);

        let sample_rate = 1000.0;
        let mut out = vec![0.0f32; 1000];
        t.values_for_time_range(0.0, 1.0, sample_rate, 1.0, &mut out);

        let mid = out[500];
        let expected = 1.0f32 * (4.0f32 / 1.0f32).powf(0.5);
        assert!((mid - expected).abs() < 1e-2, "{mid} vs {expected}");
    }

    #[test]
    fn linear_ramp_down_to_zero() {
        let mut t = ParamTimeline::new();
        t.set_value_at_time(1.0, 0.0);
        t.linear_ramp_to_value_at_time(0.0, 0.02);

        let sample_rate = 44100.0;
        let mut out = vec![0.0f32; 883];
        t.values_for_time_range(0.0, 883.0 / sample_rate, sample_rate, 1.0, &mut out);

        for n in 0..=882usize {
            let expected = (1.0 - n as f32 / 882.0).max(0.0);
            assert!(
                (out[n] - expected).abs() < 1e-4,
                "n={n} {} vs {}",
                out[n],
                expected
            );
        }
    }

    #[test]
    fn cancel_scheduled_values_removes_future_events() {
        let mut t = ParamTimeline::new();
        t.set_value_at_time(1.0, 0.0);
        t.linear_ramp_to_value_at_time(0.0, 1.0);
        t.cancel_scheduled_values(0.5);
        assert_eq!(t.events().len(), 1);
    }
}
