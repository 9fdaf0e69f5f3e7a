// src/offline/automation.rs
//
// Parameter automation timelines.
//
// A timeline holds a default value plus time-ordered events. Evaluation
// walks the events up to the query time, so it is cheap for the handful of
// events a voice gain ever carries.

#[derive(Debug, Clone, Copy, PartialEq)]
enum Automation {
    SetValue { time: f64, value: f32 },
    LinearRamp { time: f64, value: f32 },
    SetTarget { time: f64, target: f32, time_constant: f64 },
}

impl Automation {
    #[inline]
    fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { time, .. }
            | Automation::LinearRamp { time, .. }
            | Automation::SetTarget { time, .. } => time,
        }
    }
}

/// Value the timeline holds from `anchor_time` onward, optionally
/// approaching a target exponentially.
#[derive(Debug, Clone, Copy)]
struct Segment {
    anchor_time: f64,
    anchor_value: f32,
    approach: Option<(f32, f64)>,
}

impl Segment {
    #[inline]
    fn eval(&self, t: f64) -> f32 {
        match self.approach {
            Some((target, tau)) if tau > 0.0 => {
                let elapsed = (t - self.anchor_time).max(0.0);
                target + (self.anchor_value - target) * (-elapsed / tau).exp() as f32
            }
            Some((target, _)) => target,
            None => self.anchor_value,
        }
    }
}

/// An automatable parameter.
#[derive(Debug, Clone)]
pub struct ParamTimeline {
    default: f32,
    events: Vec<Automation>,
}

impl ParamTimeline {
    pub fn new(default: f32) -> Self {
        Self {
            default,
            events: Vec::with_capacity(4),
        }
    }

    fn insert(&mut self, event: Automation) {
        let at = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(at, event);
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Automation::SetValue { time, value });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Automation::LinearRamp { time, value });
    }

    pub fn set_target_at_time(&mut self, target: f32, time: f64, time_constant: f64) {
        self.insert(Automation::SetTarget {
            time,
            target,
            time_constant,
        });
    }

    /// Remove every event scheduled at or after `from`.
    pub fn cancel_scheduled_values(&mut self, from: f64) {
        self.events.retain(|e| e.time() < from);
    }

    /// Evaluate the parameter at time `t`.
    pub fn value_at(&self, t: f64) -> f32 {
        let mut segment = Segment {
            anchor_time: 0.0,
            anchor_value: self.default,
            approach: None,
        };

        for event in &self.events {
            if event.time() > t {
                // A ramp ending in the future interpolates from the last anchor.
                if let Automation::LinearRamp { time, value } = *event {
                    let start_value = segment.eval(segment.anchor_time);
                    let span = time - segment.anchor_time;
                    if span <= 0.0 {
                        return value;
                    }
                    let progress = ((t - segment.anchor_time) / span).clamp(0.0, 1.0) as f32;
                    return start_value + (value - start_value) * progress;
                }
                return segment.eval(t);
            }

            segment = match *event {
                Automation::SetValue { time, value } | Automation::LinearRamp { time, value } => {
                    Segment {
                        anchor_time: time,
                        anchor_value: value,
                        approach: None,
                    }
                }
                Automation::SetTarget {
                    time,
                    target,
                    time_constant,
                } => Segment {
                    anchor_time: time,
                    anchor_value: segment.eval(time),
                    approach: Some((target, time_constant)),
                },
            };
        }

        segment.eval(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_default_without_events() {
        let p = ParamTimeline::new(0.7);
        assert_eq!(p.value_at(0.0), 0.7);
        assert_eq!(p.value_at(100.0), 0.7);
    }

    #[test]
    fn test_linear_ramp_interpolates() {
        let mut p = ParamTimeline::new(1.0);
        p.set_value_at_time(0.0, 1.0);
        p.linear_ramp_to_value_at_time(1.0, 2.0);

        assert_eq!(p.value_at(0.5), 1.0);
        assert!(close(p.value_at(1.0), 0.0));
        assert!(close(p.value_at(1.5), 0.5));
        assert!(close(p.value_at(3.0), 1.0));
    }

    #[test]
    fn test_chained_ramps() {
        let mut p = ParamTimeline::new(1.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 0.005);
        p.linear_ramp_to_value_at_time(0.5, 0.105);

        assert!(close(p.value_at(0.0025), 0.5));
        assert!(close(p.value_at(0.005), 1.0));
        assert!(close(p.value_at(0.055), 0.75));
        assert!(close(p.value_at(1.0), 0.5));
    }

    #[test]
    fn test_set_target_approaches() {
        let mut p = ParamTimeline::new(1.0);
        p.set_target_at_time(0.0, 0.0, 0.01);

        let after_one_tau = p.value_at(0.01);
        assert!(close(after_one_tau, (-1.0_f64).exp() as f32));
        assert!(p.value_at(0.1) < 1e-4);
    }

    #[test]
    fn test_cancel_drops_future_events() {
        let mut p = ParamTimeline::new(1.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 1.0);
        p.cancel_scheduled_values(0.5);

        assert_eq!(p.value_at(0.75), 0.0);
        assert_eq!(p.value_at(2.0), 0.0);
    }
}
