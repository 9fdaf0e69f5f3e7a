// src/offline/mod.rs
//
// Software audio host.
//
// Renders the node graph sample by sample against its own clock. Native
// builds, the wasm worklet surface and the test suite all sit on this; a
// browser AudioContext binding would implement `AudioHost` directly instead.

mod automation;
mod nodes;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use automation::ParamTimeline;

use crate::config::EngineConfig;
use crate::error::{HostError, HostResult};
use crate::host::{
    AudioClock, AudioHost, BufferId, NodeId, OscillatorShape, Param, SharedClock, WaveId,
};
use crate::waveform::PeriodicWave;

use nodes::{BandpassState, HostNode, NodeKind, render_wavetable};

/// Web Audio defaults for freshly created nodes.
const DEFAULT_OSC_FREQUENCY: f32 = 440.0;
const DEFAULT_BANDPASS_FREQUENCY: f32 = 350.0;
const DEFAULT_BANDPASS_Q: f32 = 1.0;

const DESTINATION: u32 = 0;

/// One node in render order and the plan slots feeding it.
#[derive(Debug, Clone)]
struct RenderStep {
    node: u32,
    inputs: Vec<usize>,
}

pub struct OfflineHost {
    sample_rate: f64,
    clock: SharedClock,
    frames_rendered: u64,

    nodes: HashMap<u32, HostNode>,
    next_node: u32,
    node_limit: Option<usize>,

    /// Released slots are `None`; ids are never reused.
    waves: Vec<Option<Arc<[f32]>>>,
    buffers: Vec<Option<Arc<[f32]>>>,

    ended: Vec<NodeId>,

    plan: Vec<RenderStep>,
    plan_dirty: bool,
    scratch: Vec<f32>,
}

impl OfflineHost {
    pub fn new(sample_rate: f64) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(DESTINATION, HostNode::new(NodeKind::Destination));

        Self {
            sample_rate: sample_rate.max(1.0),
            clock: SharedClock::new(),
            frames_rendered: 0,
            nodes,
            next_node: DESTINATION + 1,
            node_limit: None,
            waves: Vec::new(),
            buffers: Vec::new(),
            ended: Vec::new(),
            plan: Vec::new(),
            plan_dirty: true,
            scratch: Vec::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.sample_rate)
    }

    /// Refuse node creation once `limit` nodes (besides the destination) are live.
    pub fn with_node_limit(mut self, limit: usize) -> Self {
        self.node_limit = Some(limit);
        self
    }

    /// Live nodes, not counting the destination.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Periodic waves still registered.
    pub fn wave_count(&self) -> usize {
        self.waves.iter().filter(|w| w.is_some()).count()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_some()).count()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node.0)
    }

    /// Render mono output into `out` and advance the clock by its length.
    pub fn render(&mut self, out: &mut [f32]) {
        if self.plan_dirty {
            self.rebuild_plan();
        }

        let sr = self.sample_rate;
        let sr32 = sr as f32;
        let steps = self.plan.len();
        self.scratch.resize(steps, 0.0);

        for (i, sample) in out.iter_mut().enumerate() {
            let t = (self.frames_rendered + i as u64) as f64 / sr;

            for s in 0..steps {
                let input: f32 = self.plan[s].inputs.iter().map(|&j| self.scratch[j]).sum();
                let value = match self.nodes.get_mut(&self.plan[s].node) {
                    Some(node) => node.process(t, input, sr32),
                    None => 0.0,
                };
                self.scratch[s] = value;
            }

            *sample = if steps > 0 { self.scratch[steps - 1] } else { 0.0 };
        }

        self.frames_rendered += out.len() as u64;
        self.clock.set(self.frames_rendered as f64 / sr);
        self.collect_finished();
    }

    /// Render `seconds` of audio, returning the samples.
    pub fn render_seconds(&mut self, seconds: f64) -> Vec<f32> {
        let frames = (seconds.max(0.0) * self.sample_rate).round() as usize;
        let mut out = vec![0.0; frames];
        self.render(&mut out);
        out
    }

    fn collect_finished(&mut self) {
        let now = self.current_time();
        let mut finished: Vec<u32> = self
            .nodes
            .iter()
            .filter(|(_, node)| !node.ended && node.has_finished(now))
            .map(|(&id, _)| id)
            .collect();
        finished.sort_unstable();

        for id in finished {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.ended = true;
            }
            self.ended.push(NodeId(id));
        }
    }

    /// Post-order walk from the destination, so every node renders after its inputs.
    fn rebuild_plan(&mut self) {
        let mut order: Vec<u32> = Vec::with_capacity(self.nodes.len());
        let mut done: HashSet<u32> = HashSet::new();
        let mut visiting: HashSet<u32> = HashSet::new();
        let mut stack: Vec<(u32, usize)> = vec![(DESTINATION, 0)];
        visiting.insert(DESTINATION);

        while let Some((id, next_input)) = stack.pop() {
            let child = self
                .nodes
                .get(&id)
                .and_then(|n| n.inputs.get(next_input).copied());

            match child {
                Some(child) => {
                    stack.push((id, next_input + 1));
                    if !done.contains(&child)
                        && !visiting.contains(&child)
                        && self.nodes.contains_key(&child)
                    {
                        visiting.insert(child);
                        stack.push((child, 0));
                    }
                }
                None => {
                    visiting.remove(&id);
                    done.insert(id);
                    order.push(id);
                }
            }
        }

        let slot: HashMap<u32, usize> = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        self.plan = order
            .iter()
            .map(|&id| RenderStep {
                node: id,
                inputs: self
                    .nodes
                    .get(&id)
                    .map(|n| {
                        n.inputs
                            .iter()
                            .filter_map(|input| slot.get(input).copied())
                            .filter(|&j| j < slot[&id])
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();
        self.plan_dirty = false;
    }

    fn insert_node(&mut self, kind: NodeKind) -> HostResult<NodeId> {
        if let Some(limit) = self.node_limit {
            if self.node_count() >= limit {
                return Err(HostError::NodeLimit { limit });
            }
        }
        let id = self.next_node;
        self.next_node += 1;
        self.nodes.insert(id, HostNode::new(kind));
        Ok(NodeId(id))
    }

    fn timeline_mut(&mut self, param: Param) -> Option<&mut ParamTimeline> {
        self.nodes
            .get_mut(&param.node.0)
            .and_then(|n| n.kind.param_mut(param.kind))
    }
}

impl Default for OfflineHost {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SAMPLE_RATE)
    }
}

impl AudioHost for OfflineHost {
    fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn destination(&self) -> NodeId {
        NodeId(DESTINATION)
    }

    fn create_gain(&mut self) -> HostResult<NodeId> {
        self.insert_node(NodeKind::Gain {
            gain: ParamTimeline::new(1.0),
        })
    }

    fn create_periodic_wave(&mut self, wave: &PeriodicWave) -> HostResult<WaveId> {
        let id = self.waves.len() as u32;
        self.waves.push(Some(render_wavetable(wave.real(), wave.imag())));
        Ok(WaveId(id))
    }

    fn create_periodic_oscillator(&mut self, wave: WaveId) -> HostResult<NodeId> {
        let table = self
            .waves
            .get(wave.0 as usize)
            .and_then(Option::clone)
            .ok_or(HostError::UnknownHandle {
                kind: "periodic wave",
                id: wave.0,
            })?;
        self.insert_node(NodeKind::PeriodicOscillator {
            table,
            frequency: ParamTimeline::new(DEFAULT_OSC_FREQUENCY),
            phase: 0.0,
        })
    }

    fn create_oscillator(&mut self, shape: OscillatorShape) -> HostResult<NodeId> {
        self.insert_node(NodeKind::Oscillator {
            shape,
            frequency: ParamTimeline::new(DEFAULT_OSC_FREQUENCY),
            phase: 0.0,
        })
    }

    fn create_buffer(&mut self, samples: Vec<f32>) -> HostResult<BufferId> {
        if samples.is_empty() {
            return Err(HostError::NodeCreation { kind: "buffer" });
        }
        let id = self.buffers.len() as u32;
        self.buffers.push(Some(samples.into()));
        Ok(BufferId(id))
    }

    fn create_buffer_source(&mut self, buffer: BufferId, looping: bool) -> HostResult<NodeId> {
        let samples = self
            .buffers
            .get(buffer.0 as usize)
            .and_then(Option::clone)
            .ok_or(HostError::UnknownHandle {
                kind: "buffer",
                id: buffer.0,
            })?;
        self.insert_node(NodeKind::BufferSource {
            buffer: samples,
            looping,
            position: 0,
        })
    }

    fn release_periodic_wave(&mut self, wave: WaveId) {
        if let Some(slot) = self.waves.get_mut(wave.0 as usize) {
            *slot = None;
        }
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        if let Some(slot) = self.buffers.get_mut(buffer.0 as usize) {
            *slot = None;
        }
    }

    fn create_bandpass(&mut self) -> HostResult<NodeId> {
        self.insert_node(NodeKind::Bandpass {
            frequency: ParamTimeline::new(DEFAULT_BANDPASS_FREQUENCY),
            q: ParamTimeline::new(DEFAULT_BANDPASS_Q),
            state: BandpassState::new(),
        })
    }

    fn connect(&mut self, from: NodeId, to: NodeId) {
        if from == to || !self.nodes.contains_key(&from.0) {
            return;
        }
        if let Some(target) = self.nodes.get_mut(&to.0) {
            if !target.inputs.contains(&from.0) {
                target.inputs.push(from.0);
                self.plan_dirty = true;
            }
        }
    }

    fn destroy(&mut self, node: NodeId) {
        if node.0 == DESTINATION || self.nodes.remove(&node.0).is_none() {
            return;
        }
        for other in self.nodes.values_mut() {
            other.inputs.retain(|&i| i != node.0);
        }
        self.plan_dirty = true;
    }

    fn start(&mut self, node: NodeId, when: f64) {
        if let Some(n) = self.nodes.get_mut(&node.0) {
            if n.kind.is_source() && n.start.is_none() {
                n.start = Some(when.max(0.0));
            }
        }
    }

    fn stop(&mut self, node: NodeId, when: f64) {
        if let Some(n) = self.nodes.get_mut(&node.0) {
            if n.kind.is_source() && !n.ended {
                n.stop = Some(when.max(0.0));
            }
        }
    }

    fn param_value(&self, param: Param) -> f32 {
        let now = self.current_time();
        self.nodes
            .get(&param.node.0)
            .and_then(|n| n.kind.param(param.kind))
            .map(|p| p.value_at(now))
            .unwrap_or(0.0)
    }

    fn set_value_at_time(&mut self, param: Param, value: f32, when: f64) {
        if let Some(p) = self.timeline_mut(param) {
            p.set_value_at_time(value, when);
        }
    }

    fn linear_ramp_to_value_at_time(&mut self, param: Param, value: f32, end_time: f64) {
        if let Some(p) = self.timeline_mut(param) {
            p.linear_ramp_to_value_at_time(value, end_time);
        }
    }

    fn set_target_at_time(&mut self, param: Param, target: f32, start: f64, time_constant: f64) {
        if let Some(p) = self.timeline_mut(param) {
            p.set_target_at_time(target, start, time_constant);
        }
    }

    fn cancel_scheduled_values(&mut self, param: Param, from: f64) {
        if let Some(p) = self.timeline_mut(param) {
            p.cancel_scheduled_values(from);
        }
    }

    fn take_ended(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::DutyCycle;

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    fn triangle_into_destination(host: &mut OfflineHost) -> (NodeId, NodeId) {
        let osc = host.create_oscillator(OscillatorShape::Triangle).unwrap();
        let gain = host.create_gain().unwrap();
        host.connect(osc, gain);
        let dest = host.destination();
        host.connect(gain, dest);
        (osc, gain)
    }

    #[test]
    fn test_silence_without_sources() {
        let mut host = OfflineHost::new(8_000.0);
        let out = host.render_seconds(0.1);
        assert_eq!(out.len(), 800);
        assert_eq!(peak(&out), 0.0);
        assert!((host.current_time() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_started_source_reaches_destination() {
        let mut host = OfflineHost::new(8_000.0);
        let (osc, _) = triangle_into_destination(&mut host);
        host.start(osc, 0.0);

        let out = host.render_seconds(0.05);
        assert!(peak(&out) > 0.9);
    }

    #[test]
    fn test_periodic_oscillator_uses_wave() {
        let mut host = OfflineHost::new(8_000.0);
        let wave = host
            .create_periodic_wave(&PeriodicWave::pulse(DutyCycle::Half))
            .unwrap();
        let osc = host.create_periodic_oscillator(wave).unwrap();
        let dest = host.destination();
        host.connect(osc, dest);
        host.start(osc, 0.0);

        let out = host.render_seconds(0.05);
        assert!(peak(&out) > 0.5);
    }

    #[test]
    fn test_gain_automation_shapes_output() {
        let mut host = OfflineHost::new(8_000.0);
        let (osc, gain) = triangle_into_destination(&mut host);
        host.set_value_at_time(Param::gain(gain), 0.0, 0.0);
        host.start(osc, 0.0);

        let out = host.render_seconds(0.05);
        assert_eq!(peak(&out), 0.0);

        host.set_value_at_time(Param::gain(gain), 0.5, 0.05);
        let out = host.render_seconds(0.05);
        assert!(peak(&out) > 0.4 && peak(&out) <= 0.5 + 1e-6);
        assert_eq!(host.param_value(Param::gain(gain)), 0.5);
    }

    #[test]
    fn test_stop_reports_ended_once() {
        let mut host = OfflineHost::new(8_000.0);
        let (osc, _) = triangle_into_destination(&mut host);
        host.start(osc, 0.0);
        host.stop(osc, 0.02);

        host.render_seconds(0.01);
        assert!(host.take_ended().is_empty());

        let out = host.render_seconds(0.02);
        assert_eq!(host.take_ended(), vec![osc]);
        assert_eq!(out[out.len() - 1], 0.0);

        host.render_seconds(0.02);
        assert!(host.take_ended().is_empty());
    }

    #[test]
    fn test_destroy_disconnects() {
        let mut host = OfflineHost::new(8_000.0);
        let (osc, gain) = triangle_into_destination(&mut host);
        host.start(osc, 0.0);
        host.destroy(gain);

        assert!(!host.contains(gain));
        assert_eq!(host.node_count(), 1);
        assert_eq!(peak(&host.render_seconds(0.02)), 0.0);

        // destination survives
        let dest = host.destination();
        host.destroy(dest);
        assert!(host.contains(dest));
    }

    #[test]
    fn test_node_limit_refuses_creation() {
        let mut host = OfflineHost::new(8_000.0).with_node_limit(1);
        assert!(host.create_gain().is_ok());
        assert_eq!(host.create_gain(), Err(HostError::NodeLimit { limit: 1 }));
    }

    #[test]
    fn test_empty_buffer_is_refused() {
        let mut host = OfflineHost::new(8_000.0);
        assert_eq!(
            host.create_buffer(Vec::new()),
            Err(HostError::NodeCreation { kind: "buffer" })
        );
        assert_eq!(host.buffer_count(), 0);
    }

    #[test]
    fn test_released_handles_are_gone() {
        let mut host = OfflineHost::new(8_000.0);
        let wave = host
            .create_periodic_wave(&PeriodicWave::pulse(DutyCycle::Quarter))
            .unwrap();
        let buffer = host.create_buffer(vec![0.5; 16]).unwrap();
        assert_eq!((host.wave_count(), host.buffer_count()), (1, 1));

        host.release_periodic_wave(wave);
        host.release_buffer(buffer);
        assert_eq!((host.wave_count(), host.buffer_count()), (0, 0));
        assert!(host.create_periodic_oscillator(wave).is_err());
        assert!(host.create_buffer_source(buffer, false).is_err());

        // fresh handles do not alias released ones
        let next = host.create_buffer(vec![0.5; 16]).unwrap();
        assert_ne!(next, buffer);
    }

    #[test]
    fn test_unknown_handles_are_errors() {
        let mut host = OfflineHost::new(8_000.0);
        assert!(matches!(
            host.create_periodic_oscillator(WaveId(3)),
            Err(HostError::UnknownHandle { .. })
        ));
        assert!(matches!(
            host.create_buffer_source(BufferId(0), true),
            Err(HostError::UnknownHandle { .. })
        ));
    }

    #[test]
    fn test_clock_is_shared() {
        let mut host = OfflineHost::new(1_000.0);
        let clock = host.clock();
        host.render_seconds(0.25);
        assert!((clock.current_time() - 0.25).abs() < 1e-9);
    }
}
