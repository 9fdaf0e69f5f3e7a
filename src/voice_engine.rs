// src/voice_engine.rs
//
// Voice Engine: the signal graph and every sounding voice.
//
// Graph shape:
//
//   source [-> bandpass] -> voice gain -> channel bus -> master -> destination
//
// All calls are non-blocking. They push future changes onto the host's
// automation queue and return. Before `init` succeeds every operation is a
// silent no-op and start calls return `None`.

use std::collections::{BTreeMap, HashMap};

use crate::channel::{Channel, PulseChannel};
use crate::config::EngineConfig;
use crate::envelope::{self, Envelope, SMOOTHING, TRIANGLE_PEAK};
use crate::error::{EngineError, HostError, HostResult};
use crate::frequency::{clamp_midi, midi_to_frequency};
use crate::host::{AudioHost, BufferId, NodeId, OscillatorShape, Param, WaveId};
use crate::instrument::NoiseMode;
use crate::voice::{ActiveVoice, VoiceId};
use crate::waveform::{DutyCycle, PulseWaveSet};

/// Band-pass resonance for noise voices.
const NOISE_Q: f32 = 1.0;

/// Host objects built once at initialization.
#[derive(Debug, Clone)]
struct EngineGraph {
    master: NodeId,
    buses: [NodeId; 4],
    waves: [WaveId; 4],
    noise: BufferId,
}

/// What a voice sounds like, resolved before touching the host.
#[derive(Debug, Clone, Copy)]
enum VoiceKind {
    Pulse { wave: WaveId, frequency: f32 },
    Triangle { frequency: f32 },
    Noise { buffer: BufferId, frequency: f32 },
}

pub struct VoiceEngine<H: AudioHost> {
    config: EngineConfig,
    host: Option<H>,
    graph: Option<EngineGraph>,

    voices: BTreeMap<VoiceId, ActiveVoice>,
    by_source: HashMap<NodeId, VoiceId>,
    /// `None` once every id has been handed out.
    next_id: Option<VoiceId>,

    master_volume: f32,
    muted: bool,

    /// Set by a fatal host failure; the engine never becomes ready again.
    failed: bool,
}

impl<H: AudioHost> VoiceEngine<H> {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            master_volume: config.master_volume.clamp(0.0, 1.0),
            config,
            host: None,
            graph: None,
            voices: BTreeMap::new(),
            by_source: HashMap::new(),
            next_id: Some(VoiceId::FIRST),
            muted: false,
            failed: false,
        }
    }

    /// Attach the host and build buses, wave tables and the noise buffer.
    ///
    /// Calling again once ready is a no-op. After a failure the engine stays
    /// not-ready for the rest of the session.
    pub fn init(&mut self, host: H) -> Result<(), EngineError> {
        if self.failed {
            return Err(EngineError::Unavailable);
        }
        if self.graph.is_some() {
            log::debug!("voice engine already initialized");
            return Ok(());
        }

        let host = self.host.insert(host);
        match Self::build_graph(host, &self.config, self.master_volume) {
            Ok(graph) => {
                log::info!(
                    "voice engine ready ({} Hz, {} s noise)",
                    host.sample_rate(),
                    self.config.noise_seconds
                );
                self.graph = Some(graph);
                if self.muted {
                    self.apply_master_target();
                }
                Ok(())
            }
            Err(err) => {
                log::error!("voice engine initialization failed: {err}");
                self.failed = true;
                Err(EngineError::Init(err))
            }
        }
    }

    fn build_graph(host: &mut H, config: &EngineConfig, volume: f32) -> HostResult<EngineGraph> {
        let now = host.current_time();

        let master = host.create_gain()?;
        host.set_value_at_time(Param::gain(master), volume, now);
        let destination = host.destination();
        host.connect(master, destination);

        let mut buses = [master; 4];
        for bus in &mut buses {
            *bus = host.create_gain()?;
            host.connect(*bus, master);
        }

        let tables = PulseWaveSet::new();
        let mut waves = [WaveId(0); 4];
        for (duty, wave) in tables.iter() {
            waves[duty.index()] = host.create_periodic_wave(wave)?;
        }

        let noise = host.create_buffer(noise_samples(config, host.sample_rate()))?;

        Ok(EngineGraph {
            master,
            buses,
            waves,
            noise,
        })
    }

    //
    // ===============================
    // MARK: Readiness
    // ===============================
    //

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.graph.is_some() && self.host.is_some()
    }

    /// Whether a fatal failure retired the engine.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn host(&self) -> Option<&H> {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> Option<&mut H> {
        self.host.as_mut()
    }

    /// Audio-clock time, if a host is attached.
    pub fn current_time(&self) -> Option<f64> {
        self.host.as_ref().map(|h| h.current_time())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    //
    // ===============================
    // MARK: Voice start
    // ===============================
    //

    pub fn start_pulse(
        &mut self,
        channel: PulseChannel,
        pitch: u8,
        velocity: u8,
        duty: DutyCycle,
        envelope: &Envelope,
    ) -> Option<VoiceId> {
        let now = self.current_time()?;
        self.start_pulse_at(channel, pitch, velocity, duty, envelope, now)
    }

    /// Start a pulse voice at audio-clock time `when`.
    pub fn start_pulse_at(
        &mut self,
        channel: PulseChannel,
        pitch: u8,
        velocity: u8,
        duty: DutyCycle,
        envelope: &Envelope,
        when: f64,
    ) -> Option<VoiceId> {
        let wave = self.graph.as_ref()?.waves[duty.index()];
        let kind = VoiceKind::Pulse {
            wave,
            frequency: midi_to_frequency(pitch) as f32,
        };
        self.start_voice(
            Channel::from(channel),
            kind,
            envelope::peak_gain(clamp_midi(velocity)),
            envelope,
            when,
        )
    }

    pub fn start_triangle(&mut self, pitch: u8, envelope: &Envelope) -> Option<VoiceId> {
        let now = self.current_time()?;
        self.start_triangle_at(pitch, envelope, now)
    }

    /// Start a triangle voice at `when`. Peak gain is fixed; there is no velocity.
    pub fn start_triangle_at(
        &mut self,
        pitch: u8,
        envelope: &Envelope,
        when: f64,
    ) -> Option<VoiceId> {
        let kind = VoiceKind::Triangle {
            frequency: midi_to_frequency(pitch) as f32,
        };
        self.start_voice(Channel::Triangle, kind, TRIANGLE_PEAK, envelope, when)
    }

    pub fn start_noise(
        &mut self,
        mode: NoiseMode,
        frequency: f64,
        velocity: u8,
        envelope: &Envelope,
    ) -> Option<VoiceId> {
        let now = self.current_time()?;
        self.start_noise_at(mode, frequency, velocity, envelope, now)
    }

    /// Start a noise voice at `when`, band-passed around `frequency`.
    ///
    /// Both modes play the same shared buffer; `mode` only picks the preset
    /// envelope upstream.
    pub fn start_noise_at(
        &mut self,
        mode: NoiseMode,
        frequency: f64,
        velocity: u8,
        envelope: &Envelope,
        when: f64,
    ) -> Option<VoiceId> {
        let buffer = self.graph.as_ref()?.noise;
        log::trace!("noise voice ({mode:?}) at {frequency:.1} Hz");
        let kind = VoiceKind::Noise {
            buffer,
            frequency: frequency.max(0.0) as f32,
        };
        self.start_voice(
            Channel::Noise,
            kind,
            envelope::peak_gain(clamp_midi(velocity)),
            envelope,
            when,
        )
    }

    fn start_voice(
        &mut self,
        channel: Channel,
        kind: VoiceKind,
        peak: f32,
        envelope: &Envelope,
        when: f64,
    ) -> Option<VoiceId> {
        let (Some(host), Some(graph)) = (self.host.as_mut(), self.graph.as_ref()) else {
            log::debug!("voice start ignored: engine not ready");
            return None;
        };

        let Some(id) = self.next_id else {
            log::warn!("voice start ignored: voice ids exhausted");
            return None;
        };

        let when = when.max(host.current_time());
        let bus = graph.buses[channel.index()];

        match Self::build_voice(host, bus, kind, peak, envelope, when) {
            Ok((source, filter, gain)) => {
                self.next_id = id.next();

                self.by_source.insert(source, id);
                self.voices.insert(
                    id,
                    ActiveVoice {
                        id,
                        channel,
                        source,
                        filter,
                        gain,
                        started_at: when,
                        stopping: false,
                    },
                );
                log::trace!("{id} started on {channel} at {when:.4}");
                Some(id)
            }
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    /// Create and wire one voice. Nodes made before a failure are destroyed.
    fn build_voice(
        host: &mut H,
        bus: NodeId,
        kind: VoiceKind,
        peak: f32,
        envelope: &Envelope,
        when: f64,
    ) -> HostResult<(NodeId, Option<NodeId>, NodeId)> {
        let mut created = Vec::with_capacity(3);
        let result = Self::wire_voice(host, bus, kind, peak, envelope, when, &mut created);
        if result.is_err() {
            for node in created {
                host.destroy(node);
            }
        }
        result
    }

    fn wire_voice(
        host: &mut H,
        bus: NodeId,
        kind: VoiceKind,
        peak: f32,
        envelope: &Envelope,
        when: f64,
        created: &mut Vec<NodeId>,
    ) -> HostResult<(NodeId, Option<NodeId>, NodeId)> {
        let (source, filter) = match kind {
            VoiceKind::Pulse { wave, frequency } => {
                let osc = host.create_periodic_oscillator(wave)?;
                created.push(osc);
                host.set_value_at_time(Param::frequency(osc), frequency, when);
                (osc, None)
            }
            VoiceKind::Triangle { frequency } => {
                let osc = host.create_oscillator(OscillatorShape::Triangle)?;
                created.push(osc);
                host.set_value_at_time(Param::frequency(osc), frequency, when);
                (osc, None)
            }
            VoiceKind::Noise { buffer, frequency } => {
                let src = host.create_buffer_source(buffer, true)?;
                created.push(src);
                let filter = host.create_bandpass()?;
                created.push(filter);
                host.set_value_at_time(Param::frequency(filter), frequency, when);
                host.set_value_at_time(Param::q(filter), NOISE_Q, when);
                host.connect(src, filter);
                (src, Some(filter))
            }
        };

        let gain = host.create_gain()?;
        created.push(gain);
        envelope::apply_envelope(host, Param::gain(gain), peak, when, envelope);

        host.connect(filter.unwrap_or(source), gain);
        host.connect(gain, bus);
        host.start(source, when);

        Ok((source, filter, gain))
    }

    /// A host failure mid-session: tear down and stay not-ready.
    fn fail(&mut self, err: HostError) {
        log::error!("audio host failure, voice engine disabled: {err}");
        self.failed = true;
        self.teardown();
    }

    fn teardown(&mut self) {
        let graph = self.graph.take();
        let voices = std::mem::take(&mut self.voices);
        self.by_source.clear();

        let Some(host) = self.host.as_mut() else {
            return;
        };
        for voice in voices.values() {
            for node in voice.nodes() {
                host.destroy(node);
            }
        }
        if let Some(graph) = graph {
            for bus in graph.buses {
                host.destroy(bus);
            }
            host.destroy(graph.master);
            for wave in graph.waves {
                host.release_periodic_wave(wave);
            }
            host.release_buffer(graph.noise);
        }
    }

    //
    // ===============================
    // MARK: Voice stop
    // ===============================
    //

    /// Fade out and terminate a voice. Unknown or already stopping ids are ignored.
    pub fn stop(&mut self, id: VoiceId) {
        let Some(host) = self.host.as_mut() else {
            return;
        };
        if self.graph.is_none() {
            return;
        }
        let Some(voice) = self.voices.get_mut(&id) else {
            return;
        };
        if voice.stopping {
            return;
        }

        let now = host.current_time();
        let gain = Param::gain(voice.gain);
        let end = if voice.started_at > now {
            // still waiting for its start time: never let it sound
            envelope::silence_before_start(host, gain, now);
            now
        } else {
            envelope::apply_release(host, gain, now)
        };
        host.stop(voice.source, end);
        voice.stopping = true;

        log::trace!("{id} stopping, source ends at {end:.4}");
    }

    pub fn stop_all(&mut self) {
        let ids: Vec<VoiceId> = self.voices.keys().copied().collect();
        for id in ids {
            self.stop(id);
        }
    }

    /// Retire voices whose sources have ended, releasing their nodes.
    pub fn collect_ended(&mut self) -> Vec<VoiceId> {
        let Some(host) = self.host.as_mut() else {
            return Vec::new();
        };

        let mut retired = Vec::new();
        for node in host.take_ended() {
            let Some(id) = self.by_source.remove(&node) else {
                continue;
            };
            if let Some(voice) = self.voices.remove(&id) {
                for n in voice.nodes() {
                    host.destroy(n);
                }
                retired.push(id);
            }
        }
        retired
    }

    //
    // ===============================
    // MARK: Volume
    // ===============================
    //

    pub fn set_master_volume(&mut self, level: f32) {
        self.master_volume = level.clamp(0.0, 1.0);
        if !self.muted {
            self.apply_master_target();
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.apply_master_target();
    }

    fn apply_master_target(&mut self) {
        let target = if self.muted { 0.0 } else { self.master_volume };
        if let (Some(host), Some(graph)) = (self.host.as_mut(), self.graph.as_ref()) {
            let now = host.current_time();
            host.set_target_at_time(Param::gain(graph.master), target, now, SMOOTHING);
        }
    }

    /// Smoothly set the gain of one channel bus.
    pub fn set_channel_volume(&mut self, channel: Channel, level: f32) {
        if let (Some(host), Some(graph)) = (self.host.as_mut(), self.graph.as_ref()) {
            let now = host.current_time();
            let bus = graph.buses[channel.index()];
            host.set_target_at_time(Param::gain(bus), level.clamp(0.0, 1.0), now, SMOOTHING);
        }
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    //
    // ===============================
    // MARK: Inspection
    // ===============================
    //

    pub fn active_voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn is_live(&self, id: VoiceId) -> bool {
        self.voices.contains_key(&id)
    }

    pub fn voice(&self, id: VoiceId) -> Option<&ActiveVoice> {
        self.voices.get(&id)
    }

    pub fn voices(&self) -> impl Iterator<Item = &ActiveVoice> {
        self.voices.values()
    }

    /// The master bus gain parameter, once ready.
    pub fn master_param(&self) -> Option<Param> {
        self.graph.as_ref().map(|g| Param::gain(g.master))
    }

    pub fn bus_param(&self, channel: Channel) -> Option<Param> {
        self.graph
            .as_ref()
            .map(|g| Param::gain(g.buses[channel.index()]))
    }

    /// Stop every voice, release the graph and hand back the host.
    ///
    /// A disposed engine may be initialized again.
    pub fn dispose(&mut self) -> Option<H> {
        self.stop_all();
        self.teardown();
        self.host.take()
    }
}

/// White noise in [-1, 1) for the shared looping buffer.
fn noise_samples(config: &EngineConfig, sample_rate: f64) -> Vec<f32> {
    let len = (config.noise_seconds * sample_rate).round().max(1.0) as usize;
    let mut rng = match config.noise_seed {
        Some(seed) => fastrand::Rng::with_seed(seed),
        None => fastrand::Rng::new(),
    };
    (0..len).map(|_| rng.f32() * 2.0 - 1.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::STOP_TAIL;
    use crate::offline::OfflineHost;

    const SR: f64 = 8_000.0;

    fn ready_engine() -> VoiceEngine<OfflineHost> {
        let config = EngineConfig::new().with_sample_rate(SR).with_noise_seed(1);
        let mut engine = VoiceEngine::new(config);
        engine.init(OfflineHost::from_config(&config)).unwrap();
        engine
    }

    fn render(engine: &mut VoiceEngine<OfflineHost>, seconds: f64) -> Vec<f32> {
        engine.host_mut().unwrap().render_seconds(seconds)
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_not_ready_returns_none() {
        let mut engine: VoiceEngine<OfflineHost> = VoiceEngine::new(EngineConfig::default());
        let env = Envelope::default();

        assert!(!engine.is_ready());
        assert_eq!(
            engine.start_pulse(PulseChannel::A, 60, 100, DutyCycle::Half, &env),
            None
        );
        assert_eq!(engine.start_triangle(60, &env), None);
        assert_eq!(engine.start_noise(NoiseMode::Long, 1000.0, 100, &env), None);

        engine.stop(VoiceId::FIRST);
        engine.stop_all();
        engine.set_master_volume(0.3);
        assert_eq!(engine.master_volume(), 0.3);
    }

    #[test]
    fn test_ids_are_distinct_and_increasing() {
        let mut engine = ready_engine();
        let env = Envelope::default();

        let ids: Vec<VoiceId> = (0..5)
            .map(|i| {
                engine
                    .start_pulse(PulseChannel::B, 60 + i, 100, DutyCycle::Quarter, &env)
                    .unwrap()
            })
            .collect();

        for pair in ids.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        assert_eq!(engine.active_voice_count(), 5);
    }

    #[test]
    fn test_ids_are_never_reissued() {
        let mut engine = ready_engine();
        let env = Envelope::default();
        engine.next_id = VoiceId::from_raw(u32::MAX);

        let last = engine.start_triangle(60, &env).unwrap();
        assert_eq!(last.raw(), u32::MAX);
        assert_eq!(engine.start_triangle(62, &env), None);
        assert!(!engine.has_failed());
        assert!(engine.is_ready());
    }

    #[test]
    fn test_stop_one_keeps_others() {
        let mut engine = ready_engine();
        let env = Envelope::decay_sustain(0.1, 1.0);

        let a = engine.start_triangle(48, &env).unwrap();
        let b = engine.start_triangle(55, &env).unwrap();
        render(&mut engine, 0.05);

        engine.stop(a);
        render(&mut engine, STOP_TAIL + 0.01);
        let retired = engine.collect_ended();

        assert_eq!(retired, vec![a]);
        assert!(!engine.is_live(a));
        assert!(engine.is_live(b));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut engine = ready_engine();
        let env = Envelope::decay_sustain(0.1, 1.0);
        let id = engine
            .start_pulse(PulseChannel::A, 69, 127, DutyCycle::Half, &env)
            .unwrap();
        render(&mut engine, 0.05);

        engine.stop(id);
        let gain = Param::gain(engine.voice(id).unwrap().gain);
        let after_first = engine.host().unwrap().param_value(gain);
        engine.stop(id);
        assert_eq!(engine.host().unwrap().param_value(gain), after_first);

        // unknown ids are ignored
        engine.stop(VoiceId::from_raw(999).unwrap());
        assert_eq!(engine.active_voice_count(), 1);
    }

    #[test]
    fn test_voices_are_audible_and_fade() {
        let mut engine = ready_engine();
        let env = Envelope::decay_sustain(0.05, 1.0);
        let id = engine
            .start_pulse(PulseChannel::A, 69, 127, DutyCycle::Half, &env)
            .unwrap();

        let sounding = render(&mut engine, 0.1);
        assert!(peak(&sounding) > 0.1);

        engine.stop(id);
        render(&mut engine, 0.02);
        let after = render(&mut engine, 0.05);
        assert_eq!(peak(&after), 0.0);
        assert_eq!(engine.collect_ended(), vec![id]);
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn test_noise_voice_uses_bandpass() {
        let mut engine = ready_engine();
        let env = Envelope::decay_sustain(0.2, 1.0);
        let id = engine
            .start_noise(NoiseMode::Short, 1_000.0, 127, &env)
            .unwrap();

        let voice = engine.voice(id).unwrap();
        assert_eq!(voice.channel, Channel::Noise);
        let filter = voice.filter.unwrap();
        let host = engine.host().unwrap();
        assert_eq!(host.param_value(Param::frequency(filter)), 1_000.0);
        assert_eq!(host.param_value(Param::q(filter)), 1.0);

        assert!(peak(&render(&mut engine, 0.1)) > 0.0);
    }

    #[test]
    fn test_triangle_peak_ignores_velocity() {
        let mut engine = ready_engine();
        let env = Envelope::decay_sustain(1.0, 1.0);
        let id = engine.start_triangle(60, &env).unwrap();
        render(&mut engine, 0.005);

        let gain = Param::gain(engine.voice(id).unwrap().gain);
        let value = engine.host().unwrap().param_value(gain);
        assert!((value - TRIANGLE_PEAK).abs() < 1e-3);
    }

    #[test]
    fn test_master_volume_is_smoothed() {
        let mut engine = ready_engine();
        let master = engine.master_param().unwrap();
        render(&mut engine, 0.01);

        engine.set_master_volume(1.0);
        let immediately = engine.host().unwrap().param_value(master);
        assert!((immediately - 0.5).abs() < 1e-6);

        render(&mut engine, 0.1);
        assert!((engine.host().unwrap().param_value(master) - 1.0).abs() < 1e-3);

        engine.set_muted(true);
        render(&mut engine, 0.1);
        assert!(engine.host().unwrap().param_value(master) < 1e-3);
        assert!(engine.is_muted());
    }

    #[test]
    fn test_host_failure_is_fatal() {
        let config = EngineConfig::new().with_sample_rate(SR).with_noise_seed(1);
        let mut engine = VoiceEngine::new(config);
        // master + four buses, then nothing is left for voices
        let host = OfflineHost::from_config(&config).with_node_limit(5);
        engine.init(host).unwrap();

        let env = Envelope::default();
        assert_eq!(engine.start_triangle(60, &env), None);
        assert!(engine.has_failed());
        assert!(!engine.is_ready());
        assert_eq!(engine.start_triangle(60, &env), None);
        assert_eq!(
            engine.init(OfflineHost::from_config(&config)),
            Err(EngineError::Unavailable)
        );
    }

    #[test]
    fn test_partial_voice_is_cleaned_up() {
        let config = EngineConfig::new().with_sample_rate(SR).with_noise_seed(1);
        let mut engine = VoiceEngine::new(config);
        // the oscillator fits, its gain node does not
        let host = OfflineHost::from_config(&config).with_node_limit(6);
        engine.init(host).unwrap();

        let env = Envelope::default();
        assert_eq!(engine.start_triangle(60, &env), None);
        assert!(engine.has_failed());

        let host = engine.host().unwrap();
        assert_eq!(host.node_count(), 0);
        assert_eq!(host.wave_count(), 0);
        assert_eq!(host.buffer_count(), 0);
    }

    #[test]
    fn test_stop_before_start_stays_silent() {
        let mut engine = ready_engine();
        render(&mut engine, 0.01);
        let now = engine.current_time().unwrap();

        let env = Envelope::decay_sustain(0.1, 1.0);
        let id = engine
            .start_pulse_at(PulseChannel::A, 69, 13, DutyCycle::Half, &env, now + 0.003)
            .unwrap();
        engine.stop(id);

        let gain = Param::gain(engine.voice(id).unwrap().gain);
        assert_eq!(engine.host().unwrap().param_value(gain), 0.0);

        let out = render(&mut engine, 0.02);
        assert_eq!(peak(&out), 0.0);
        assert_eq!(engine.collect_ended(), vec![id]);
    }

    #[test]
    fn test_stop_all_mixes_pending_and_sounding() {
        let mut engine = ready_engine();
        let env = Envelope::decay_sustain(0.1, 1.0);
        let sounding = engine.start_triangle(48, &env).unwrap();
        render(&mut engine, 0.05);

        let now = engine.current_time().unwrap();
        let pending = engine.start_triangle_at(55, &env, now + 0.004).unwrap();
        engine.stop_all();

        // the sounding voice fades from its current level
        let gain = Param::gain(engine.voice(sounding).unwrap().gain);
        assert!((engine.host().unwrap().param_value(gain) - TRIANGLE_PEAK).abs() < 1e-3);

        let out = render(&mut engine, STOP_TAIL + 0.01);
        assert!(peak(&out) <= TRIANGLE_PEAK * 0.5 + 1e-6);

        let mut retired = engine.collect_ended();
        retired.sort();
        assert_eq!(retired, vec![sounding, pending]);
    }

    #[test]
    fn test_init_failure_leaves_not_ready() {
        let config = EngineConfig::new().with_sample_rate(SR);
        let mut engine = VoiceEngine::new(config);
        let host = OfflineHost::from_config(&config).with_node_limit(2);

        assert!(matches!(engine.init(host), Err(EngineError::Init(_))));
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_dispose_returns_host() {
        let mut engine = ready_engine();
        let env = Envelope::default();
        engine.start_triangle(60, &env).unwrap();

        let host = engine.dispose().unwrap();
        assert_eq!(host.node_count(), 0);
        assert!(!engine.is_ready());
        assert_eq!(engine.start_triangle(60, &env), None);
    }
}
