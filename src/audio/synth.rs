//! Sample generation for catalog sounds.
//!
//! A [`Voice`] is one oscillator or noise source rendered as mono `f32`
//! samples at [`SAMPLE_RATE`]. It implements `rodio::Source`, so the rodio
//! backend appends it to a sink as-is.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rodio::Source;

use super::catalog::{Effect, Envelope, SoundDefinition, Waveform};

pub const SAMPLE_RATE: u32 = 44_100;

/// Shared master volume read by every voice on every sample.
#[derive(Debug, Clone)]
pub struct MasterGain(Arc<AtomicU32>);

impl MasterGain {
    #[must_use]
    pub fn new(volume: f32) -> Self {
        Self(Arc::new(AtomicU32::new(volume.clamp(0.0, 1.0).to_bits())))
    }

    #[must_use]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Sets the volume, clamped to `[0, 1]`. Returns the stored value.
    pub fn set(&self, volume: f32) -> f32 {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.0.store(volume.to_bits(), Ordering::Relaxed);
        volume
    }
}

/// Signal generator of a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceSource {
    Oscillator { waveform: Waveform, frequency: f32 },
    Noise,
}

/// Frequency or amplitude modulation of a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modulation {
    None,
    Sweep { factor: f32 },
    Vibrato { rate_hz: f32, depth_hz: f32 },
    Tremolo { rate_hz: f32, depth: f32 },
}

/// Everything needed to render one voice.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSpec {
    pub source: VoiceSource,
    pub duration: Duration,
    pub envelope: Option<Envelope>,
    pub modulation: Modulation,
    /// Fixed gain applied on top of the envelope and master volume.
    pub level: f32,
}

/// Expands a catalog entry into the voices of one synthesis pass.
#[must_use]
pub fn voices_for(sound: &SoundDefinition) -> Vec<VoiceSpec> {
    let duration = sound.duration();
    let fundamental = VoiceSource::Oscillator {
        waveform: sound.waveform,
        frequency: sound.frequency,
    };
    let base = VoiceSpec {
        source: fundamental,
        duration,
        envelope: sound.envelope,
        modulation: Modulation::None,
        level: 1.0,
    };

    match sound.effect {
        Effect::None => vec![base],
        Effect::Sweep { factor } => vec![VoiceSpec {
            modulation: Modulation::Sweep { factor },
            ..base
        }],
        Effect::Vibrato { rate_hz, depth_hz } => vec![VoiceSpec {
            modulation: Modulation::Vibrato { rate_hz, depth_hz },
            ..base
        }],
        Effect::Tremolo { rate_hz, depth } => vec![VoiceSpec {
            modulation: Modulation::Tremolo { rate_hz, depth },
            ..base
        }],
        Effect::Noise => vec![VoiceSpec {
            source: VoiceSource::Noise,
            ..base
        }],
        Effect::Harmonics { partials } => {
            let mut voices = Vec::with_capacity(partials.len() + 1);
            voices.push(base.clone());
            // Partials ring at a constant level for the whole pass.
            voices.extend(partials.iter().map(|&(multiple, gain)| VoiceSpec {
                source: VoiceSource::Oscillator {
                    waveform: Waveform::Sine,
                    frequency: sound.frequency * multiple,
                },
                envelope: None,
                level: gain,
                ..base.clone()
            }));
            voices
        }
    }
}

/// Renders a [`VoiceSpec`] sample by sample.
pub struct Voice {
    spec: VoiceSpec,
    gain: MasterGain,
    noise: Vec<f32>,
    phase: f32,
    index: usize,
    total_samples: usize,
}

impl Voice {
    #[must_use]
    pub fn new(spec: VoiceSpec, gain: MasterGain) -> Self {
        let total_samples = (spec.duration.as_secs_f32() * SAMPLE_RATE as f32) as usize;
        let noise = match spec.source {
            VoiceSource::Noise => {
                let mut rng = rand::rng();
                (0..total_samples)
                    .map(|_| rng.random_range(-1.0..=1.0))
                    .collect()
            }
            VoiceSource::Oscillator { .. } => Vec::new(),
        };

        Self {
            spec,
            gain,
            noise,
            phase: 0.0,
            index: 0,
            total_samples,
        }
    }

    fn frequency_at(&self, base: f32, t: f32) -> f32 {
        match self.spec.modulation {
            Modulation::Sweep { factor } => {
                let half = self.spec.duration.as_secs_f32() / 2.0;
                if half <= 0.0 {
                    return base;
                }
                let position = 1.0 - (t / half - 1.0).abs();
                base * factor.powf(position.clamp(0.0, 1.0))
            }
            Modulation::Vibrato { rate_hz, depth_hz } => {
                base + depth_hz * (2.0 * PI * rate_hz * t).sin()
            }
            Modulation::None | Modulation::Tremolo { .. } => base,
        }
    }

    fn amplitude_at(&self, t: f32) -> f32 {
        let envelope = self
            .spec
            .envelope
            .map_or(1.0, |env| env.gain_at(t, self.spec.duration.as_secs_f32()));
        let tremolo = match self.spec.modulation {
            Modulation::Tremolo { rate_hz, depth } => 1.0 + depth * (2.0 * PI * rate_hz * t).sin(),
            _ => 1.0,
        };
        envelope * tremolo * self.spec.level * self.gain.get()
    }
}

fn oscillate(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        Waveform::Sine => (2.0 * PI * phase).sin(),
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Sawtooth => 2.0 * phase - 1.0,
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
    }
}

impl Iterator for Voice {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.total_samples {
            return None;
        }

        let t = self.index as f32 / SAMPLE_RATE as f32;
        let raw = match self.spec.source {
            VoiceSource::Noise => self.noise[self.index],
            VoiceSource::Oscillator {
                waveform,
                frequency,
            } => {
                let value = oscillate(waveform, self.phase);
                let step = self.frequency_at(frequency, t) / SAMPLE_RATE as f32;
                self.phase = (self.phase + step).rem_euclid(1.0);
                value
            }
        };

        self.index += 1;
        Some((raw * self.amplitude_at(t)).clamp(-1.0, 1.0))
    }
}

impl Source for Voice {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples - self.index)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.spec.duration)
    }
}
