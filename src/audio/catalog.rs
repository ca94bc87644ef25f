//! Fixed catalog of synthesized alarm sounds.
//!
//! Each entry is pure data: an oscillator shape, a base frequency, a pass
//! duration, an optional ADSR envelope and one [`Effect`]. Adding a sound
//! means adding a row to [`SOUNDS`].

use std::time::Duration;

use serde::Serialize;

/// Oscillator shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// Linear attack/decay/sustain/release envelope.
///
/// `attack`, `decay` and `release` are in seconds; `sustain` is a level
/// relative to the peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Envelope {
    const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// Gain at `t` seconds into a pass lasting `duration` seconds.
    ///
    /// Rises from 0 to 1 over the attack, falls to `sustain` over the decay,
    /// holds, then falls to 0 so that it reaches silence exactly at
    /// `duration`. The release never starts before the decay ends.
    #[must_use]
    pub fn gain_at(&self, t: f32, duration: f32) -> f32 {
        let decay_end = self.attack + self.decay;
        let release_start = (duration - self.release).max(decay_end);

        if t < 0.0 || t >= duration {
            0.0
        } else if t < self.attack {
            t / self.attack
        } else if t < decay_end {
            1.0 - (1.0 - self.sustain) * (t - self.attack) / self.decay
        } else if t < release_start {
            self.sustain
        } else {
            let span = duration - release_start;
            if span > 0.0 {
                self.sustain * (duration - t) / span
            } else {
                0.0
            }
        }
    }
}

/// Per-sound modulation or layering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Effect {
    None,
    /// Exponential sweep to `factor` times the base frequency at the midpoint
    /// and back.
    Sweep { factor: f32 },
    /// Frequency modulation.
    Vibrato { rate_hz: f32, depth_hz: f32 },
    /// Amplitude modulation.
    Tremolo { rate_hz: f32, depth: f32 },
    /// Extra partials as `(multiple, gain)` pairs.
    Harmonics { partials: &'static [(f32, f32)] },
    /// White noise instead of the oscillator.
    Noise,
}

/// One catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SoundDefinition {
    pub key: &'static str,
    pub name: &'static str,
    pub waveform: Waveform,
    pub frequency: f32,
    pub duration_secs: f32,
    pub envelope: Option<Envelope>,
    pub effect: Effect,
}

impl SoundDefinition {
    /// Length of one synthesis pass.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f32(self.duration_secs)
    }
}

pub const DEFAULT_SOUND: &str = "clock";

pub static SOUNDS: [SoundDefinition; 11] = [
    SoundDefinition {
        key: "clock",
        name: "Alarm Clock",
        waveform: Waveform::Square,
        frequency: 800.0,
        duration_secs: 1.0,
        envelope: Some(Envelope::new(0.01, 0.1, 0.3, 0.5)),
        effect: Effect::None,
    },
    SoundDefinition {
        key: "beep",
        name: "Beep",
        waveform: Waveform::Sine,
        frequency: 1000.0,
        duration_secs: 0.5,
        envelope: Some(Envelope::new(0.01, 0.05, 0.8, 0.1)),
        effect: Effect::None,
    },
    SoundDefinition {
        key: "rooster",
        name: "Rooster",
        waveform: Waveform::Sawtooth,
        frequency: 600.0,
        duration_secs: 2.0,
        envelope: Some(Envelope::new(0.1, 0.3, 0.4, 0.8)),
        effect: Effect::None,
    },
    SoundDefinition {
        key: "siren",
        name: "Siren",
        waveform: Waveform::Triangle,
        frequency: 440.0,
        duration_secs: 1.5,
        envelope: Some(Envelope::new(0.05, 0.1, 0.7, 0.3)),
        effect: Effect::Sweep { factor: 2.0 },
    },
    SoundDefinition {
        key: "nuclear",
        name: "Nuclear Alert",
        waveform: Waveform::Sawtooth,
        frequency: 200.0,
        duration_secs: 3.0,
        envelope: Some(Envelope::new(0.2, 0.5, 0.6, 1.0)),
        effect: Effect::None,
    },
    SoundDefinition {
        key: "alien",
        name: "Alien",
        waveform: Waveform::Square,
        frequency: 1200.0,
        duration_secs: 1.8,
        envelope: Some(Envelope::new(0.01, 0.2, 0.5, 0.4)),
        effect: Effect::Vibrato {
            rate_hz: 6.0,
            depth_hz: 50.0,
        },
    },
    SoundDefinition {
        key: "rain",
        name: "Rain",
        waveform: Waveform::Sine,
        frequency: 300.0,
        duration_secs: 4.0,
        envelope: Some(Envelope::new(0.5, 0.3, 0.8, 2.0)),
        effect: Effect::Noise,
    },
    SoundDefinition {
        key: "bomb",
        name: "Bomb",
        waveform: Waveform::Sawtooth,
        frequency: 80.0,
        duration_secs: 2.5,
        envelope: Some(Envelope::new(0.01, 0.8, 0.2, 1.5)),
        effect: Effect::None,
    },
    SoundDefinition {
        key: "mystery",
        name: "Mystery",
        waveform: Waveform::Triangle,
        frequency: 666.0,
        duration_secs: 2.2,
        envelope: Some(Envelope::new(0.3, 0.4, 0.6, 0.8)),
        effect: Effect::Tremolo {
            rate_hz: 4.0,
            depth: 0.3,
        },
    },
    SoundDefinition {
        key: "bell",
        name: "Bell",
        waveform: Waveform::Sine,
        frequency: 523.0,
        duration_secs: 3.0,
        envelope: Some(Envelope::new(0.01, 0.5, 0.3, 2.0)),
        effect: Effect::Harmonics {
            partials: &[(2.0, 0.3), (3.0, 0.1)],
        },
    },
    SoundDefinition {
        key: "whitenoise",
        name: "White Noise",
        waveform: Waveform::Square,
        frequency: 440.0,
        duration_secs: 5.0,
        envelope: None,
        effect: Effect::Noise,
    },
];

/// Looks up a sound by key.
#[must_use]
pub fn find_sound(key: &str) -> Option<&'static SoundDefinition> {
    SOUNDS.iter().find(|s| s.key == key)
}

/// Returns true if `key` names a catalog sound.
#[must_use]
pub fn is_known_sound(key: &str) -> bool {
    find_sound(key).is_some()
}

/// Display name for `key`, or `key` itself when unknown.
#[must_use]
pub fn sound_name(key: &str) -> &str {
    find_sound(key).map_or(key, |s| s.name)
}
