use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

use super::Cue;

const SAMPLE_RATE: u32 = 44100;
const AMPLITUDE: f32 = 0.3;
const FADE_SECS: f32 = 0.005;

/// Short synthesized cue: a few sine segments played back to back.
pub struct CueTone {
    /// (frequency Hz, length in samples)
    segments: Vec<(f32, u32)>,
    segment: usize,
    sample_in_segment: u32,
    sample_rate: u32,
}

impl CueTone {
    pub fn new(segments: &[(f32, Duration)]) -> Self {
        let segments = segments
            .iter()
            .map(|(freq, length)| (*freq, (length.as_secs_f32() * SAMPLE_RATE as f32) as u32))
            .collect();
        Self {
            segments,
            segment: 0,
            sample_in_segment: 0,
            sample_rate: SAMPLE_RATE,
        }
    }

    /// Rising two-note chime.
    pub fn success() -> Self {
        Self::new(&[
            (880.0, Duration::from_millis(90)),
            (1320.0, Duration::from_millis(140)),
        ])
    }

    /// Low falling buzz.
    pub fn failure() -> Self {
        Self::new(&[
            (220.0, Duration::from_millis(180)),
            (165.0, Duration::from_millis(220)),
        ])
    }

    pub fn for_cue(cue: Cue) -> Self {
        match cue {
            Cue::Success => Self::success(),
            Cue::Failure => Self::failure(),
        }
    }

    fn total_samples(&self) -> u32 {
        self.segments.iter().map(|(_, len)| *len).sum()
    }
}

impl Iterator for CueTone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let (freq, len) = *self.segments.get(self.segment)?;
        if self.sample_in_segment >= len {
            self.segment += 1;
            self.sample_in_segment = 0;
            return self.next();
        }

        let t = self.sample_in_segment as f32 / self.sample_rate as f32;
        let remaining = (len - self.sample_in_segment) as f32 / self.sample_rate as f32;
        // Short linear fades at both ends of every segment avoid clicks.
        let envelope = (t / FADE_SECS).min(remaining / FADE_SECS).min(1.0);

        self.sample_in_segment += 1;
        Some((2.0 * PI * freq * t).sin() * AMPLITUDE * envelope)
    }
}

impl Source for CueTone {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(
            self.total_samples() as f32 / self.sample_rate as f32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tones_are_finite_and_bounded() {
        for cue in [Cue::Success, Cue::Failure] {
            let tone = CueTone::for_cue(cue);
            let expected = tone.total_samples() as usize;
            let samples: Vec<f32> = tone.collect();
            assert_eq!(samples.len(), expected);
            assert!(samples.iter().all(|s| s.abs() <= AMPLITUDE));
        }
    }

    #[test]
    fn test_cues_are_short() {
        let duration = CueTone::failure().total_duration().unwrap();
        assert!(duration < Duration::from_secs(1));
    }
}
