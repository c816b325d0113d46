//! Noise generation and buffer playback
//!
//! Every soundscape starts from the same raw signal: a short buffer of
//! uniform white noise played on a loop.

use rand::Rng;
use serde_json::{json, Value};

use crate::dsp::node::{AudioNode, ParamInputs, SourceSchedule};
use crate::engine::buffer::{AudioBuffer, ChannelLayout};

/// Fill a buffer with independent uniform samples in [-1, 1]
///
/// Each channel gets its own random sequence.
///
/// # Arguments
/// * `duration_secs` - Buffer length in seconds
/// * `sample_rate` - Sample rate in Hz
/// * `layout` - Channel configuration
/// * `rng` - Random source
pub fn generate_noise<R: Rng + ?Sized>(
    duration_secs: f32,
    sample_rate: u32,
    layout: ChannelLayout,
    rng: &mut R,
) -> AudioBuffer {
    let num_samples = (duration_secs.max(0.0) * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_samples, layout, sample_rate);

    for channel in &mut buffer.samples {
        for sample in channel.iter_mut() {
            *sample = rng.gen_range(-1.0..=1.0);
        }
    }

    buffer
}

/// Plays an in-memory buffer, optionally looping it forever
///
/// The graph is mono, so only the buffer's first channel is played.
#[derive(Debug, Clone)]
pub struct BufferSourceNode {
    buffer: AudioBuffer,
    looping: bool,
    position: usize,
    schedule: SourceSchedule,
}

impl BufferSourceNode {
    pub fn new(buffer: AudioBuffer, looping: bool) -> Self {
        Self {
            buffer,
            looping,
            position: 0,
            schedule: SourceSchedule::default(),
        }
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }
}

impl AudioNode for BufferSourceNode {
    fn node_type(&self) -> &'static str {
        "buffer_source"
    }

    fn process(&mut self, _input: &[f32], _params: &ParamInputs, output: &mut [f32]) {
        output.fill(0.0);
        if !self.schedule.is_playing() || self.buffer.is_empty() {
            return;
        }

        let data = self.buffer.channel(0);
        for out in output.iter_mut() {
            if self.position >= data.len() {
                if !self.looping {
                    self.schedule.finish();
                    return;
                }
                self.position = 0;
            }
            *out = data[self.position];
            self.position += 1;
        }
    }

    fn schedule(&self) -> Option<&SourceSchedule> {
        Some(&self.schedule)
    }

    fn schedule_mut(&mut self) -> Option<&mut SourceSchedule> {
        Some(&mut self.schedule)
    }

    fn get_params(&self) -> Value {
        json!({
            "duration_secs": self.buffer.duration_secs(),
            "channels": self.buffer.num_channels(),
            "loop": self.looping,
            "state": self.schedule.state(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::node::PlaybackState;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_noise_length_and_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let buffer = generate_noise(2.0, 48000, ChannelLayout::Mono, &mut rng);
        assert_eq!(buffer.len(), 96000);
        assert!(buffer.channel(0).iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_noise_is_roughly_uniform() {
        let mut rng = StdRng::seed_from_u64(2);
        let buffer = generate_noise(1.0, 48000, ChannelLayout::Mono, &mut rng);
        let data = buffer.channel(0);
        let mean: f32 = data.iter().sum::<f32>() / data.len() as f32;
        let negatives = data.iter().filter(|&&s| s < 0.0).count() as f32 / data.len() as f32;
        assert!(mean.abs() < 0.02);
        assert!((negatives - 0.5).abs() < 0.02);
        // Uniform in [-1, 1] has RMS 1/sqrt(3)
        assert!((crate::engine::buffer::rms(data) - 0.577).abs() < 0.01);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut rng = StdRng::seed_from_u64(3);
        let buffer = generate_noise(0.1, 48000, ChannelLayout::Stereo, &mut rng);
        assert_ne!(buffer.channel(0), buffer.channel(1));
    }

    #[test]
    fn test_looping_source_wraps() {
        let buffer = AudioBuffer::from_mono(vec![0.1, 0.2, 0.3], 48000);
        let mut source = BufferSourceNode::new(buffer, true);
        source.schedule_mut().unwrap().start().unwrap();

        let mut out = [0.0; 7];
        source.process(&[], &ParamInputs::default(), &mut out);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1]);
        assert_eq!(source.schedule().unwrap().state(), PlaybackState::Playing);
    }

    #[test]
    fn test_one_shot_source_finishes() {
        let buffer = AudioBuffer::from_mono(vec![0.5, 0.5], 48000);
        let mut source = BufferSourceNode::new(buffer, false);
        source.schedule_mut().unwrap().start().unwrap();

        let mut out = [1.0; 4];
        source.process(&[], &ParamInputs::default(), &mut out);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0]);
        assert_eq!(source.schedule().unwrap().state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_unstarted_source_is_silent() {
        let buffer = AudioBuffer::from_mono(vec![0.5; 8], 48000);
        let mut source = BufferSourceNode::new(buffer, true);
        let mut out = [1.0; 8];
        source.process(&[], &ParamInputs::default(), &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
