//! Integration Tests
//!
//! End-to-end tests across the timer, the persisted history and the
//! soundscape engine.

use std::time::Duration;

use approx::assert_abs_diff_eq;
use pretty_assertions::assert_eq;
use test_case::test_case;

use somnus::dsp::{ParamKind, PlaybackState};
use somnus::engine::buffer::rms;
use somnus::engine::soundscape::{OCEAN_LFO_DEPTH, OCEAN_LFO_HZ, OCEAN_WAVE_GAIN};
use somnus::engine::{export_wav, EngineState, Endpoint, ExportFormat, SoundKind, SoundscapeEngine};
use somnus::tracker::{
    format_elapsed, render_lines, FileStore, KeyValueStore, ManualClock, SessionTimer,
    SleepHistory, EMPTY_PLACEHOLDER, HISTORY_KEY,
};
use somnus::SomnusConfig;

fn engine_config(sample_rate: u32) -> SomnusConfig {
    SomnusConfig {
        sample_rate,
        noise_duration_secs: 0.5,
        noise_seed: Some(2024),
        ..SomnusConfig::default()
    }
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
}

/// Ratio of first-difference energy to signal energy; high for bright noise
fn brightness(samples: &[f32]) -> f32 {
    let diff: Vec<f32> = samples.windows(2).map(|w| w[1] - w[0]).collect();
    rms(&diff) / rms(samples)
}

// === History Persistence Tests ===

#[test]
fn test_history_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("store.json");

    let mut history = SleepHistory::new(FileStore::new(&path));
    history.add("2024-01-01", "7").unwrap();
    history.add("2024-01-02", "6.5").unwrap();
    drop(history);

    let reloaded = SleepHistory::new(FileStore::new(&path));
    assert_eq!(
        render_lines(&reloaded.load().unwrap()),
        vec!["2024-01-02  6.5 hrs", "2024-01-01  7 hrs"]
    );
}

#[test]
fn test_history_clear_then_reload_shows_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let mut history = SleepHistory::new(FileStore::new(&path));
    history.add("2024-01-01", "8").unwrap();
    history.clear().unwrap();

    let reloaded = SleepHistory::new(FileStore::new(&path));
    let entries = reloaded.load().unwrap();
    assert!(entries.is_empty());
    assert_eq!(render_lines(&entries), vec![EMPTY_PLACEHOLDER]);
    assert_eq!(reloaded.store().get(HISTORY_KEY).unwrap(), None);
}

#[test]
fn test_rejected_entry_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let mut history = SleepHistory::new(FileStore::new(&path));
    assert!(history.add("", "7").is_err());
    assert!(!path.exists());
}

// === Timer Tests ===

#[test_case(0, "00:00:00")]
#[test_case(3_661_000, "01:01:01")]
#[test_case(35_999_999, "09:59:59")]
#[test_case(359_999_000, "99:59:59")]
#[test_case(360_000_000, "100:00:00")]
fn test_timer_format(ms: u64, expected: &str) {
    assert_eq!(format_elapsed(ms), expected);
}

#[test]
fn test_timed_session_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new();
    let mut timer = SessionTimer::with_clock((), clock.clone(), Duration::from_secs(1));

    timer.start();
    clock.advance(Duration::from_secs(8 * 3600 + 12 * 60));
    timer.stop();
    timer.stop();

    let mut history = SleepHistory::new(FileStore::new(dir.path().join("store.json")));
    let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let entry = history
        .add_session(date, timer.last_session().unwrap())
        .unwrap();
    assert_eq!(entry.line(), "2024-06-01  8.2 hrs");
}

// === Soundscape Engine Tests ===

#[test]
fn test_replaying_keeps_one_graph_alive() {
    let mut engine = SoundscapeEngine::new(&engine_config(8000));
    let expected_nodes = [
        (SoundKind::White, 1),
        (SoundKind::Rain, 2),
        (SoundKind::Ocean, 4),
        (SoundKind::Rain, 2),
        (SoundKind::Rain, 2),
        (SoundKind::White, 1),
    ];

    let mut previous = Vec::new();
    for (kind, count) in expected_nodes {
        engine.play(kind).unwrap();
        engine.render(256);

        let graph = engine.context().unwrap();
        for id in &previous {
            assert!(!graph.contains(*id), "{} survived a replay", id);
        }
        assert_eq!(engine.active_nodes().len(), count);
        // destination + master + the soundscape
        assert_eq!(graph.node_count(), 2 + count);
        for id in engine.active_nodes().generators() {
            assert_eq!(graph.playback_state(id), Some(PlaybackState::Playing));
        }
        previous = engine.active_nodes().ids();
    }

    // Arena storage stays at the largest soundscape however long we replay
    for _ in 0..200 {
        engine.play(SoundKind::Ocean).unwrap();
        engine.play(SoundKind::Rain).unwrap();
    }
    assert_eq!(engine.context().unwrap().capacity(), 2 + 4);
}

#[test]
fn test_stop_twice_is_harmless() {
    let mut engine = SoundscapeEngine::new(&engine_config(8000));
    engine.play(SoundKind::Ocean).unwrap();

    let first = engine.stop();
    let second = engine.stop();

    assert_eq!(first.released, 4);
    assert_eq!(second.released, 0);
    assert_eq!(engine.state(), EngineState::Idle);
    assert!(!engine.is_stop_enabled());

    let silence = engine.render(512);
    assert_eq!(peak(silence.channel(0)), 0.0);
}

#[test]
fn test_volume_maps_to_master_gain() {
    let mut engine = SoundscapeEngine::new(&engine_config(8000));
    engine.set_volume(50);
    engine.play(SoundKind::White).unwrap();

    let master = engine.master().unwrap();
    let gain = engine.context().unwrap().param(master, ParamKind::Gain).unwrap();
    assert_abs_diff_eq!(gain, 0.5);
    assert_eq!(engine.volume_label(), "50%");

    engine.set_volume(150);
    assert_eq!(engine.volume_label(), "100%");
}

#[test]
fn test_volume_before_first_play_is_applied() {
    let mut engine = SoundscapeEngine::new(&engine_config(8000));
    engine.set_volume(20);
    assert!(engine.context().is_none());

    engine.play(SoundKind::Rain).unwrap();
    let master = engine.master().unwrap();
    let gain = engine.context().unwrap().param(master, ParamKind::Gain).unwrap();
    assert_abs_diff_eq!(gain, 0.2);
}

#[test]
fn test_white_noise_respects_master_volume() {
    let mut engine = SoundscapeEngine::new(&engine_config(8000));
    engine.set_volume(50);
    engine.play(SoundKind::White).unwrap();

    let out = engine.render_seconds(0.5);
    let loudest = peak(out.channel(0));
    assert!(loudest > 0.3, "peak {}", loudest);
    assert!(loudest <= 0.5 + 1e-6, "peak {}", loudest);
}

#[test]
fn test_rain_is_darker_than_white() {
    let mut engine = SoundscapeEngine::new(&engine_config(48000));

    engine.play(SoundKind::White).unwrap();
    let white = engine.render(8192);
    engine.play(SoundKind::Rain).unwrap();
    let rain = engine.render(8192);

    let white_brightness = brightness(white.channel(0));
    let rain_brightness = brightness(rain.channel(0));
    assert!(
        rain_brightness < white_brightness * 0.5,
        "rain {} vs white {}",
        rain_brightness,
        white_brightness
    );
}

#[test]
fn test_ocean_modulates_wave_gain() {
    let mut engine = SoundscapeEngine::new(&engine_config(8000));
    engine.play(SoundKind::Ocean).unwrap();

    let graph = engine.context().unwrap();
    let modulated = engine.active_nodes().ids().into_iter().any(|id| {
        graph
            .edges_of(id)
            .iter()
            .any(|edge| edge.to == Endpoint::Param(id, ParamKind::Gain))
    });
    assert!(modulated);
}

#[test]
fn test_ocean_swell_over_one_period() {
    let sample_rate = 8000;
    let mut engine = SoundscapeEngine::new(&engine_config(sample_rate));
    engine.set_volume(100);
    engine.play(SoundKind::Ocean).unwrap();

    // Registration order: source, wave gain, lfo, lfo depth
    let ids = engine.active_nodes().ids();
    assert_eq!(ids.len(), 4);
    let graph = engine.context().unwrap();
    assert_abs_diff_eq!(graph.param(ids[1], ParamKind::Gain).unwrap(), OCEAN_WAVE_GAIN);
    assert_abs_diff_eq!(graph.param(ids[2], ParamKind::Frequency).unwrap(), OCEAN_LFO_HZ);
    assert_abs_diff_eq!(graph.param(ids[3], ParamKind::Gain).unwrap(), OCEAN_LFO_DEPTH);
    assert_abs_diff_eq!(OCEAN_WAVE_GAIN, 0.4);
    assert_abs_diff_eq!(OCEAN_LFO_DEPTH, 0.25);
    assert_abs_diff_eq!(OCEAN_LFO_HZ, 0.15);

    let out = engine.render_seconds(1.0 / OCEAN_LFO_HZ);
    let window = sample_rate as usize / 10;
    let levels: Vec<f32> = out.channel(0).chunks_exact(window).map(rms).collect();
    let quietest = levels.iter().copied().fold(f32::INFINITY, f32::min);
    let loudest = levels.iter().copied().fold(0.0_f32, f32::max);

    // Uniform noise has RMS 1/sqrt(3); the envelope swings over 0.4 +/- 0.25
    let noise_rms = 1.0 / 3.0_f32.sqrt();
    let trough = noise_rms * (OCEAN_WAVE_GAIN - OCEAN_LFO_DEPTH);
    let crest = noise_rms * (OCEAN_WAVE_GAIN + OCEAN_LFO_DEPTH);
    assert!(
        (trough * 0.6..trough * 1.5).contains(&quietest),
        "quietest window {} vs trough {}",
        quietest,
        trough
    );
    assert!(
        (crest * 0.85..crest * 1.15).contains(&loudest),
        "loudest window {} vs crest {}",
        loudest,
        crest
    );
    assert!(loudest > quietest * 3.0);
}

#[test]
fn test_render_to_wav() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ocean.wav");
    let mut engine = SoundscapeEngine::new(&engine_config(16000));
    engine.play(SoundKind::Ocean).unwrap();

    let buffer = engine.render_seconds(1.0);
    assert!(buffer.is_finite());
    export_wav(&buffer, &path, ExportFormat::default()).unwrap();

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().sample_rate, 16000);
    assert_eq!(reader.len(), 16000);

    let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
    assert!(samples.iter().any(|s| *s != 0));
}
