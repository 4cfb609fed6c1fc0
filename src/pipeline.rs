//! One analysis run: decode, compute, render, export.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::analysis::{compute_all, FeatureKind, FeatureResult};
use crate::audio::decode::decode_audio;
use crate::config::Config;
use crate::error::{ComputeError, PipelineError};
use crate::export::write_png;
use crate::render::{build_plots, render_figure, RenderStyle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Loading,
    Computing,
    Rendering,
    Exporting,
    Done,
    Failed,
}

impl RunState {
    pub fn can_move_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, Loading)
            | (Loading, Computing)
            | (Computing, Rendering)
            | (Rendering, Exporting)
            | (Exporting, Done)
            | (Done | Failed, Idle) => true,
            (Loading | Computing | Rendering | Exporting, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

/// Everything a run needs, passed in explicitly by the front end.
#[derive(Debug)]
pub struct RunContext {
    config: Config,
    state: RunState,
    history: Vec<RunState>,
}

#[derive(Debug)]
pub struct RunReport {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Features drawn in grid order.
    pub order: Vec<FeatureKind>,
    /// Features that were drawn as placeholders, with the reason.
    pub unavailable: Vec<(FeatureKind, ComputeError)>,
    pub elapsed: Duration,
}

impl RunContext {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// States visited by the current run, starting at `Idle`.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Move to `next`; invalid transitions are refused and logged.
    pub fn transition(&mut self, next: RunState) -> bool {
        if !self.state.can_move_to(next) {
            log::error!("Refusing run state change {:?} -> {:?}", self.state, next);
            return false;
        }
        log::debug!("Run state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
        true
    }

    /// Return to `Idle` after a finished run.
    pub fn reset(&mut self) {
        if self.state.is_terminal() {
            self.transition(RunState::Idle);
        }
        self.history.clear();
        self.history.push(self.state);
    }
}

/// Run the whole pipeline for one input file. On error the context ends in
/// `Failed` and nothing is written.
pub fn run_pipeline(ctx: &mut RunContext, input: &Path) -> Result<RunReport, PipelineError> {
    ctx.reset();
    let started = Instant::now();
    match run_stages(ctx, input) {
        Ok(mut report) => {
            ctx.transition(RunState::Done);
            report.elapsed = started.elapsed();
            log::info!("Finished {} in {:.2?}", input.display(), report.elapsed);
            Ok(report)
        }
        Err(e) => {
            ctx.transition(RunState::Failed);
            log::error!("Analysis of {} failed: {}", input.display(), e);
            Err(e)
        }
    }
}

fn run_stages(ctx: &mut RunContext, input: &Path) -> Result<RunReport, PipelineError> {
    ctx.transition(RunState::Loading);
    ctx.config.analysis.validate().map_err(ComputeError::InvalidConfig)?;
    log::info!("Loading {}", input.display());
    let sample = decode_audio(input, &ctx.config.analysis)?;
    log::info!(
        "Decoded {} ({:.2}s at {} Hz, {} samples)",
        sample.source().unwrap_or(input).display(),
        sample.duration(),
        sample.sample_rate(),
        sample.len()
    );

    ctx.transition(RunState::Computing);
    let outcomes = compute_all(&sample, &ctx.config.analysis, &ctx.config.disabled);
    if outcomes.iter().all(|(_, r)| r.is_err()) {
        let first = outcomes
            .iter()
            .filter_map(|(_, r)| r.as_ref().err())
            .find(|e| **e != ComputeError::Disabled)
            .or_else(|| outcomes.iter().find_map(|(_, r)| r.as_ref().err()))
            .cloned()
            .unwrap_or(ComputeError::EmptySample);
        return Err(ComputeError::AllFailed(Box::new(first)).into());
    }
    for (_, result) in &outcomes {
        if let Ok(FeatureResult::Noise(noise)) = result {
            let peak_clip = noise.clip_ratio.values.iter().copied().fold(0.0f32, f32::max);
            let mean_flatness =
                noise.flatness.values.iter().sum::<f32>() / noise.flatness.values.len().max(1) as f32;
            log::info!(
                "Noise: {:.1}% of frames flagged, peak clip ratio {:.3}, mean flatness {:.3}",
                noise.flagged_fraction() * 100.0,
                peak_clip,
                mean_flatness
            );
        }
    }
    let unavailable: Vec<(FeatureKind, ComputeError)> = outcomes
        .iter()
        .filter_map(|(kind, r)| r.as_ref().err().map(|e| (*kind, e.clone())))
        .collect();

    ctx.transition(RunState::Rendering);
    let plots = build_plots(&outcomes);
    let title = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    let style = RenderStyle {
        width: ctx.config.output.width,
        height: ctx.config.output.height,
        text: ctx.config.output.text,
    };
    let figure = render_figure(&title, &plots, &style)?;

    ctx.transition(RunState::Exporting);
    let output = write_png(&figure, input, ctx.config.output.dir.as_deref())?;

    Ok(RunReport {
        output,
        width: figure.width,
        height: figure.height,
        order: plots.iter().map(|p| p.kind).collect(),
        unavailable,
        elapsed: Duration::ZERO,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    fn write_sine_wav(path: &Path, seconds: f32, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let n = (seconds * sample_rate as f32) as usize;
        for i in 0..n {
            let t = i as f32 / sample_rate as f32;
            let v = 0.5 * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
            writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn small_config() -> Config {
        let mut config = Config::default();
        config.output.width = 480;
        config.output.height = 300;
        config.output.text = false;
        config
    }

    #[test]
    fn transitions_follow_the_run_order() {
        use RunState::*;
        assert!(Idle.can_move_to(Loading));
        assert!(Exporting.can_move_to(Done));
        assert!(Computing.can_move_to(Failed));
        assert!(Failed.can_move_to(Idle));
        assert!(!Idle.can_move_to(Failed));
        assert!(!Loading.can_move_to(Rendering));
        assert!(!Done.can_move_to(Loading));
    }

    #[test]
    fn invalid_transition_is_refused() {
        let mut ctx = RunContext::new(Config::default());
        assert!(!ctx.transition(RunState::Exporting));
        assert_eq!(ctx.state(), RunState::Idle);
    }

    #[test]
    fn sine_file_produces_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        write_sine_wav(&input, 3.0, 44100);

        let mut ctx = RunContext::new(small_config());
        let report = run_pipeline(&mut ctx, &input).unwrap();

        assert_eq!(report.output, dir.path().join("tone.png"));
        assert!(report.output.exists());
        assert!(report.unavailable.is_empty(), "{:?}", report.unavailable);
        assert_eq!(ctx.state(), RunState::Done);
        assert_eq!(
            ctx.history(),
            &[
                RunState::Idle,
                RunState::Loading,
                RunState::Computing,
                RunState::Rendering,
                RunState::Exporting,
                RunState::Done
            ]
        );
    }

    #[test]
    fn repeated_runs_match() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        write_sine_wav(&input, 3.0, 44100);

        let mut ctx = RunContext::new(small_config());
        let first = run_pipeline(&mut ctx, &input).unwrap();
        let first_png = image::open(&first.output).unwrap().to_rgb8();
        let second = run_pipeline(&mut ctx, &input).unwrap();
        let second_png = image::open(&second.output).unwrap().to_rgb8();

        assert_eq!(first_png.dimensions(), (480, 300));
        assert_eq!(first_png.dimensions(), second_png.dimensions());
        assert_eq!(first.order, FeatureKind::ALL.to_vec());
        assert_eq!(first.order, second.order);
    }

    #[test]
    fn missing_file_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("absent.wav");

        let mut ctx = RunContext::new(small_config());
        let err = run_pipeline(&mut ctx, &input).unwrap_err();

        assert!(matches!(err, PipelineError::Decode(DecodeError::NotFound(_))));
        assert_eq!(ctx.state(), RunState::Failed);
        assert!(!dir.path().join("absent.png").exists());
    }

    #[test]
    fn disabled_features_become_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        write_sine_wav(&input, 1.0, 22050);

        let mut config = small_config();
        config.disabled = vec![FeatureKind::Tempo, FeatureKind::Chroma];
        config.output.dir = Some(dir.path().join("out"));
        let mut ctx = RunContext::new(config);
        let report = run_pipeline(&mut ctx, &input).unwrap();

        assert_eq!(report.output, dir.path().join("out").join("tone.png"));
        let kinds: Vec<FeatureKind> = report.unavailable.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![FeatureKind::Tempo, FeatureKind::Chroma]);
    }

    #[test]
    fn everything_disabled_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        write_sine_wav(&input, 0.5, 22050);

        let mut config = small_config();
        config.disabled = FeatureKind::ALL.to_vec();
        let mut ctx = RunContext::new(config);
        let err = run_pipeline(&mut ctx, &input).unwrap_err();

        assert!(matches!(err, PipelineError::Compute(ComputeError::AllFailed(_))));
        assert_eq!(ctx.state(), RunState::Failed);
        assert!(!dir.path().join("tone.png").exists());
    }
}
