use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::knob::RotaryControl;

pub const FREQUENCY: &str = "FREQUENCY";
pub const LOW_PASS: &str = "LOW-PASS";
pub const SPEED: &str = "SPEED";
pub const ECHO: &str = "ECHO";
pub const REVERB: &str = "REVERB";

/// Top of the LOW-PASS dial. At the stop the filter is bypassed.
pub const LOW_PASS_MAX: f64 = 8_000.0;

const DEFAULT_FREQUENCY_HZ: f64 = 440.0;

/// Frozen control values, captured when GENERATE is pressed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSnapshot {
    values: BTreeMap<String, f64>,
}

impl ParameterSnapshot {
    pub fn capture<'a>(controls: impl IntoIterator<Item = &'a RotaryControl>) -> Self {
        controls
            .into_iter()
            .map(|control| (control.label(), control.value()))
            .collect()
    }

    pub fn with(mut self, label: &str, value: f64) -> Self {
        self.values.insert(label.to_string(), value);
        self
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.values.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, f64)> for ParameterSnapshot {
    fn from_iter<T: IntoIterator<Item = (&'a str, f64)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(label, value)| (label.to_string(), value))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StageSpec {
    Tone { seconds: f64, frequency: f64 },
    Speed { factor: f64 },
    LowPass { cutoff: f64 },
    /// Two taps played together, in seconds.
    Delay { taps: [f64; 2] },
    /// Engine-native 0..100 scale.
    Reverb { amount: f64 },
    Repeat { count: u32 },
}

impl StageSpec {
    pub fn name(&self) -> &'static str {
        match self {
            StageSpec::Tone { .. } => "synth",
            StageSpec::Speed { .. } => "speed",
            StageSpec::LowPass { .. } => "lowpass",
            StageSpec::Delay { .. } => "delay",
            StageSpec::Reverb { .. } => "reverb",
            StageSpec::Repeat { .. } => "repeat",
        }
    }

    fn push_args(&self, args: &mut Vec<String>) {
        args.push(self.name().to_string());
        match self {
            StageSpec::Tone { seconds, frequency } => {
                args.push(number(*seconds));
                args.push("sine".to_string());
                args.push(number(*frequency));
            }
            StageSpec::Speed { factor } => args.push(number(*factor)),
            StageSpec::LowPass { cutoff } => args.push(number(*cutoff)),
            StageSpec::Delay { taps } => args.extend(taps.iter().map(|tap| number(*tap))),
            StageSpec::Reverb { amount } => args.push(number(*amount)),
            StageSpec::Repeat { count } => args.push(count.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub bits: u16,
}

/// Everything the engine needs for one run, without any shell quoting.
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationDescription {
    pub input: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub output: PathBuf,
    pub stages: Vec<StageSpec>,
}

impl InvocationDescription {
    /// Same chain, rendered somewhere else.
    pub fn with_output(&self, output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            ..self.clone()
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match &self.input {
            Some(path) => args.push(path_arg(path)),
            None => args.push("-n".to_string()),
        }
        if let Some(format) = self.format {
            args.push("-r".to_string());
            args.push(format.sample_rate.to_string());
            args.push("-b".to_string());
            args.push(format.bits.to_string());
        }
        args.push(path_arg(&self.output));
        for stage in &self.stages {
            stage.push_args(&mut args);
        }
        args
    }

    pub fn command_line(&self, program: &str) -> String {
        let mut line = program.to_string();
        for arg in self.to_args() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChainSettings {
    pub format: OutputFormat,
    pub tone_seconds: f64,
    /// Cutoffs at or above this skip the filter stage.
    pub lowpass_ceiling: f64,
    pub neutral_speed: f64,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat {
                sample_rate: 44_100,
                bits: 16,
            },
            tone_seconds: 3.0,
            lowpass_ceiling: LOW_PASS_MAX,
            neutral_speed: 1.0,
        }
    }
}

/// Turns a snapshot into the processing chain. Stage order follows the
/// signal path: source, speed, filter, delay, reverb.
#[derive(Clone, Debug, Default)]
pub struct EffectChainBuilder {
    settings: ChainSettings,
}

impl EffectChainBuilder {
    pub fn new(settings: ChainSettings) -> Self {
        Self { settings }
    }

    pub fn build(&self, snapshot: &ParameterSnapshot, output: &Path) -> InvocationDescription {
        let settings = &self.settings;
        let frequency = snapshot.get(FREQUENCY).unwrap_or(DEFAULT_FREQUENCY_HZ);
        let speed = snapshot.get(SPEED).unwrap_or(settings.neutral_speed);
        let cutoff = snapshot.get(LOW_PASS).unwrap_or(settings.lowpass_ceiling);
        let echo = snapshot.get(ECHO).unwrap_or(0.0);
        let reverb = snapshot.get(REVERB).unwrap_or(0.0);

        let mut stages = vec![StageSpec::Tone {
            seconds: settings.tone_seconds,
            frequency,
        }];
        if speed != settings.neutral_speed {
            stages.push(StageSpec::Speed { factor: speed });
        }
        if cutoff < settings.lowpass_ceiling {
            stages.push(StageSpec::LowPass { cutoff });
        }
        if echo > 0.0 {
            let delay = echo / 100.0;
            stages.push(StageSpec::Delay {
                taps: [delay, delay / 2.0],
            });
        }
        if reverb > 0.0 {
            stages.push(StageSpec::Reverb { amount: reverb });
        }

        InvocationDescription {
            input: None,
            format: Some(settings.format),
            output: output.to_path_buf(),
            stages,
        }
    }

    pub fn build_loop(&self, current: &Path, looped: &Path, repeats: u32) -> InvocationDescription {
        InvocationDescription {
            input: Some(current.to_path_buf()),
            format: None,
            output: looped.to_path_buf(),
            stages: vec![StageSpec::Repeat { count: repeats }],
        }
    }
}

fn number(value: f64) -> String {
    format!("{value}")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(frequency: f64, speed: f64, lowpass: f64, echo: f64, reverb: f64) -> ParameterSnapshot {
        ParameterSnapshot::default()
            .with(FREQUENCY, frequency)
            .with(SPEED, speed)
            .with(LOW_PASS, lowpass)
            .with(ECHO, echo)
            .with(REVERB, reverb)
    }

    fn build(snapshot: &ParameterSnapshot) -> InvocationDescription {
        EffectChainBuilder::default().build(snapshot, Path::new("/tmp/delia_current.wav"))
    }

    #[test]
    fn test_neutral_controls_give_bare_tone() {
        let description = build(&snapshot(440.0, 1.0, 8000.0, 0.0, 0.0));
        assert_eq!(
            description.stages,
            vec![StageSpec::Tone {
                seconds: 3.0,
                frequency: 440.0
            }]
        );
        assert_eq!(description.input, None);
        assert_eq!(
            description.format,
            Some(OutputFormat {
                sample_rate: 44_100,
                bits: 16
            })
        );
    }

    #[test]
    fn test_full_chain_keeps_signal_order() {
        let description = build(&snapshot(220.0, 2.0, 1000.0, 50.0, 30.0));
        assert_eq!(
            description.stages,
            vec![
                StageSpec::Tone {
                    seconds: 3.0,
                    frequency: 220.0
                },
                StageSpec::Speed { factor: 2.0 },
                StageSpec::LowPass { cutoff: 1000.0 },
                StageSpec::Delay { taps: [0.5, 0.25] },
                StageSpec::Reverb { amount: 30.0 },
            ]
        );
    }

    #[test]
    fn test_full_chain_arguments() {
        let description = build(&snapshot(220.0, 2.0, 1000.0, 50.0, 30.0));
        assert_eq!(
            description.command_line("sox"),
            "sox -n -r 44100 -b 16 /tmp/delia_current.wav synth 3 sine 220 speed 2 \
             lowpass 1000 delay 0.5 0.25 reverb 30"
        );
    }

    #[test]
    fn test_stage_boundaries() {
        let names = |description: InvocationDescription| {
            description
                .stages
                .iter()
                .map(StageSpec::name)
                .collect::<Vec<_>>()
        };
        assert_eq!(names(build(&snapshot(440.0, 1.0, 8000.0, 0.0, 0.0))), ["synth"]);
        assert_eq!(
            names(build(&snapshot(440.0, 0.99, 8000.0, 0.0, 0.0))),
            ["synth", "speed"]
        );
        assert_eq!(
            names(build(&snapshot(440.0, 1.0, 7999.0, 0.0, 0.0))),
            ["synth", "lowpass"]
        );
        assert_eq!(
            names(build(&snapshot(440.0, 1.0, 8000.0, 1.0, 0.0))),
            ["synth", "delay"]
        );
        assert_eq!(
            names(build(&snapshot(440.0, 1.0, 8000.0, 0.0, 1.0))),
            ["synth", "reverb"]
        );
    }

    #[test]
    fn test_reverb_passes_through_unscaled() {
        let description = build(&snapshot(440.0, 1.0, 8000.0, 0.0, 100.0));
        assert_eq!(description.stages[1], StageSpec::Reverb { amount: 100.0 });
    }

    #[test]
    fn test_build_is_deterministic() {
        let snap = snapshot(613.0, 0.35, 2400.0, 7.0, 64.0);
        assert_eq!(build(&snap), build(&snap));
        assert_eq!(build(&snap).to_args(), build(&snap.clone()).to_args());
    }

    #[test]
    fn test_missing_labels_fall_back_to_neutral() {
        let description = build(&ParameterSnapshot::default());
        assert_eq!(
            description.stages,
            vec![StageSpec::Tone {
                seconds: 3.0,
                frequency: 440.0
            }]
        );
    }

    #[test]
    fn test_capture_reads_every_control() {
        use crate::knob::ValueKind;

        let controls = [
            RotaryControl::new(FREQUENCY, 20.0, 2000.0, 440.0, ValueKind::Integer),
            RotaryControl::new(SPEED, 0.1, 4.0, 1.0, ValueKind::Fractional),
        ];
        let snap = ParameterSnapshot::capture(&controls);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get(FREQUENCY), Some(440.0));
        assert_eq!(snap.get(SPEED), Some(1.0));
        assert_eq!(snap.get(ECHO), None);
    }

    #[test]
    fn test_speed_knob_turned_back_drops_speed_stage() {
        use crate::knob::ValueKind;

        let mut speed = RotaryControl::new(SPEED, 0.1, 4.0, 1.0, ValueKind::Fractional);
        speed.nudge(4.0);
        let turned = build(&ParameterSnapshot::capture([&speed]));
        assert_eq!(turned.stages.len(), 2);

        speed.nudge(-4.0);
        let restored = build(&ParameterSnapshot::capture([&speed]));
        assert_eq!(restored.stages.len(), 1);
        assert!(!restored.to_args().contains(&"speed".to_string()));
    }

    #[test]
    fn test_low_pass_knob_at_end_stop_bypasses_filter() {
        use crate::knob::{SWEEP_DEGREES, ValueKind};

        let mut cutoff = RotaryControl::new(LOW_PASS, 100.0, LOW_PASS_MAX, 1000.0, ValueKind::Integer);
        let filtered = build(&ParameterSnapshot::capture([&cutoff]));
        assert_eq!(filtered.stages[1], StageSpec::LowPass { cutoff: 1000.0 });

        cutoff.nudge(SWEEP_DEGREES);
        let open = build(&ParameterSnapshot::capture([&cutoff]));
        assert_eq!(open.stages.len(), 1);
    }

    #[test]
    fn test_loop_description() {
        let description = EffectChainBuilder::default().build_loop(
            Path::new("/tmp/delia_current.wav"),
            Path::new("/tmp/delia_loop.wav"),
            5,
        );
        assert_eq!(
            description.to_args(),
            [
                "/tmp/delia_current.wav",
                "/tmp/delia_loop.wav",
                "repeat",
                "5"
            ]
        );
    }

    #[test]
    fn test_with_output_keeps_chain() {
        let description = build(&snapshot(220.0, 2.0, 1000.0, 50.0, 30.0));
        let staged = description.with_output("/tmp/.staging.wav");
        assert_eq!(staged.stages, description.stages);
        assert_eq!(staged.output, PathBuf::from("/tmp/.staging.wav"));
    }
}
