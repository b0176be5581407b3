mod chain;
mod clip;
mod config;
mod engine;
mod knob;
mod output;
mod status;
mod worker;

use std::collections::HashMap;
use std::sync::mpsc;

use chain::{
    ECHO, EffectChainBuilder, FREQUENCY, LOW_PASS, LOW_PASS_MAX, ParameterSnapshot, REVERB, SPEED,
};
use clip::ClipPreview;
use config::ConsoleConfig;
use engine::SoxEngine;
use knob::{RotaryControl, SWEEP_DEGREES, ValueKind, format_readout};
use log::{LevelFilter, debug, error, info, warn};
use macroquad::{prelude::*, text::measure_text};
use output::ClipPlayer;
use status::{ConsoleLogger, SharedStatus, StatusLog};
use tokio::runtime::Runtime;
use worker::{Job, JobOutput, JobReport, SoxWorkbench, WorkerHandle, spawn_worker};

const CONSOLE: &str = "console";
const SCREEN_WIDTH: f32 = 800.0;
const SCREEN_HEIGHT: f32 = 600.0;
const KNOB_SIZE: f32 = 80.0;
const BUTTON_WIDTH: f32 = 80.0;
const BUTTON_HEIGHT: f32 = 30.0;
const STATUS_LINES: usize = 8;
const STATUS_FONT_SIZE: u16 = 14;
const TICK_STEP_DEGREES: usize = 30;
const WHEEL_STEP_DEGREES: f64 = 4.0;
const MAX_SCOPE_FREQ: f32 = 8_000.0;
const MIN_SCOPE_DB: f32 = -80.0;
const MAX_SCOPE_DB: f32 = 0.0;
const FALLBACK_DIR: &str = "light-sculpture";

const PHOSPHOR: Color = Color {
    r: 0.0,
    g: 1.0,
    b: 0.0,
    a: 1.0,
};
const PHOSPHOR_DIM: Color = Color {
    r: 0.0,
    g: 0.6,
    b: 0.0,
    a: 0.5,
};
const BACKGROUND: Color = Color {
    r: 0.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};
const KNOB_BODY: Color = Color {
    r: 0.2,
    g: 0.2,
    b: 0.2,
    a: 1.0,
};
const KNOB_FACE: Color = Color {
    r: 0.13,
    g: 0.13,
    b: 0.13,
    a: 1.0,
};
const KNOB_RIM: Color = Color {
    r: 0.4,
    g: 0.4,
    b: 0.4,
    a: 1.0,
};
const STATUS_BACKGROUND: Color = Color {
    r: 0.0,
    g: 0.07,
    b: 0.0,
    a: 1.0,
};

/// (label, min, max, initial, kind), in panel order.
const CONTROLS: [(&str, f64, f64, f64, ValueKind); 5] = [
    (FREQUENCY, 20.0, 2000.0, 440.0, ValueKind::Integer),
    (LOW_PASS, 100.0, LOW_PASS_MAX, 1000.0, ValueKind::Integer),
    (SPEED, 0.1, 4.0, 1.0, ValueKind::Fractional),
    (ECHO, 0.0, 100.0, 0.0, ValueKind::Integer),
    (REVERB, 0.0, 100.0, 0.0, ValueKind::Integer),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConsoleAction {
    Generate,
    Play,
    Loop,
}

impl ConsoleAction {
    const VALUES: [ConsoleAction; 3] = [
        ConsoleAction::Generate,
        ConsoleAction::Play,
        ConsoleAction::Loop,
    ];

    fn label(&self) -> &'static str {
        match self {
            ConsoleAction::Generate => "GENERATE",
            ConsoleAction::Play => "PLAY",
            ConsoleAction::Loop => "LOOP",
        }
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    let status = StatusLog::shared(STATUS_LINES);
    if let Err(err) = ConsoleLogger::install(status.clone(), LevelFilter::Debug) {
        eprintln!("logger already installed: {err}");
    }
    let runtime = Runtime::new().expect("tokio runtime");

    info!(target: CONSOLE, "BBC RADIOPHONIC WORKSHOP INITIALIZED");
    let config = load_config();
    let engine = SoxEngine::new(config.engine_program.clone());
    match engine.probe() {
        Ok(version) => debug!("using {version}"),
        Err(err) => {
            warn!("{err:#}");
            error!(target: CONSOLE, "ERROR: {} NOT FOUND, INSTALL SOX", engine.program());
        }
    }
    let worker = spawn_worker(&runtime, SoxWorkbench::new(engine.clone(), ClipPlayer::new()));
    let builder = EffectChainBuilder::new(config.chain);
    info!(target: CONSOLE, "DELIA'S CONSOLE READY");

    let layout = compute_panel_layout();
    let (change_tx, change_rx) = mpsc::channel();
    let mut console = ConsoleState::new(&layout, change_tx);
    let mut scope: Option<ClipPreview> = None;

    loop {
        let mouse = mouse_position_vec();
        handle_knob_input(&mut console.knobs, &layout.knobs, mouse);
        for (label, text) in change_rx.try_iter() {
            debug!("{label} -> {text}");
            console.readouts.insert(label, text);
        }

        if let Some(action) = clicked_action(&layout, mouse) {
            if dispatch(action, &console, &builder, &config, &engine, &worker) {
                console.pending += 1;
            }
        }
        while let Some(report) = worker.poll() {
            console.pending = console.pending.saturating_sub(1);
            settle(report, &mut scope);
        }

        draw_scene(&console, &layout, &status, scope.as_ref());
        next_frame().await;
    }
}

fn window_conf() -> Conf {
    Conf {
        window_title: "BBC RADIOPHONIC WORKSHOP - DELIA'S CONSOLE".into(),
        fullscreen: false,
        sample_count: 1,
        window_width: SCREEN_WIDTH as i32,
        window_height: SCREEN_HEIGHT as i32,
        window_resizable: false,
        high_dpi: false,
        ..Default::default()
    }
}

fn load_config() -> ConsoleConfig {
    let config = ConsoleConfig::from_env().unwrap_or_else(|err| {
        warn!("{err:#}");
        ConsoleConfig::with_base_dir(FALLBACK_DIR)
    });
    if let Err(err) = config.ensure_dirs() {
        warn!("{err:#}");
        error!(target: CONSOLE, "ERROR: CANNOT CREATE {}", config.base_dir.display());
    }
    config
}

fn dispatch(
    action: ConsoleAction,
    console: &ConsoleState,
    builder: &EffectChainBuilder,
    config: &ConsoleConfig,
    engine: &SoxEngine,
    worker: &WorkerHandle,
) -> bool {
    let job = match action {
        ConsoleAction::Generate => {
            info!(target: CONSOLE, "GENERATING TONE...");
            let snapshot = ParameterSnapshot::capture(&console.knobs);
            let description = builder.build(&snapshot, config.current_file());
            info!(target: CONSOLE, "EXECUTING: {}", description.command_line(engine.program()));
            Job::Generate(description)
        }
        ConsoleAction::Play => {
            info!(target: CONSOLE, "PLAYING LAST TONE...");
            Job::Play(config.current_file().to_path_buf())
        }
        ConsoleAction::Loop => {
            info!(target: CONSOLE, "CREATING LOOP...");
            Job::Loop(builder.build_loop(
                config.current_file(),
                config.loop_file(),
                config.loop_repeats,
            ))
        }
    };
    match worker.submit(job) {
        Ok(()) => true,
        Err(err) => {
            error!(target: CONSOLE, "ERROR: {err}");
            false
        }
    }
}

fn settle(report: JobReport, scope: &mut Option<ClipPreview>) {
    let line = report.status_line();
    match report.result {
        Ok(JobOutput::Rendered(preview)) => {
            *scope = Some(preview);
            info!(target: CONSOLE, "{line}");
        }
        Ok(JobOutput::Played | JobOutput::Looped) => info!(target: CONSOLE, "{line}"),
        Err(err) => {
            warn!("{:?} failed: {err:#}", report.kind);
            error!(target: CONSOLE, "{line}");
        }
    }
}

struct PanelLayout {
    title_rect: Rect,
    knobs: [Rect; CONTROLS.len()],
    buttons: [Rect; ConsoleAction::VALUES.len()],
    busy_rect: Rect,
    scope_rect: Rect,
    status_rect: Rect,
}

fn compute_panel_layout() -> PanelLayout {
    let knob_origins = [
        vec2(50.0, 130.0),
        vec2(300.0, 130.0),
        vec2(50.0, 310.0),
        vec2(300.0, 310.0),
        vec2(400.0, 310.0),
    ];
    let knobs = knob_origins.map(|origin| Rect::new(origin.x, origin.y, KNOB_SIZE, KNOB_SIZE));
    let mut buttons = [Rect::new(0.0, 0.0, 0.0, 0.0); ConsoleAction::VALUES.len()];
    for (index, rect) in buttons.iter_mut().enumerate() {
        *rect = Rect::new(
            550.0,
            130.0 + index as f32 * 40.0,
            BUTTON_WIDTH,
            BUTTON_HEIGHT,
        );
    }
    let busy_rect = Rect::new(640.0, 130.0 + 6.0, 18.0, 18.0);

    PanelLayout {
        title_rect: Rect::new(0.0, 30.0, SCREEN_WIDTH, 40.0),
        knobs,
        buttons,
        busy_rect,
        scope_rect: Rect::new(30.0, 445.0, 290.0, 130.0),
        status_rect: Rect::new(350.0, 445.0, 420.0, 130.0),
    }
}

struct ConsoleState {
    knobs: Vec<RotaryControl>,
    readouts: HashMap<&'static str, String>,
    pending: usize,
}

impl ConsoleState {
    fn new(layout: &PanelLayout, changes: mpsc::Sender<(&'static str, String)>) -> Self {
        let mut knobs = Vec::with_capacity(CONTROLS.len());
        let mut readouts = HashMap::new();
        for ((label, min, max, initial, kind), rect) in CONTROLS.into_iter().zip(layout.knobs) {
            let center = rect.center();
            let mut knob = RotaryControl::new(label, min, max, initial, kind)
                .with_center(center.x as f64, center.y as f64);
            let tx = changes.clone();
            knob.subscribe(move |change| {
                let _ = tx.send((change.label, format_readout(kind, change.value)));
            });
            readouts.insert(label, knob.readout());
            knobs.push(knob);
        }
        Self {
            knobs,
            readouts,
            pending: 0,
        }
    }

    fn busy(&self) -> bool {
        self.pending > 0
    }
}

fn mouse_position_vec() -> Vec2 {
    let (x, y) = mouse_position();
    vec2(x, y)
}

fn handle_knob_input(knobs: &mut [RotaryControl], rects: &[Rect], mouse: Vec2) {
    let pressed = is_mouse_button_pressed(MouseButton::Left);
    let down = is_mouse_button_down(MouseButton::Left);
    let released = is_mouse_button_released(MouseButton::Left);
    let (_x, wheel) = mouse_wheel();
    for (knob, rect) in knobs.iter_mut().zip(rects) {
        if pressed && rect.contains(mouse) {
            knob.begin_drag();
        }
        if knob.is_dragging() {
            if down {
                knob.update_drag(mouse.x as f64, mouse.y as f64);
            }
            if released || !down {
                knob.end_drag();
            }
        }
        if rect.contains(mouse) && wheel.abs() > f32::EPSILON {
            knob.nudge(wheel.signum() as f64 * WHEEL_STEP_DEGREES);
        }
    }
}

fn clicked_action(layout: &PanelLayout, mouse: Vec2) -> Option<ConsoleAction> {
    if !is_mouse_button_pressed(MouseButton::Left) {
        return None;
    }
    layout
        .buttons
        .iter()
        .position(|rect| rect.contains(mouse))
        .and_then(|index| ConsoleAction::VALUES.get(index).copied())
}

fn draw_scene(
    console: &ConsoleState,
    layout: &PanelLayout,
    status: &SharedStatus,
    scope: Option<&ClipPreview>,
) {
    clear_background(BACKGROUND);
    draw_label("BBC RADIOPHONIC WORKSHOP", layout.title_rect, 28, PHOSPHOR);

    for (knob, rect) in console.knobs.iter().zip(layout.knobs) {
        let readout = console
            .readouts
            .get(knob.label())
            .map(String::as_str)
            .unwrap_or("");
        draw_knob_widget(knob, rect, readout);
    }

    let mouse = mouse_position_vec();
    let held = is_mouse_button_down(MouseButton::Left);
    for (action, rect) in ConsoleAction::VALUES.iter().zip(layout.buttons) {
        draw_button(rect, action.label(), held && rect.contains(mouse));
    }
    draw_busy_lamp(layout.busy_rect, console.busy());

    draw_scope(layout.scope_rect, scope);
    draw_status(layout.status_rect, status);
}

fn draw_knob_widget(knob: &RotaryControl, rect: Rect, readout: &str) {
    let (cx, cy) = knob.center();
    let center = vec2(cx as f32, cy as f32);
    let radius = rect.w.min(rect.h) * 0.5;
    draw_circle(center.x, center.y, radius - 5.0, KNOB_BODY);
    draw_circle_lines(center.x, center.y, radius - 5.0, 2.0, KNOB_RIM);
    draw_circle(center.x, center.y, radius - 15.0, KNOB_FACE);
    draw_circle_lines(center.x, center.y, radius - 15.0, 1.0, KNOB_RIM);
    draw_circle(center.x, center.y, 3.0, Color::new(0.27, 0.27, 0.27, 1.0));

    for tick in (0..=SWEEP_DEGREES as usize).step_by(TICK_STEP_DEGREES) {
        let direction = dial_direction(tick as f32);
        let start = center + direction * (radius - 15.0);
        let end = center + direction * (radius - 10.0);
        draw_line(start.x, start.y, end.x, end.y, 1.0, KNOB_RIM);
    }

    let pointer = center + dial_direction(knob.angle() as f32) * (radius - 20.0);
    let pointer_color = if knob.is_dragging() {
        WHITE
    } else {
        PHOSPHOR
    };
    draw_line(center.x, center.y, pointer.x, pointer.y, 3.0, pointer_color);

    draw_text_ex(
        knob.label(),
        rect.x,
        rect.y + rect.h + 14.0,
        TextParams {
            font_size: 14,
            color: PHOSPHOR,
            ..Default::default()
        },
    );
    draw_label(
        readout,
        Rect::new(rect.x, rect.y + rect.h + 18.0, rect.w, 18.0),
        18,
        PHOSPHOR,
    );
}

/// Screen direction of a dial angle; 0 points straight up.
fn dial_direction(degrees: f32) -> Vec2 {
    let radians = (degrees - 90.0).to_radians();
    vec2(radians.cos(), radians.sin())
}

fn draw_button(rect: Rect, label: &str, active: bool) {
    let (fill, text) = if active {
        (PHOSPHOR, BACKGROUND)
    } else {
        (KNOB_BODY, PHOSPHOR)
    };
    draw_rectangle(rect.x, rect.y, rect.w, rect.h, fill);
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 3.0, KNOB_RIM);
    let measure = measure_text(label, None, 16, 1.0);
    draw_text_ex(
        label,
        rect.x + rect.w * 0.5 - measure.width * 0.5,
        rect.y + rect.h * 0.5 + measure.height * 0.5,
        TextParams {
            font_size: 16,
            color: text,
            ..Default::default()
        },
    );
}

fn draw_busy_lamp(rect: Rect, active: bool) {
    let center = rect.center();
    let color = if active {
        PHOSPHOR
    } else {
        Color::new(0.0, 0.15, 0.0, 1.0)
    };
    draw_circle(center.x, center.y, rect.w * 0.5, color);
    draw_circle_lines(center.x, center.y, rect.w * 0.5, 1.0, KNOB_RIM);
}

fn draw_status(rect: Rect, status: &SharedStatus) {
    draw_rectangle(rect.x, rect.y, rect.w, rect.h, STATUS_BACKGROUND);
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 1.0, PHOSPHOR_DIM);
    let Ok(status) = status.lock() else {
        return;
    };
    let line_height = rect.h / STATUS_LINES as f32;
    for (index, line) in status.lines().enumerate() {
        draw_text_ex(
            line,
            rect.x + 6.0,
            rect.y + line_height * (index as f32 + 1.0) - 4.0,
            TextParams {
                font_size: STATUS_FONT_SIZE,
                color: PHOSPHOR,
                ..Default::default()
            },
        );
    }
}

fn draw_scope(rect: Rect, scope: Option<&ClipPreview>) {
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 1.0, PHOSPHOR_DIM);
    let Some(preview) = scope else {
        draw_label("NO CLIP", rect, 16, PHOSPHOR_DIM);
        return;
    };
    let wave_rect = Rect::new(rect.x, rect.y, rect.w, rect.h * 0.5);
    let freq_rect = Rect::new(rect.x, rect.y + rect.h * 0.5, rect.w, rect.h * 0.5);
    draw_line(
        rect.x,
        freq_rect.y,
        rect.x + rect.w,
        freq_rect.y,
        1.0,
        PHOSPHOR_DIM,
    );
    draw_envelope(wave_rect, &preview.waveform);
    draw_frequency(freq_rect, &preview.spectrum, preview.sample_rate);
    draw_text_ex(
        &format!("{:.2}s", preview.seconds),
        rect.x + 4.0,
        rect.y + 12.0,
        TextParams {
            font_size: 12,
            color: PHOSPHOR_DIM,
            ..Default::default()
        },
    );
}

/// Peak envelope as mirrored columns around the zero line.
fn draw_envelope(rect: Rect, envelope: &[f32]) {
    if envelope.is_empty() {
        return;
    }
    let zero = rect.y + rect.h * 0.5;
    let column = rect.w / envelope.len() as f32;
    for (i, peak) in envelope.iter().enumerate() {
        let x = rect.x + (i as f32 + 0.5) * column;
        let reach = peak.abs().min(1.0) * rect.h * 0.45;
        draw_line(x, zero - reach, x, zero + reach, column.max(1.0), PHOSPHOR);
    }
}

fn draw_frequency(rect: Rect, spectrum: &[f32], sample_rate: f32) {
    if spectrum.is_empty() || sample_rate <= 0.0 {
        return;
    }
    let nyquist = sample_rate * 0.5;
    let max_freq = MAX_SCOPE_FREQ.min(nyquist);
    let mut prev = None;
    for (i, magnitude) in spectrum.iter().enumerate() {
        let freq = nyquist * (i as f32 / spectrum.len() as f32);
        if freq > max_freq {
            break;
        }
        let x = rect.x + (freq / max_freq) * rect.w;
        let db = 20.0 * magnitude.max(1e-6).log10();
        let normalized = ((db - MIN_SCOPE_DB) / (MAX_SCOPE_DB - MIN_SCOPE_DB)).clamp(0.0, 1.0);
        let y = rect.y + rect.h - normalized * rect.h;
        if let Some((px, py)) = prev {
            draw_line(px, py, x, y, 1.0, PHOSPHOR);
        }
        prev = Some((x, y));
    }
    draw_text_ex(
        &format!("{:.0}k", max_freq / 1000.0),
        rect.x + rect.w - 24.0,
        rect.y + rect.h - 4.0,
        TextParams {
            font_size: 12,
            color: PHOSPHOR_DIM,
            ..Default::default()
        },
    );
}

fn draw_label(text: &str, rect: Rect, size: u16, color: Color) {
    let dims = measure_text(text, None, size, 1.0);
    let origin = rect.center() + vec2(-dims.width, dims.offset_y) * 0.5;
    draw_text(text, origin.x, origin.y, size as f32, color);
}
