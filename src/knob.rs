/// Mechanical sweep of every knob on the console, in degrees.
pub const SWEEP_DEGREES: f64 = 270.0;

const FRACTIONAL_STEPS: f64 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// Whole numbers, truncated toward zero (Hz, percent).
    Integer,
    /// Hundredths, the same precision the readout shows.
    Fractional,
}

impl ValueKind {
    fn apply(self, raw: f64) -> f64 {
        match self {
            ValueKind::Integer => raw.trunc(),
            ValueKind::Fractional => (raw * FRACTIONAL_STEPS).round() / FRACTIONAL_STEPS,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ControlChange {
    pub label: &'static str,
    pub value: f64,
}

pub type Listener = Box<dyn FnMut(&ControlChange)>;

/// One rotary control: a 270 degree potentiometer driven by pointer drags.
///
/// The angle is the only input-facing state. The value is always derived from
/// it, so it can never leave `[min, max]`.
pub struct RotaryControl {
    label: &'static str,
    min: f64,
    max: f64,
    kind: ValueKind,
    center: (f64, f64),
    angle: f64,
    value: f64,
    dragging: bool,
    listeners: Vec<Listener>,
}

impl RotaryControl {
    pub fn new(label: &'static str, min: f64, max: f64, initial: f64, kind: ValueKind) -> Self {
        debug_assert!(min < max, "{label}: min must be below max");
        let initial = initial.clamp(min, max);
        Self {
            label,
            min,
            max,
            kind,
            center: (0.0, 0.0),
            angle: (initial - min) / (max - min) * SWEEP_DEGREES,
            value: initial,
            dragging: false,
            listeners: Vec::new(),
        }
    }

    pub fn with_center(mut self, x: f64, y: f64) -> Self {
        self.center = (x, y);
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&ControlChange) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn begin_drag(&mut self) {
        self.dragging = true;
    }

    pub fn end_drag(&mut self) {
        self.dragging = false;
    }

    pub fn update_drag(&mut self, x: f64, y: f64) {
        if !self.dragging {
            return;
        }
        let dx = x - self.center.0;
        let dy = y - self.center.1;
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        self.set_angle(pointer_angle(dx, dy));
    }

    /// Turns the knob by a relative amount, e.g. from the mouse wheel.
    pub fn nudge(&mut self, delta_degrees: f64) {
        if delta_degrees == 0.0 || !delta_degrees.is_finite() {
            return;
        }
        self.set_angle(self.angle + delta_degrees);
    }

    /// Formats the value the way the front panel shows it.
    pub fn readout(&self) -> String {
        format_readout(self.kind, self.value)
    }

    fn set_angle(&mut self, degrees: f64) {
        self.angle = degrees.clamp(0.0, SWEEP_DEGREES);
        self.value = self.angle_to_value(self.angle);
        let change = ControlChange {
            label: self.label,
            value: self.value,
        };
        for listener in self.listeners.iter_mut() {
            listener(&change);
        }
    }

    fn angle_to_value(&self, degrees: f64) -> f64 {
        let raw = self.min + (degrees / SWEEP_DEGREES) * (self.max - self.min);
        self.kind.apply(raw).clamp(self.min, self.max)
    }
}

pub fn format_readout(kind: ValueKind, value: f64) -> String {
    match kind {
        ValueKind::Integer => format!("{value:.0}"),
        ValueKind::Fractional => format!("{value:.2}"),
    }
}

/// Screen-space angle of a pointer offset, with "up" at 0 degrees growing
/// clockwise. Anything past the end stop collapses onto it.
pub fn pointer_angle(dx: f64, dy: f64) -> f64 {
    let degrees = (dy.atan2(dx).to_degrees() + 90.0).rem_euclid(360.0);
    if degrees > SWEEP_DEGREES {
        SWEEP_DEGREES
    } else {
        degrees
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn frequency() -> RotaryControl {
        RotaryControl::new("FREQUENCY", 20.0, 2000.0, 440.0, ValueKind::Integer).with_center(40.0, 40.0)
    }

    fn drag_by(knob: &mut RotaryControl, dx: f64, dy: f64) {
        let (cx, cy) = knob.center();
        knob.begin_drag();
        knob.update_drag(cx + dx, cy + dy);
    }

    #[test]
    fn test_pointer_angle_quadrants() {
        assert!((pointer_angle(0.0, -1.0) - 0.0).abs() < 1e-9);
        assert!((pointer_angle(1.0, 0.0) - 90.0).abs() < 1e-9);
        assert!((pointer_angle(0.0, 1.0) - 180.0).abs() < 1e-9);
        assert!((pointer_angle(-1.0, 0.0) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_dead_zone_collapses_to_end_stop() {
        for raw in [271.0_f64, 300.0, 315.0, 359.0] {
            let radians = (raw - 90.0).to_radians();
            assert_eq!(pointer_angle(radians.cos(), radians.sin()), 270.0);
        }
    }

    #[test]
    fn test_angle_always_within_sweep() {
        let mut knob = frequency();
        knob.begin_drag();
        for step in 0..720 {
            let radians = (step as f64 * 0.5).to_radians();
            knob.update_drag(40.0 + 25.0 * radians.cos(), 40.0 + 25.0 * radians.sin());
            assert!((0.0..=SWEEP_DEGREES).contains(&knob.angle()));
            assert!((20.0..=2000.0).contains(&knob.value()));
        }
    }

    #[test]
    fn test_linear_mapping_endpoints_and_midpoint() {
        let mut knob = frequency();
        drag_by(&mut knob, 0.0, -30.0);
        assert_eq!(knob.angle(), 0.0);
        assert_eq!(knob.value(), 20.0);
        drag_by(&mut knob, -30.0, 0.0);
        assert_eq!(knob.angle(), 270.0);
        assert_eq!(knob.value(), 2000.0);
        drag_by(&mut knob, 30.0, 30.0);
        assert_eq!(knob.angle(), 135.0);
        assert_eq!(knob.value(), 1010.0);
    }

    #[test]
    fn test_upper_left_drag_sticks_at_end_stop() {
        let mut knob = frequency();
        drag_by(&mut knob, -30.0, -30.0);
        assert_eq!(knob.angle(), 270.0);
        assert_eq!(knob.value(), 2000.0);
    }

    #[test]
    fn test_mapping_is_monotonic() {
        let mut knob = RotaryControl::new("LOW-PASS", 100.0, 8000.0, 100.0, ValueKind::Integer);
        let mut previous = knob.value();
        for _ in 0..270 {
            knob.nudge(1.0);
            assert!(knob.value() >= previous);
            previous = knob.value();
        }
        assert_eq!(knob.value(), 8000.0);
    }

    #[test]
    fn test_fractional_control_keeps_precision() {
        let mut speed =
            RotaryControl::new("SPEED", 0.1, 4.0, 1.0, ValueKind::Fractional).with_center(0.0, 0.0);
        drag_by(&mut speed, 30.0, 30.0);
        assert!((speed.value() - 2.05).abs() < 1e-9);
        assert_eq!(speed.readout(), "2.05");
    }

    #[test]
    fn test_fractional_control_returns_to_exact_value() {
        let mut speed = RotaryControl::new("SPEED", 0.1, 4.0, 1.0, ValueKind::Fractional);
        speed.nudge(4.0);
        assert_ne!(speed.value(), 1.0);
        speed.nudge(-4.0);
        assert_eq!(speed.value(), 1.0);
        assert_eq!(speed.readout(), "1.00");

        speed.nudge(0.3);
        assert_eq!(speed.value(), 1.0);
    }

    #[test]
    fn test_integer_control_truncates() {
        let mut echo = RotaryControl::new("ECHO", 0.0, 100.0, 0.0, ValueKind::Integer);
        echo.nudge(100.0);
        assert_eq!(echo.value(), 37.0);
        assert_eq!(echo.readout(), "37");
    }

    #[test]
    fn test_update_ignored_unless_dragging() {
        let mut knob = frequency();
        knob.update_drag(80.0, 40.0);
        assert_eq!(knob.value(), 440.0);
        knob.begin_drag();
        knob.begin_drag();
        knob.update_drag(80.0, 40.0);
        assert_eq!(knob.angle(), 90.0);
        knob.end_drag();
        knob.update_drag(40.0, 80.0);
        assert_eq!(knob.angle(), 90.0);
    }

    #[test]
    fn test_pointer_on_center_is_ignored() {
        let mut knob = frequency();
        let before = (knob.angle(), knob.value());
        knob.begin_drag();
        knob.update_drag(40.0, 40.0);
        assert_eq!((knob.angle(), knob.value()), before);
    }

    #[test]
    fn test_listeners_see_every_update() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut knob = frequency();
        knob.subscribe(move |change| sink.borrow_mut().push(change.clone()));

        knob.update_drag(80.0, 40.0);
        knob.begin_drag();
        knob.update_drag(40.0, 40.0);
        knob.update_drag(40.0, 0.0);
        knob.update_drag(0.0, 40.0);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].value, 20.0);
        assert_eq!(seen[1].value, 2000.0);
        assert!(seen.iter().all(|change| change.label == "FREQUENCY"));
    }

    #[test]
    fn test_nudge_clamps_to_sweep() {
        let mut knob = frequency();
        knob.nudge(1000.0);
        assert_eq!(knob.angle(), 270.0);
        assert_eq!(knob.value(), 2000.0);
        knob.nudge(-1000.0);
        assert_eq!(knob.angle(), 0.0);
        assert_eq!(knob.value(), 20.0);
    }

    #[test]
    fn test_initial_value_sets_pointer_angle() {
        let reverb = RotaryControl::new("REVERB", 0.0, 100.0, 50.0, ValueKind::Integer);
        assert_eq!(reverb.value(), 50.0);
        assert_eq!(reverb.angle(), 135.0);
    }
}
