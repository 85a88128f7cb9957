//! Flow, volume and tidal-volume computation
//!
//! Four compensated pressures come in; clinical quantities go out. Which
//! formula applies depends on the body geometry of the attached sensor
//! head: a pitot tube pair or a venturi restriction.
//!
//! Slot mapping (fixed by the head's PCB layout):
//!
//! - slot 0: venturi throat / patient-side pressure
//! - slot 1: ambient reference
//! - slot 2: venturi inlet / first pitot port
//! - slot 3: venturi outlet / second pitot port

use libm::sqrtf;
use respira_protocol::BodyType;

/// Venturi throat / patient-side pressure sensor
pub const SLOT_THROAT: usize = 0;
/// Ambient reference sensor
pub const SLOT_AMBIENT: usize = 1;
/// Venturi inlet / first pitot port
pub const SLOT_INLET: usize = 2;
/// Venturi outlet / second pitot port
pub const SLOT_OUTLET: usize = 3;

/// Pascals to centimeters of water
pub const PA_TO_CMH2O: f32 = 0.010_197_2;

/// Smoothing factor for the venturi exponential filter
pub const VENTURI_ALPHA: f32 = 0.15;

/// Venturi pipe cross-section (mm^2)
const PIPE_AREA: f32 = 232.352_19;
/// Venturi restriction cross-section (mm^2)
const RESTRICTION_AREA: f32 = 56.745_017;
/// Density term in the venturi flow equation (449 * 1.2)
const VENTURI_DENSITY_TERM: f32 = 449.0 * 1.2;

/// Pitot orifice/time scaling: 18 mm orifice, per-minute conversion
const PITOT_VOLUME_SCALE: f32 = 0.25 * 60.0;

/// Tidal integration leak rate, subtracted every update
const TIDAL_DECAY: f32 = 0.05;

/// Derived flow state for the attached body
#[derive(Debug, Clone)]
pub struct FlowEngine {
    body: BodyType,
    /// Ambient reference pressure (Pa)
    ambient_pressure: f32,
    /// Throat/patient-side pressure (Pa)
    throat_pressure: f32,
    /// Differential pressure seen by the patient (cmH2O)
    pressure: f32,
    /// Instantaneous volumetric flow (l/min)
    volume: f32,
    /// Cumulative delivered volume with decay (ml-equivalent)
    tidal_volume: f32,
    last_sample_ms: Option<u32>,
}

impl FlowEngine {
    pub fn new(body: BodyType) -> Self {
        Self {
            body,
            ambient_pressure: 0.0,
            throat_pressure: 0.0,
            pressure: 0.0,
            volume: 0.0,
            tidal_volume: 0.0,
            last_sample_ms: None,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body
    }

    /// Change the body geometry; derived state restarts from zero
    pub fn set_body_type(&mut self, body: BodyType) {
        if self.body != body {
            self.body = body;
            self.reset();
        }
    }

    /// Drop all derived state (sensor redetection, failure recovery)
    pub fn reset(&mut self) {
        self.ambient_pressure = 0.0;
        self.throat_pressure = 0.0;
        self.pressure = 0.0;
        self.volume = 0.0;
        self.tidal_volume = 0.0;
        self.last_sample_ms = None;
    }

    /// Differential pressure in cmH2O
    pub fn pressure(&self) -> f32 {
        self.pressure
    }

    /// Instantaneous flow in l/min
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Cumulative tidal volume
    pub fn tidal_volume(&self) -> f32 {
        self.tidal_volume
    }

    pub fn ambient_pressure(&self) -> f32 {
        self.ambient_pressure
    }

    pub fn throat_pressure(&self) -> f32 {
        self.throat_pressure
    }

    /// Fold one calibrated sample set into the derived quantities
    pub fn update(&mut self, readings: &[f32; 4], now_ms: u32) {
        match self.body {
            BodyType::Pitot => self.compute_pitot(readings),
            // Unknown bodies still get the venturi math; it degrades to
            // zero flow when the pressures do not behave like a venturi
            _ => self.compute_venturi(readings),
        }
        self.update_tidal(now_ms);
    }

    fn compute_pitot(&mut self, p: &[f32; 4]) {
        let pitot1 = p[SLOT_INLET];
        let pitot2 = p[SLOT_OUTLET];
        self.ambient_pressure = p[SLOT_AMBIENT];
        self.throat_pressure = p[SLOT_THROAT];
        self.pressure = (self.throat_pressure - self.ambient_pressure) * PA_TO_CMH2O;

        // Quadratic fit of airspeed against the pitot differential in hPa
        let pitot_diff = (pitot1 - pitot2) / 100.0;
        let mut airflow = (0.05 * pitot_diff * pitot_diff) - (0.0008 * pitot_diff);
        if pitot_diff < 0.0 {
            airflow = -airflow;
        }

        self.volume = airflow * PITOT_VOLUME_SCALE;
    }

    fn compute_venturi(&mut self, p: &[f32; 4]) {
        let area_diff = (PIPE_AREA * RESTRICTION_AREA)
            / sqrtf((PIPE_AREA * PIPE_AREA) - (RESTRICTION_AREA * RESTRICTION_AREA));

        self.ambient_pressure = p[SLOT_AMBIENT];
        let inlet = p[SLOT_INLET];
        let outlet = p[SLOT_OUTLET];
        self.throat_pressure = p[SLOT_THROAT];
        self.pressure = ((inlet + outlet) / 2.0 - self.ambient_pressure) * PA_TO_CMH2O;

        // Flow direction follows whichever port is pressurized above the
        // throat. When neither dominates (outlet == inlet == throat) the
        // flow reads zero; the head is symmetric at rest.
        let rough = if inlet > outlet && inlet > self.throat_pressure {
            area_diff * sqrtf((inlet - self.throat_pressure) / VENTURI_DENSITY_TERM) * 0.6
        } else if outlet > inlet && outlet > self.throat_pressure {
            -area_diff * sqrtf((outlet - self.throat_pressure) / VENTURI_DENSITY_TERM) * 0.6
        } else {
            0.0
        };

        // Sub-unity magnitudes are below the head's resolution
        let rough = if rough.is_nan() || (rough < 1.0 && rough > -1.0) {
            0.0
        } else {
            rough
        };

        self.volume = rough * VENTURI_ALPHA + self.volume * (1.0 - VENTURI_ALPHA);
    }

    fn update_tidal(&mut self, now_ms: u32) {
        if let Some(last) = self.last_sample_ms {
            let elapsed = now_ms.wrapping_sub(last) as f32;
            self.tidal_volume += self.volume * elapsed / 60.0 - TIDAL_DECAY;
        }
        if self.tidal_volume < 0.0 {
            self.tidal_volume = 0.0;
        }
        self.last_sample_ms = Some(now_ms);
    }
}
