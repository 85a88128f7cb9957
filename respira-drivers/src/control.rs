//! The control core: one owned context for the whole sensing/actuation
//! machine
//!
//! Owns the bus registry, the four-slot sensor array, the flow engine,
//! the calibration session and the motor controller, and advances all of
//! them from a single non-blocking tick. The serial command layer talks
//! to this struct and nothing below it.
//!
//! Single-threaded by contract: everything here runs on the one control
//! loop; interrupt handlers only touch the [`FeedbackCounters`] passed
//! into each tick.

use crate::actuator::MotorController;
use crate::array::{ArrayError, SensorArray};
use crate::bus::{BusError, BusRegistry, DeviceHandle};
use embedded_hal::delay::DelayNs;
use heapless::Vec;
use respira_core::calibration::{CalibrationSession, CalibrationStep};
use respira_core::config::BreathSettings;
use respira_core::feedback::FeedbackCounters;
use respira_core::flow::FlowEngine;
use respira_core::traits::{MotorError, MotorOutputs};
use respira_hal::{EnableLines, I2cBus, InputPin};
use respira_protocol::{
    BodyType, CoreEvent, MotorKind, RunState, SystemHealth, UnitRecord, RECORD_LEN,
};

/// Diagnostic events buffered per tick before the command layer drains
/// them
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// The fully-owned control context
pub struct ControlCore<I2C, EN, D> {
    registry: BusRegistry<I2C, EN, D>,
    array: SensorArray,
    flow: FlowEngine,
    calibration: CalibrationSession,
    settings: BreathSettings,
    motor: MotorController,
    record: UnitRecord,
    enable_a: Option<u8>,
    enable_b: Option<u8>,
    events: Vec<CoreEvent, EVENT_QUEUE_DEPTH>,
    last_health: SystemHealth,
}

impl<I2C, EN, D> ControlCore<I2C, EN, D>
where
    I2C: I2cBus,
    EN: EnableLines,
    D: DelayNs,
{
    /// Build the context; nothing touches the bus until
    /// [`ControlCore::detect_sensors`]
    pub fn new(
        registry: BusRegistry<I2C, EN, D>,
        body: BodyType,
        motor: MotorKind,
        enable_a: Option<u8>,
        enable_b: Option<u8>,
    ) -> Self {
        Self {
            registry,
            array: SensorArray::new(),
            flow: FlowEngine::new(body),
            calibration: CalibrationSession::new(),
            settings: BreathSettings::default(),
            motor: MotorController::new(motor),
            record: UnitRecord::format(respira_protocol::BusTopology::None, body),
            enable_a,
            enable_b,
            events: Vec::new(),
            last_health: SystemHealth::default(),
        }
    }

    /// Discover the sensor head and load (or format) its identity record
    pub fn detect_sensors(&mut self) -> bool {
        self.flow.reset();
        match self.array.detect(&mut self.registry, self.enable_a, self.enable_b) {
            Ok(topology) => {
                self.push(CoreEvent::SensorsDetected(topology));
                self.load_identity();
                true
            }
            Err(ArrayError::NoTopology) => {
                self.push(CoreEvent::SensorsMissing(0b1111));
                false
            }
            Err(ArrayError::Missing(mask)) => {
                self.push(CoreEvent::SensorsMissing(mask));
                false
            }
        }
    }

    /// Read the EEPROM record; format a blank or foreign one in place
    fn load_identity(&mut self) {
        let Some(rom) = self.array.eeprom() else {
            // No EEPROM on this head; keep running on defaults
            return;
        };
        let mut raw = [0u8; RECORD_LEN];
        if self.registry.read_record(rom, 0, &mut raw).is_err() {
            return;
        }
        match UnitRecord::from_bytes(&raw) {
            Ok(record) => {
                if record.body_type != BodyType::Unknown {
                    self.flow.set_body_type(record.body_type);
                }
                self.settings = BreathSettings::from_record(&record);
                self.record = record;
            }
            Err(_) => {
                // Blank or corrupt: format with what we know now
                self.record = UnitRecord::format(self.array.topology(), self.flow.body_type());
                self.record.mappings = self.array.mappings(&self.registry);
                self.settings.store(&mut self.record);
                let bytes = self.record.to_bytes();
                let _ = self.registry.write_record(rom, 0, &bytes);
            }
        }
    }

    /// Persist the current identity and settings to the head's EEPROM
    pub fn save_identity(&mut self) -> Result<(), BusError> {
        let rom = self.array.eeprom().ok_or(BusError::InvalidHandle)?;
        self.record.bus_type = self.array.topology();
        self.record.body_type = self.flow.body_type();
        self.record.mappings = self.array.mappings(&self.registry);
        self.settings.store(&mut self.record);
        let bytes = self.record.to_bytes();
        self.registry.write_record(rom, 0, &bytes)
    }

    /// One control-loop tick: motor first, then sensors, then health
    ///
    /// `home` is the home/park switch pin: pulled up, shorted to ground
    /// when the arm is at rest.
    pub fn tick(
        &mut self,
        now_ms: u32,
        now_us: u32,
        counters: &FeedbackCounters,
        home: &impl InputPin,
        outputs: &mut impl MotorOutputs,
    ) {
        let home_level = home.is_low();
        // Calibration only blocks detection while it can actually sample
        let calibration_active = self.calibration.in_progress() && self.array.found();
        let motor_event = self.motor.poll(
            now_ms,
            now_us,
            counters,
            home_level,
            calibration_active,
            outputs,
            self.registry.delay_mut(),
        );
        if let Some(event) = motor_event {
            self.push(event);
        }

        if self.array.found() {
            match self.array.sample(&mut self.registry) {
                Ok(mut readings) => {
                    if self.calibration.in_progress() {
                        match self
                            .calibration
                            .accumulate(&readings, self.motor.detection_energizing())
                        {
                            CalibrationStep::Started => self.push(CoreEvent::CalibrationStarted),
                            CalibrationStep::Finished => {
                                self.push(CoreEvent::CalibrationFinished)
                            }
                            _ => {}
                        }
                    }
                    self.calibration.apply(&mut readings);
                    self.flow.update(&readings, now_ms);
                }
                Err(_) => {
                    // Global fail-safe already tripped inside the array
                    self.flow.reset();
                    self.push(CoreEvent::SensorFailure);
                }
            }
        }

        let health = self.health();
        if health != self.last_health {
            self.last_health = health;
            self.push(CoreEvent::Health(health));
        }
    }

    /// Restart offset calibration (operator request)
    pub fn start_calibration(&mut self) {
        self.calibration.clear();
    }

    pub fn calibration_in_progress(&self) -> bool {
        self.calibration.in_progress()
    }

    pub fn calibration_offsets(&self) -> &[f32; 4] {
        self.calibration.offsets()
    }

    /// Operator request to re-type the actuator
    pub fn set_motor_kind(&mut self, kind: MotorKind, outputs: &mut impl MotorOutputs) {
        self.motor.set_kind(kind, outputs);
    }

    pub fn set_body_type(&mut self, body: BodyType) {
        self.flow.set_body_type(body);
        self.record.body_type = body;
    }

    pub fn body_type(&self) -> BodyType {
        self.flow.body_type()
    }

    pub fn settings(&self) -> &BreathSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, mut settings: BreathSettings) {
        settings.sanitize();
        self.settings = settings;
    }

    pub fn sensors_found(&self) -> bool {
        self.array.found()
    }

    /// The unit's identity record as last loaded or formatted
    pub fn record(&self) -> &UnitRecord {
        &self.record
    }

    pub fn eeprom(&self) -> Option<DeviceHandle> {
        self.array.eeprom()
    }

    /// Differential pressure in cmH2O
    pub fn pressure(&self) -> f32 {
        self.flow.pressure()
    }

    /// Instantaneous flow in l/min
    pub fn volume(&self) -> f32 {
        self.flow.volume()
    }

    /// Cumulative tidal volume
    pub fn tidal_volume(&self) -> f32 {
        self.flow.tidal_volume()
    }

    pub fn motor_kind(&self) -> MotorKind {
        self.motor.kind()
    }

    pub fn motor_run_state(&self) -> RunState {
        self.motor.run_state()
    }

    pub fn motor_speed_up(&mut self, outputs: &mut impl MotorOutputs) -> Result<(), MotorError> {
        self.motor.speed_up(outputs)
    }

    pub fn motor_slow_down(
        &mut self,
        outputs: &mut impl MotorOutputs,
    ) -> Result<(), MotorError> {
        self.motor.slow_down(outputs)
    }

    pub fn motor_reverse(&mut self, outputs: &mut impl MotorOutputs) -> Result<(), MotorError> {
        // Reversal borrows the registry's delay for the settle window
        let Self {
            motor, registry, ..
        } = self;
        motor.reverse(outputs, registry.delay_mut())
    }

    pub fn motor_stop(&mut self, outputs: &mut impl MotorOutputs) -> Result<(), MotorError> {
        self.motor.stop(outputs)
    }

    /// Current health snapshot
    pub fn health(&self) -> SystemHealth {
        SystemHealth {
            sensors_found: self.array.found(),
            motor_kind: self.motor.kind(),
            motor_state: self.motor.run_state(),
            calibration_in_progress: self.calibration.in_progress(),
        }
    }

    /// Drain the diagnostic events queued since the last call
    pub fn take_events(&mut self) -> Vec<CoreEvent, EVENT_QUEUE_DEPTH> {
        core::mem::take(&mut self.events)
    }

    fn push(&mut self, event: CoreEvent) {
        // A full queue drops the oldest diagnostics, not the newest
        if self.events.is_full() {
            self.events.remove(0);
        }
        let _ = self.events.push(event);
    }
}
