//! Per-connection state that turns Heart Rate Measurement notifications into
//! rMSSD updates.
//!
//! A session is owned by whoever receives notifications from the BLE stack. It
//! is not internally synchronized: callers that receive notifications on more
//! than one thread must serialize access themselves.

use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::io::hrm::{decode_heart_rate_measurement, DecodeError, HeartRateFrame};
use crate::metrics::hrv::{rmssd_with_ratio, Rmssd};
use crate::signal::RrWindow;

/// GATT Heart Rate service (`180D`).
pub const HEART_RATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);

/// GATT Heart Rate Measurement characteristic (`2A37`).
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

/// Result of a notification that fired the rMSSD trigger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrvUpdate {
    pub rmssd: Rmssd,
    /// Window duration (seconds) the value was computed over.
    pub window_s: f64,
    /// Samples in the window.
    pub samples: usize,
}

/// Events exchanged with the application layer.
///
/// Only `RmssdTick` originates here; the lifecycle variants are produced by
/// the BLE layer and share this type so both can travel on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    PeripheralDiscovered { name: String, id: String },
    Connected { name: String },
    ConnectionLost { name: String },
    FailedToConnect { name: String },
    RmssdTick { value_ms: f64 },
}

/// Receiver of computed rMSSD values (milliseconds).
pub trait HrvSink {
    fn publish(&mut self, value_ms: f64);
}

impl<F: FnMut(f64)> HrvSink for F {
    fn publish(&mut self, value_ms: f64) {
        self(value_ms)
    }
}

impl HrvSink for mpsc::Sender<f64> {
    fn publish(&mut self, value_ms: f64) {
        if let Err(e) = self.send(value_ms) {
            log::warn!("Failed to forward rMSSD {:.2} ms: {}", value_ms, e);
        }
    }
}

impl HrvSink for mpsc::Sender<SessionEvent> {
    fn publish(&mut self, value_ms: f64) {
        if let Err(e) = self.send(SessionEvent::RmssdTick { value_ms }) {
            log::warn!("Failed to forward rMSSD tick: {}", e);
        }
    }
}

#[derive(Debug, Clone)]
pub struct HrmSession {
    config: SessionConfig,
    window: RrWindow,
    heart_rate: Option<u16>,
    sensor_contact_detected: bool,
    energy_expended: Option<u16>,
    last_rmssd: Option<Rmssd>,
}

impl HrmSession {
    pub fn new() -> Self {
        Self::from_parts(SessionConfig::default(), RrWindow::new())
    }

    /// Session with custom tunables. Rejects configs that fail
    /// [`SessionConfig::validate`].
    pub fn with_config(config: SessionConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let window = RrWindow::with_duration(config.measure_time_s)?;
        Ok(Self::from_parts(config, window))
    }

    fn from_parts(config: SessionConfig, window: RrWindow) -> Self {
        Self {
            config,
            window,
            heart_rate: None,
            sensor_contact_detected: false,
            energy_expended: None,
            last_rmssd: None,
        }
    }

    /// Decode one `2A37` payload and fold it into the session.
    ///
    /// Returns `Ok(Some(_))` when the frame carried RR intervals and the window
    /// has reached the trigger duration. A decode failure leaves the session
    /// untouched.
    pub fn on_notification(&mut self, payload: &[u8]) -> Result<Option<HrvUpdate>, DecodeError> {
        let frame = decode_heart_rate_measurement(payload).map_err(|e| {
            log::warn!("Dropping heart rate notification: {}", e);
            e
        })?;
        Ok(self.apply(&frame))
    }

    /// Like [`on_notification`](Self::on_notification), ignoring other characteristics.
    pub fn on_characteristic(
        &mut self,
        uuid: Uuid,
        payload: &[u8],
    ) -> Result<Option<HrvUpdate>, DecodeError> {
        if uuid != HEART_RATE_MEASUREMENT_UUID {
            log::trace!("Ignoring notification from characteristic {}", uuid);
            return Ok(None);
        }
        self.on_notification(payload)
    }

    /// Process a payload and publish an available rMSSD to `sink`.
    ///
    /// Decode failures are logged and dropped; the next notification proceeds
    /// normally.
    pub fn handle<S: HrvSink + ?Sized>(&mut self, payload: &[u8], sink: &mut S) -> Option<f64> {
        let value = self
            .on_notification(payload)
            .ok()
            .flatten()
            .and_then(|update| update.rmssd.value())?;
        sink.publish(value);
        Some(value)
    }

    /// Fold an already decoded frame into the session.
    pub fn apply(&mut self, frame: &HeartRateFrame) -> Option<HrvUpdate> {
        self.heart_rate = Some(frame.heart_rate);
        if frame.sensor_contact_supported {
            self.sensor_contact_detected = frame.sensor_contact_detected;
        }
        if frame.energy_expended.is_some() {
            self.energy_expended = frame.energy_expended;
        }
        for &rr in &frame.rr_intervals_s {
            self.window.append(rr);
        }

        if !frame.has_rr_intervals() || self.window.total_s() < self.config.trigger_threshold_s {
            return None;
        }

        let rmssd = rmssd_with_ratio(&self.window.samples(), self.config.outlier_ratio);
        match rmssd {
            Rmssd::Value(ms) => log::debug!("HRV: {:.2} ms over {:.1} s", ms, self.window.total_s()),
            Rmssd::Unavailable => log::debug!("HRV unavailable: every successive pair rejected"),
        }
        self.last_rmssd = Some(rmssd);
        Some(HrvUpdate {
            rmssd,
            window_s: self.window.total_s(),
            samples: self.window.len(),
        })
    }

    /// Discard all state, as when the connection restarts.
    pub fn reset(&mut self) {
        log::info!("Resetting heart rate session");
        self.window.clear();
        self.heart_rate = None;
        self.sensor_contact_detected = false;
        self.energy_expended = None;
        self.last_rmssd = None;
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn window(&self) -> &RrWindow {
        &self.window
    }

    pub fn heart_rate(&self) -> Option<u16> {
        self.heart_rate
    }

    pub fn sensor_contact_detected(&self) -> bool {
        self.sensor_contact_detected
    }

    pub fn energy_expended(&self) -> Option<u16> {
        self.energy_expended
    }

    pub fn last_rmssd(&self) -> Option<Rmssd> {
        self.last_rmssd
    }
}

impl Default for HrmSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rr_payload(flags: u8, bpm: u8, raw_rr: &[u16]) -> Vec<u8> {
        let mut bytes = vec![flags | 0x10, bpm];
        for raw in raw_rr {
            bytes.extend(&raw.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn emits_only_once_window_reaches_threshold() {
        let mut session = HrmSession::new();
        // 0.75 s + 0.75 s = 1.5 s
        let first = session.on_notification(&rr_payload(0, 80, &[768, 768])).unwrap();
        assert!(first.is_none());
        assert!((session.window().total_s() - 1.5).abs() < 1e-9);

        // + ~0.6 s = ~2.1 s
        let second = session
            .on_notification(&rr_payload(0, 80, &[615]))
            .unwrap()
            .expect("update at 2.1 s");
        assert!((second.window_s - 2.1).abs() < 0.01);
        assert_eq!(second.samples, 3);
        assert!(second.rmssd.is_available());
    }

    #[test]
    fn frames_without_rr_never_trigger() {
        let mut session = HrmSession::new();
        session.on_notification(&rr_payload(0, 70, &[1024, 1024, 1024])).unwrap();
        assert!(session.on_notification(&[0x00, 70]).unwrap().is_none());
        assert_eq!(session.heart_rate(), Some(70));
    }

    #[test]
    fn unavailable_rmssd_is_reported_but_not_published() {
        let mut session = HrmSession::new();
        // 100 ms then 2000 ms: the only pair is rejected
        let update = session
            .on_notification(&rr_payload(0, 60, &[102, 2048]))
            .unwrap()
            .expect("window above threshold");
        assert_eq!(update.rmssd, Rmssd::Unavailable);

        let mut published = Vec::new();
        let mut sink = |v: f64| published.push(v);
        assert_eq!(session.handle(&rr_payload(0, 60, &[4096]), &mut sink), None);
        assert!(published.is_empty());
    }

    #[test]
    fn truncated_payload_leaves_state_untouched() {
        let mut session = HrmSession::new();
        session.on_notification(&rr_payload(0x04, 65, &[1024])).unwrap();
        let before = session.window().samples();

        let err = session.on_notification(&[0x11, 70, 0x00, 0x04]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
        assert_eq!(session.window().samples(), before);
        assert_eq!(session.heart_rate(), Some(65));
        assert!(session.sensor_contact_detected());
    }

    #[test]
    fn contact_status_persists_when_unsupported() {
        let mut session = HrmSession::new();
        session.on_notification(&[0x06, 70]).unwrap();
        assert!(session.sensor_contact_detected());
        session.on_notification(&[0x00, 71]).unwrap();
        assert!(session.sensor_contact_detected());
    }

    #[test]
    fn energy_expended_is_tracked() {
        let mut session = HrmSession::new();
        session.on_notification(&[0x08, 70, 0x10, 0x00]).unwrap();
        assert_eq!(session.energy_expended(), Some(16));
    }

    #[test]
    fn ignores_other_characteristics() {
        let mut session = HrmSession::new();
        let battery = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);
        assert!(session.on_characteristic(battery, &[0x01]).unwrap().is_none());
        assert!(session.heart_rate().is_none());
        session
            .on_characteristic(HEART_RATE_MEASUREMENT_UUID, &[0x00, 66])
            .unwrap();
        assert_eq!(session.heart_rate(), Some(66));
        assert_eq!(
            HEART_RATE_SERVICE_UUID.to_string(),
            "0000180d-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn publishes_through_channel() {
        let (mut tx, rx) = mpsc::channel::<SessionEvent>();
        let mut session = HrmSession::new();
        let value = session
            .handle(&rr_payload(0, 75, &[820, 830, 810]), &mut tx)
            .expect("value published");
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::RmssdTick { value_ms: value });
    }

    #[test]
    fn publishes_through_f64_channel() {
        let (mut tx, rx) = mpsc::channel::<f64>();
        let mut session = HrmSession::new();
        let value = session
            .handle(&rr_payload(0, 75, &[820, 830, 810]), &mut tx)
            .expect("value published");
        assert_eq!(rx.try_recv().unwrap(), value);

        drop(rx);
        // a closed receiver is logged, not propagated
        assert!(session.handle(&rr_payload(0, 75, &[815]), &mut tx).is_some());
    }

    #[test]
    fn rejects_invalid_window_bound() {
        for measure_time_s in [f64::NAN, 0.0, -5.0] {
            let config = SessionConfig {
                measure_time_s,
                ..SessionConfig::default()
            };
            assert!(HrmSession::with_config(config).is_err());
        }
        let config = SessionConfig {
            outlier_ratio: f64::NAN,
            ..SessionConfig::default()
        };
        assert!(HrmSession::with_config(config).is_err());
    }

    #[test]
    fn reset_clears_window_and_fields() {
        let mut session = HrmSession::new();
        session.on_notification(&rr_payload(0x06, 75, &[820, 830, 810])).unwrap();
        assert!(session.last_rmssd().is_some());
        session.reset();
        assert!(session.window().is_empty());
        assert!(session.heart_rate().is_none());
        assert!(!session.sensor_contact_detected());
        assert!(session.last_rmssd().is_none());
    }

    #[test]
    fn custom_config_bounds_window() {
        let config = SessionConfig {
            measure_time_s: 2.0,
            ..SessionConfig::default()
        };
        let mut session = HrmSession::with_config(config).unwrap();
        for _ in 0..10 {
            session.on_notification(&rr_payload(0, 60, &[1024])).unwrap();
        }
        assert_eq!(session.window().len(), 3);
    }

    #[test]
    fn session_event_json_is_tagged() {
        let json = serde_json::to_string(&SessionEvent::RmssdTick { value_ms: 12.5 }).unwrap();
        assert_eq!(json, r#"{"type":"rmssd_tick","value_ms":12.5}"#);
    }
}
