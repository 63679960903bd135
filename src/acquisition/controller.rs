//! The acquisition / AOI controller.
//!
//! Owns the open camera, the capture loop thread and the reconfiguration
//! protocol. All driver access goes through one session mutex; the state
//! machine decides which operations are legal at any moment.

use crate::acquisition::decode::decode_samples;
use crate::acquisition::sink::FrameSink;
use crate::controls::{self, ControlId, ControlInfo, ControlValue};
use crate::driver::{CameraBackend, CameraDevice};
use crate::errors::CameraError;
use crate::timing::CaptureClock;
use crate::types::{AoiRect, ColorMode, RawFrame, SensorGeometry};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Controller life cycle.
///
/// `Disconnected` is initial and terminal; `Idle` means connected with
/// capture stopped and no buffer allocated (the landing state after a failed
/// reconfiguration); `Reconfiguring` pins the buffer swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Disconnected,
    Idle,
    Capturing,
    Reconfiguring,
}

/// Connect-time options.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub device_index: usize,
    pub preferred_mode: ColorMode,
    /// Clamped into the driver's reported range before being applied.
    pub initial_exposure_us: f64,
    pub initial_frame_rate_hz: Option<f64>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            device_index: 0,
            preferred_mode: ColorMode::Mono12,
            initial_exposure_us: 100_000.0,
            initial_frame_rate_hz: None,
        }
    }
}

struct Session {
    device: Box<dyn CameraDevice>,
    geometry: SensorGeometry,
    mode: ColorMode,
    aoi: AoiRect,
    aoi_enabled: bool,
}

struct Inner {
    state: Mutex<ControllerState>,
    session: Mutex<Option<Session>>,
    sinks: Mutex<Vec<Arc<dyn FrameSink>>>,
    clock: CaptureClock,
    session_id: Uuid,
    next_sequence: Mutex<u64>,
    stop_flag: AtomicBool,
    disconnecting: AtomicBool,
    loop_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

/// Owner of one camera connection.
///
/// Created by [`AcquisitionController::connect`]; capture starts immediately
/// and frames flow to the registered [`FrameSink`]s until `disconnect` (or
/// drop).
pub struct AcquisitionController {
    inner: Arc<Inner>,
}

impl AcquisitionController {
    /// Enumerate the backend, open a device and start capturing.
    ///
    /// The preferred color mode falls back along
    /// [`ColorMode::FALLBACK_CHAIN`], each candidate tried once; rejections
    /// inside the chain are logged, not surfaced. Any other failure tears the
    /// connection down again and nothing is left running.
    pub fn connect(
        backend: Box<dyn CameraBackend>,
        options: ConnectOptions,
    ) -> Result<Self, CameraError> {
        let devices = backend
            .list_devices()
            .map_err(|e| CameraError::driver("list_devices", e))?;
        if devices.is_empty() {
            return Err(CameraError::NoCameraDetected);
        }

        let mut device = backend
            .open(options.device_index)
            .map_err(|e| CameraError::driver("open", e))?;
        let geometry = device.sensor_geometry();

        let candidates = ColorMode::fallback_candidates(options.preferred_mode);
        let mut selected = None;
        for &mode in &candidates {
            match device.set_color_mode(mode) {
                Ok(()) => {
                    selected = Some(mode);
                    break;
                }
                Err(e) => log::warn!("color mode {mode} rejected: {e}"),
            }
        }
        let mode = selected.ok_or(CameraError::UnsupportedColorMode { tried: candidates })?;

        let (exp_min, exp_max) = device.exposure_range_us();
        let exposure = options.initial_exposure_us.clamp(exp_min, exp_max);
        device
            .set_exposure_us(exposure)
            .map_err(|e| CameraError::driver("set_exposure", e))?;

        if let Some(rate) = options.initial_frame_rate_hz {
            device
                .set_frame_rate_hz(rate)
                .map_err(|e| CameraError::driver("set_frame_rate", e))?;
        }

        let aoi = AoiRect::full_sensor(geometry);
        device
            .set_aoi(aoi)
            .map_err(|e| CameraError::driver("set_aoi", e))?;
        device
            .allocate()
            .map_err(|e| CameraError::driver("allocate", e))?;
        device
            .start_capture()
            .map_err(|e| CameraError::driver("start_capture", e))?;

        let session_id = Uuid::new_v4();
        log::info!(
            "session {session_id}: connected {geometry} sensor in {mode}, exposure {exposure} us"
        );

        let inner = Arc::new(Inner {
            state: Mutex::new(ControllerState::Capturing),
            session: Mutex::new(Some(Session {
                device,
                geometry,
                mode,
                aoi,
                aoi_enabled: false,
            })),
            sinks: Mutex::new(Vec::new()),
            clock: CaptureClock::new(),
            session_id,
            next_sequence: Mutex::new(1),
            stop_flag: AtomicBool::new(false),
            disconnecting: AtomicBool::new(false),
            loop_thread: Mutex::new(None),
        });

        let loop_inner = inner.clone();
        let handle = thread::Builder::new()
            .name("cmosbench-capture".to_string())
            .spawn(move || capture_loop(loop_inner))
            .map_err(|e| {
                CameraError::driver(
                    "start_capture",
                    crate::errors::DriverError::new(format!("spawn failed: {e}")),
                )
            })?;
        *inner.loop_thread.lock().expect("lock poisoned") = Some(handle);

        Ok(Self { inner })
    }

    /// Register a frame consumer. Sinks added after connect miss the frames
    /// pulled before registration.
    pub fn add_sink(&self, sink: Arc<dyn FrameSink>) {
        self.inner.sinks.lock().expect("lock poisoned").push(sink);
    }

    /// Pull, decode and publish one frame. Legal only while `Capturing`.
    pub fn pull_frame(&self) -> Result<RawFrame, CameraError> {
        pull_frame_inner(&self.inner)
    }

    /// Apply a new AOI through the stop/free/set/alloc/start protocol.
    ///
    /// `forced` applies `rect` without touching the AOI-enabled flag (live
    /// slider drags). Unforced calls toggle: off -> apply `rect` and enable,
    /// on -> revert to the full sensor and disable. The rectangle is
    /// validated before anything stops, so an [`CameraError::InvalidAoi`]
    /// leaves the running capture untouched.
    pub fn reconfigure_aoi(&self, rect: AoiRect, forced: bool) -> Result<(), CameraError> {
        let inner = &self.inner;

        let (geometry, aoi_enabled) = {
            let guard = inner.session.lock().expect("lock poisoned");
            let session = guard.as_ref().ok_or(CameraError::BufferUnavailable {
                state: ControllerState::Disconnected,
            })?;
            (session.geometry, session.aoi_enabled)
        };
        rect.validate(&geometry)?;

        let previous = {
            let mut state = inner.state.lock().expect("lock poisoned");
            match *state {
                s @ (ControllerState::Capturing | ControllerState::Idle) => {
                    *state = ControllerState::Reconfiguring;
                    s
                }
                other => return Err(CameraError::BufferUnavailable { state: other }),
            }
        };

        let target = if !forced && aoi_enabled {
            AoiRect::full_sensor(geometry)
        } else {
            rect
        };

        match swap_buffers(inner, target, previous == ControllerState::Capturing) {
            Ok(()) => {
                {
                    let mut guard = inner.session.lock().expect("lock poisoned");
                    if let Some(session) = guard.as_mut() {
                        session.aoi = target;
                        if !forced {
                            session.aoi_enabled = !aoi_enabled;
                        }
                    }
                }
                settle_state(inner, ControllerState::Capturing);
                log::info!("session {}: AOI now {target}", inner.session_id);
                for sink in snapshot_sinks(inner) {
                    sink.on_aoi_changed(target);
                }
                Ok(())
            }
            Err(e) => {
                settle_state(inner, ControllerState::Idle);
                log::error!(
                    "session {}: AOI reconfiguration failed, capture stopped: {e}",
                    inner.session_id
                );
                Err(e)
            }
        }
    }

    /// Stop capture and release the camera. Idempotent; callable from any
    /// state and from inside a sink callback.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        if inner.disconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.stop_flag.store(true, Ordering::Relaxed);

        let handle = inner.loop_thread.lock().expect("lock poisoned").take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // called from a sink callback on the loop thread; the loop
                // exits on the stop flag once the callback returns
            } else if let Err(e) = handle.join() {
                log::warn!("capture loop panicked: {e:?}");
            }
        }

        let mut guard = inner.session.lock().expect("lock poisoned");
        if let Some(mut session) = guard.take() {
            if let Err(e) = session.device.stop_capture() {
                log::debug!("stop_capture during disconnect: {e}");
            }
            if let Err(e) = session.device.free() {
                log::debug!("free during disconnect: {e}");
            }
            log::info!("session {}: disconnected", inner.session_id);
        }
        drop(guard);

        *inner.state.lock().expect("lock poisoned") = ControllerState::Disconnected;
        inner.disconnecting.store(false, Ordering::SeqCst);
    }

    pub fn state(&self) -> ControllerState {
        *self.inner.state.lock().expect("lock poisoned")
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    /// Frames successfully pulled so far.
    pub fn frames_pulled(&self) -> u64 {
        *self.inner.next_sequence.lock().expect("lock poisoned") - 1
    }

    pub fn geometry(&self) -> Result<SensorGeometry, CameraError> {
        self.with_session(|s| s.geometry)
    }

    pub fn color_mode(&self) -> Result<ColorMode, CameraError> {
        self.with_session(|s| s.mode)
    }

    pub fn aoi(&self) -> Result<AoiRect, CameraError> {
        self.with_session(|s| s.aoi)
    }

    pub fn aoi_enabled(&self) -> Result<bool, CameraError> {
        self.with_session(|s| s.aoi_enabled)
    }

    // -- sensor controls ---------------------------------------------------

    pub fn exposure_us(&self) -> Result<f64, CameraError> {
        self.with_session(|s| s.device.exposure_us())
    }

    pub fn exposure_range_us(&self) -> Result<(f64, f64), CameraError> {
        self.with_session(|s| s.device.exposure_range_us())
    }

    pub fn set_exposure_us(&self, exposure_us: f64) -> Result<(), CameraError> {
        self.with_device("set_exposure", |d| d.set_exposure_us(exposure_us))
    }

    /// Evenly spaced exposure values across the driver range, for slider
    /// widgets.
    pub fn exposure_range_points(&self, count: usize) -> Result<Vec<f64>, CameraError> {
        let (min, max) = self.exposure_range_us()?;
        if count < 2 {
            return Ok(vec![min]);
        }
        let step = (max - min) / (count as f64 - 1.0);
        Ok((0..count).map(|i| min + step * i as f64).collect())
    }

    pub fn frame_rate_hz(&self) -> Result<f64, CameraError> {
        self.with_session(|s| s.device.frame_rate_hz())
    }

    pub fn set_frame_rate_hz(&self, rate_hz: f64) -> Result<(), CameraError> {
        self.with_device("set_frame_rate", |d| d.set_frame_rate_hz(rate_hz))
    }

    /// Achievable whole-fps bounds derived from the driver's frame time
    /// range.
    pub fn fps_range(&self) -> Result<(u32, u32), CameraError> {
        let (min_time, max_time, _step) = self.with_session(|s| s.device.frame_time_range_s())?;
        let min_fps = (1.0 / max_time).ceil() as u32;
        let max_fps = (1.0 / min_time).floor() as u32;
        Ok((min_fps, max_fps))
    }

    pub fn black_level(&self) -> Result<u32, CameraError> {
        self.with_session(|s| s.device.black_level())
    }

    pub fn black_level_range(&self) -> Result<(u32, u32), CameraError> {
        self.with_session(|s| s.device.black_level_range())
    }

    pub fn set_black_level(&self, level: u32) -> Result<(), CameraError> {
        self.with_device("set_black_level", |d| d.set_black_level(level))
    }

    /// Control descriptors with ranges filled in from the open device.
    pub fn list_controls(&self) -> Result<Vec<ControlInfo>, CameraError> {
        let exposure = self.exposure_range_us()?;
        let fps = self.fps_range()?;
        let black = self.black_level_range()?;
        Ok(controls::control_infos(exposure, fps, black))
    }

    pub fn get_control(&self, id: ControlId) -> Result<ControlValue, CameraError> {
        match id {
            ControlId::ExposureTime => Ok(ControlValue::F64(self.exposure_us()?)),
            ControlId::FrameRate => Ok(ControlValue::F64(self.frame_rate_hz()?)),
            ControlId::BlackLevel => Ok(ControlValue::U32(self.black_level()?)),
        }
    }

    /// Validate against the device ranges, then route to the setter.
    pub fn set_control(&self, id: ControlId, value: ControlValue) -> Result<(), CameraError> {
        let infos = self.list_controls()?;
        if let Some(info) = infos.iter().find(|c| c.id == id) {
            controls::validate_control_value(info, &value)
                .map_err(|e| CameraError::driver("set_control", e))?;
        }

        match (id, value) {
            (ControlId::ExposureTime, ControlValue::F64(v)) => self.set_exposure_us(v),
            (ControlId::FrameRate, ControlValue::F64(v)) => self.set_frame_rate_hz(v),
            (ControlId::BlackLevel, ControlValue::U32(v)) => self.set_black_level(v),
            // kind mismatches are caught by validate_control_value
            _ => Ok(()),
        }
    }

    // -- helpers -----------------------------------------------------------

    fn with_session<T>(&self, f: impl FnOnce(&Session) -> T) -> Result<T, CameraError> {
        let guard = self.inner.session.lock().expect("lock poisoned");
        let session = guard.as_ref().ok_or(CameraError::BufferUnavailable {
            state: ControllerState::Disconnected,
        })?;
        Ok(f(session))
    }

    fn with_device<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut dyn CameraDevice) -> Result<T, crate::errors::DriverError>,
    ) -> Result<T, CameraError> {
        let mut guard = self.inner.session.lock().expect("lock poisoned");
        let session = guard.as_mut().ok_or(CameraError::BufferUnavailable {
            state: ControllerState::Disconnected,
        })?;
        f(session.device.as_mut()).map_err(|e| CameraError::driver(operation, e))
    }
}

impl std::fmt::Debug for AcquisitionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionController")
            .field("session_id", &self.inner.session_id)
            .field("state", &*self.inner.state.lock().expect("lock poisoned"))
            .finish()
    }
}

impl Drop for AcquisitionController {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// The stop -> free -> set_aoi -> allocate -> start sequence, run under the
/// session lock so no pull can observe a half-swapped buffer. On failure the
/// device is left stopped with no buffer, matching the `Idle` state the
/// caller reports.
fn swap_buffers(inner: &Inner, rect: AoiRect, was_capturing: bool) -> Result<(), CameraError> {
    let mut guard = inner.session.lock().expect("lock poisoned");
    let session = guard.as_mut().ok_or(CameraError::BufferUnavailable {
        state: ControllerState::Disconnected,
    })?;
    let device = session.device.as_mut();

    let result = (|| -> Result<(), CameraError> {
        if was_capturing {
            device
                .stop_capture()
                .map_err(|e| CameraError::driver("stop_capture", e))?;
            device.free().map_err(|e| CameraError::driver("free", e))?;
        }
        device
            .set_aoi(rect)
            .map_err(|e| CameraError::driver("set_aoi", e))?;
        device
            .allocate()
            .map_err(|e| CameraError::driver("allocate", e))?;
        device
            .start_capture()
            .map_err(|e| CameraError::driver("start_capture", e))?;
        Ok(())
    })();

    if result.is_err() {
        let _ = device.stop_capture();
        let _ = device.free();
    }
    result
}

/// Leave `Reconfiguring` for `next`, unless a concurrent disconnect already
/// moved the controller to `Disconnected`.
fn settle_state(inner: &Inner, next: ControllerState) {
    let mut state = inner.state.lock().expect("lock poisoned");
    if *state == ControllerState::Reconfiguring {
        *state = next;
    }
}

fn snapshot_sinks(inner: &Inner) -> Vec<Arc<dyn FrameSink>> {
    inner.sinks.lock().expect("lock poisoned").clone()
}

fn pull_frame_inner(inner: &Inner) -> Result<RawFrame, CameraError> {
    {
        let state = *inner.state.lock().expect("lock poisoned");
        if state != ControllerState::Capturing {
            return Err(CameraError::BufferUnavailable { state });
        }
    }

    let raw = {
        let mut guard = inner.session.lock().expect("lock poisoned");
        let session = guard.as_mut().ok_or(CameraError::BufferUnavailable {
            state: ControllerState::Disconnected,
        })?;

        // a reconfiguration may have won the race for the session lock;
        // re-check now that we hold it
        let state = *inner.state.lock().expect("lock poisoned");
        if state != ControllerState::Capturing {
            return Err(CameraError::BufferUnavailable { state });
        }

        let bytes = session
            .device
            .read_latest_frame()
            .map_err(|e| CameraError::driver("read_latest_frame", e))?;
        let samples = decode_samples(&bytes, session.mode, session.aoi.width, session.aoi.height)
            .map_err(|e| CameraError::driver("read_latest_frame", e))?;

        let sequence = {
            let mut g = inner.next_sequence.lock().expect("lock poisoned");
            let v = *g;
            *g = g.saturating_add(1);
            v
        };

        RawFrame::new(
            sequence,
            inner.clock.timestamp_us(),
            Utc::now(),
            session.mode,
            session.aoi.width,
            session.aoi.height,
            samples,
        )
    };

    let display = raw.to_display();
    for sink in snapshot_sinks(inner) {
        sink.on_frame_ready(&display);
    }
    Ok(raw)
}

/// Polling interval for the capture loop: `1000 / rate` ms, floored at 1 ms.
fn tick_interval(rate_hz: f64) -> Duration {
    if rate_hz <= 0.0 {
        return Duration::from_millis(1);
    }
    Duration::from_millis(((1000.0 / rate_hz).round() as u64).max(1))
}

fn capture_loop(inner: Arc<Inner>) {
    log::debug!("session {}: capture loop running", inner.session_id);
    loop {
        if inner.stop_flag.load(Ordering::Relaxed) {
            break;
        }

        let interval = {
            let guard = inner.session.lock().expect("lock poisoned");
            match guard.as_ref() {
                Some(session) => tick_interval(session.device.frame_rate_hz()),
                None => break,
            }
        };

        match pull_frame_inner(&inner) {
            Ok(_) => {}
            // a reconfiguration owns the buffer right now; skip this tick
            Err(CameraError::BufferUnavailable { .. }) => {}
            Err(e) => {
                log::error!(
                    "session {}: frame pull failed, stopping capture: {e}",
                    inner.session_id
                );
                let mut guard = inner.session.lock().expect("lock poisoned");
                if let Some(session) = guard.as_mut() {
                    let _ = session.device.stop_capture();
                    let _ = session.device.free();
                }
                drop(guard);
                *inner.state.lock().expect("lock poisoned") = ControllerState::Idle;
                break;
            }
        }

        // sleep in short slices so disconnect stays prompt at low frame rates
        let mut remaining = interval;
        while remaining > Duration::ZERO && !inner.stop_flag.load(Ordering::Relaxed) {
            let slice = remaining.min(Duration::from_millis(50));
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }
    log::debug!("session {}: capture loop stopped", inner.session_id);
}
