//! Integration tests for the acquisition controller state machine,
//! color-mode fallback and the AOI reconfiguration protocol.

use cmosbench::driver::{SimulatedBackend, SimulatedSpec};
use cmosbench::errors::DriverError;
use cmosbench::{
    AcquisitionController, AoiRect, CameraBackend, CameraDevice, CameraError, ColorMode,
    ConnectOptions, ControllerState, DeviceDescriptor, FrameSink,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

fn connect_default() -> AcquisitionController {
    AcquisitionController::connect(Box::new(SimulatedBackend::new()), ConnectOptions::default())
        .expect("simulated camera connects")
}

mod connect_tests {
    use super::*;

    #[test]
    fn test_connect_starts_capturing_on_full_sensor() {
        let controller = connect_default();
        assert_eq!(controller.state(), ControllerState::Capturing);
        assert_eq!(controller.color_mode().unwrap(), ColorMode::Mono12);
        assert_eq!(controller.aoi().unwrap(), AoiRect::new(0, 0, 1280, 1024));
        assert!(!controller.aoi_enabled().unwrap());
        controller.disconnect();
    }

    #[test]
    fn test_connect_clamps_exposure_into_driver_range() {
        let controller = AcquisitionController::connect(
            Box::new(SimulatedBackend::new()),
            ConnectOptions {
                initial_exposure_us: 1e12,
                ..ConnectOptions::default()
            },
        )
        .unwrap();
        assert_eq!(controller.exposure_us().unwrap(), 500_000.0);
        controller.disconnect();
    }

    #[test]
    fn test_mono12_falls_back_to_mono8_silently() {
        let backend = SimulatedBackend::with_specs(vec![SimulatedSpec::mono8_only()]);
        let controller = AcquisitionController::connect(
            Box::new(backend),
            ConnectOptions {
                preferred_mode: ColorMode::Mono12,
                ..ConnectOptions::default()
            },
        )
        .expect("fallback chain lands on Mono8");
        let mode = controller.color_mode().unwrap();
        assert_eq!(mode, ColorMode::Mono8);
        assert_eq!(mode.bytes_per_pixel(), 1);
        controller.disconnect();
    }

    #[test]
    fn test_no_supported_mode_is_a_typed_error() {
        let spec = SimulatedSpec {
            supported_modes: vec![],
            ..SimulatedSpec::default()
        };
        let backend = SimulatedBackend::with_specs(vec![spec]);
        let err = AcquisitionController::connect(Box::new(backend), ConnectOptions::default())
            .unwrap_err();
        assert!(matches!(err, CameraError::UnsupportedColorMode { ref tried }
            if tried == &ColorMode::FALLBACK_CHAIN.to_vec()));
    }

    #[test]
    fn test_no_devices_means_no_camera_detected() {
        let err = AcquisitionController::connect(
            Box::new(SimulatedBackend::empty()),
            ConnectOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, CameraError::NoCameraDetected);
    }
}

mod aoi_tests {
    use super::*;

    #[test]
    fn test_unforced_reconfigure_enables_aoi() {
        let controller = connect_default();
        let rect = AoiRect::new(100, 100, 640, 480);

        controller.reconfigure_aoi(rect, false).unwrap();
        assert_eq!(controller.state(), ControllerState::Capturing);
        assert!(controller.aoi_enabled().unwrap());
        assert_eq!(controller.aoi().unwrap(), rect);
        controller.disconnect();
    }

    #[test]
    fn test_second_unforced_reconfigure_reverts_to_full_sensor() {
        let controller = connect_default();
        let rect = AoiRect::new(100, 100, 640, 480);
        controller.reconfigure_aoi(rect, false).unwrap();

        // second unforced call reverts, whatever rectangle is passed
        controller.reconfigure_aoi(rect, false).unwrap();
        assert_eq!(controller.aoi().unwrap(), AoiRect::new(0, 0, 1280, 1024));
        assert!(!controller.aoi_enabled().unwrap());
        assert_eq!(controller.state(), ControllerState::Capturing);
        controller.disconnect();
    }

    #[test]
    fn test_forced_reconfigure_leaves_flag_alone() {
        let controller = connect_default();
        let rect = AoiRect::new(64, 64, 320, 240);

        controller.reconfigure_aoi(rect, true).unwrap();
        assert_eq!(controller.aoi().unwrap(), rect);
        assert!(!controller.aoi_enabled().unwrap());

        // forced drags keep working once AOI mode is on
        controller
            .reconfigure_aoi(AoiRect::new(0, 0, 200, 200), false)
            .unwrap();
        assert!(controller.aoi_enabled().unwrap());
        controller
            .reconfigure_aoi(AoiRect::new(8, 8, 100, 100), true)
            .unwrap();
        assert!(controller.aoi_enabled().unwrap());
        assert_eq!(controller.aoi().unwrap(), AoiRect::new(8, 8, 100, 100));
        controller.disconnect();
    }

    #[test]
    fn test_invalid_aoi_is_rejected_and_nothing_changes() {
        let controller = connect_default();
        let before = controller.aoi().unwrap();

        let err = controller
            .reconfigure_aoi(AoiRect::new(1000, 0, 640, 480), false)
            .unwrap_err();
        assert!(matches!(err, CameraError::InvalidAoi { .. }));
        assert_eq!(controller.aoi().unwrap(), before);
        assert!(!controller.aoi_enabled().unwrap());
        assert_eq!(controller.state(), ControllerState::Capturing);

        // capture is still healthy after the rejection
        assert!(controller.pull_frame().is_ok());
        controller.disconnect();
    }

    #[test]
    fn test_aoi_changed_event_reaches_sinks() {
        struct RecordingSink {
            rects: Mutex<Vec<AoiRect>>,
        }
        impl FrameSink for RecordingSink {
            fn on_frame_ready(&self, _frame: &cmosbench::DisplayFrame) {}
            fn on_aoi_changed(&self, rect: AoiRect) {
                self.rects.lock().unwrap().push(rect);
            }
        }

        let controller = connect_default();
        let sink = Arc::new(RecordingSink {
            rects: Mutex::new(Vec::new()),
        });
        controller.add_sink(sink.clone());

        let rect = AoiRect::new(100, 100, 640, 480);
        controller.reconfigure_aoi(rect, false).unwrap();
        controller.reconfigure_aoi(rect, false).unwrap();

        let rects = sink.rects.lock().unwrap().clone();
        assert_eq!(rects, vec![rect, AoiRect::new(0, 0, 1280, 1024)]);
        controller.disconnect();
    }
}

mod pull_tests {
    use super::*;

    #[test]
    fn test_pull_frame_matches_aoi_and_mode() {
        let controller = connect_default();
        controller
            .reconfigure_aoi(AoiRect::new(0, 0, 64, 32), false)
            .unwrap();
        let frame = controller.pull_frame().unwrap();
        assert_eq!((frame.width, frame.height), (64, 32));
        assert_eq!(frame.color_mode, ColorMode::Mono12);
        assert_eq!(frame.samples().len(), 64 * 32);

        let display = frame.to_display();
        assert_eq!(display.data.len(), 64 * 32);
        controller.disconnect();
    }

    #[test]
    fn test_pull_after_disconnect_is_buffer_unavailable() {
        let controller = connect_default();
        controller.disconnect();
        let err = controller.pull_frame().unwrap_err();
        assert_eq!(
            err,
            CameraError::BufferUnavailable {
                state: ControllerState::Disconnected
            }
        );
    }

    #[test]
    fn test_failed_pull_does_not_advance_the_frame_counter() {
        let controller = connect_default();
        let _ = controller.pull_frame().unwrap();
        let pulled = controller.frames_pulled();
        controller.disconnect();
        assert!(controller.pull_frame().is_err());
        assert_eq!(controller.frames_pulled(), pulled);
    }

    #[test]
    fn test_concurrent_pulls_and_reconfigures_stay_consistent() {
        // a pull racing a reconfiguration either sees a complete frame of
        // the active AOI or a typed BufferUnavailable, never a torn buffer
        let controller = Arc::new(connect_default());
        let stop = Arc::new(AtomicBool::new(false));

        let puller = {
            let controller = controller.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    match controller.pull_frame() {
                        Ok(frame) => {
                            assert_eq!(
                                frame.samples().len(),
                                (frame.width * frame.height) as usize
                            );
                        }
                        Err(CameraError::BufferUnavailable { .. }) => {}
                        Err(e) => panic!("unexpected error during race: {e}"),
                    }
                }
            })
        };

        for i in 0..20u32 {
            let size = 64 + 32 * (i % 4);
            controller
                .reconfigure_aoi(AoiRect::new(i, i, size, size), true)
                .unwrap();
        }

        stop.store(true, Ordering::SeqCst);
        puller.join().expect("puller thread panicked");
        controller.disconnect();
    }

    #[test]
    fn test_capture_loop_feeds_sinks() {
        let queue = Arc::new(cmosbench::FrameQueue::new(4));
        let controller = connect_default();
        controller.add_sink(queue.clone());
        let frame = queue
            .pop_timeout(std::time::Duration::from_secs(5))
            .expect("loop delivers a frame");
        assert_eq!((frame.width, frame.height), (1280, 1024));
        controller.disconnect();
    }
}

mod disconnect_tests {
    use super::*;

    #[test]
    fn test_disconnect_is_idempotent() {
        let controller = connect_default();
        controller.disconnect();
        assert_eq!(controller.state(), ControllerState::Disconnected);
        controller.disconnect();
        assert_eq!(controller.state(), ControllerState::Disconnected);
    }

    #[test]
    fn test_disconnect_from_inside_a_sink_callback() {
        struct DisconnectingSink {
            controller: Mutex<Option<Arc<AcquisitionController>>>,
            fired: AtomicBool,
        }
        impl FrameSink for DisconnectingSink {
            fn on_frame_ready(&self, _frame: &cmosbench::DisplayFrame) {
                if !self.fired.swap(true, Ordering::SeqCst) {
                    if let Some(controller) = self.controller.lock().unwrap().as_ref() {
                        controller.disconnect();
                    }
                }
            }
        }

        let controller = Arc::new(connect_default());
        let sink = Arc::new(DisconnectingSink {
            controller: Mutex::new(Some(controller.clone())),
            fired: AtomicBool::new(false),
        });
        controller.add_sink(sink.clone());

        // the capture loop fires the sink, which disconnects without deadlock
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while controller.state() != ControllerState::Disconnected {
            assert!(
                std::time::Instant::now() < deadline,
                "disconnect from sink callback timed out"
            );
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }
}

mod failure_tests {
    use super::*;

    /// Backend whose device fails `set_aoi` once on request, for driving the
    /// reconfiguration failure path.
    struct FlakyBackend {
        fail_set_aoi: Arc<AtomicBool>,
    }

    struct FlakyCamera {
        inner: Box<dyn CameraDevice>,
        fail_set_aoi: Arc<AtomicBool>,
    }

    impl CameraBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, DriverError> {
            SimulatedBackend::new().list_devices()
        }
        fn open(&self, index: usize) -> Result<Box<dyn CameraDevice>, DriverError> {
            Ok(Box::new(FlakyCamera {
                inner: SimulatedBackend::new().open(index)?,
                fail_set_aoi: self.fail_set_aoi.clone(),
            }))
        }
    }

    impl CameraDevice for FlakyCamera {
        fn sensor_geometry(&self) -> cmosbench::SensorGeometry {
            self.inner.sensor_geometry()
        }
        fn set_color_mode(&mut self, mode: ColorMode) -> Result<(), DriverError> {
            self.inner.set_color_mode(mode)
        }
        fn set_aoi(&mut self, rect: AoiRect) -> Result<(), DriverError> {
            if self.fail_set_aoi.swap(false, Ordering::SeqCst) {
                return Err(DriverError::new("injected set_aoi failure"));
            }
            self.inner.set_aoi(rect)
        }
        fn aoi(&self) -> AoiRect {
            self.inner.aoi()
        }
        fn exposure_range_us(&self) -> (f64, f64) {
            self.inner.exposure_range_us()
        }
        fn exposure_us(&self) -> f64 {
            self.inner.exposure_us()
        }
        fn set_exposure_us(&mut self, exposure_us: f64) -> Result<(), DriverError> {
            self.inner.set_exposure_us(exposure_us)
        }
        fn frame_time_range_s(&self) -> (f64, f64, f64) {
            self.inner.frame_time_range_s()
        }
        fn frame_rate_hz(&self) -> f64 {
            self.inner.frame_rate_hz()
        }
        fn set_frame_rate_hz(&mut self, rate_hz: f64) -> Result<(), DriverError> {
            self.inner.set_frame_rate_hz(rate_hz)
        }
        fn black_level_range(&self) -> (u32, u32) {
            self.inner.black_level_range()
        }
        fn black_level(&self) -> u32 {
            self.inner.black_level()
        }
        fn set_black_level(&mut self, level: u32) -> Result<(), DriverError> {
            self.inner.set_black_level(level)
        }
        fn allocate(&mut self) -> Result<(), DriverError> {
            self.inner.allocate()
        }
        fn free(&mut self) -> Result<(), DriverError> {
            self.inner.free()
        }
        fn start_capture(&mut self) -> Result<(), DriverError> {
            self.inner.start_capture()
        }
        fn stop_capture(&mut self) -> Result<(), DriverError> {
            self.inner.stop_capture()
        }
        fn read_latest_frame(&mut self) -> Result<Vec<u8>, DriverError> {
            self.inner.read_latest_frame()
        }
    }

    #[test]
    fn test_reconfigure_failure_lands_in_idle_and_is_retryable() {
        let fail_set_aoi = Arc::new(AtomicBool::new(false));
        let backend = FlakyBackend {
            fail_set_aoi: fail_set_aoi.clone(),
        };
        let controller =
            AcquisitionController::connect(Box::new(backend), ConnectOptions::default()).unwrap();
        let before = controller.aoi().unwrap();
        let rect = AoiRect::new(100, 100, 640, 480);

        fail_set_aoi.store(true, Ordering::SeqCst);
        let err = controller.reconfigure_aoi(rect, false).unwrap_err();
        assert!(matches!(
            err,
            CameraError::DriverOperationFailed {
                operation: "set_aoi",
                ..
            }
        ));
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(controller.aoi().unwrap(), before);

        // pulls are refused while idle
        let err = controller.pull_frame().unwrap_err();
        assert_eq!(
            err,
            CameraError::BufferUnavailable {
                state: ControllerState::Idle
            }
        );

        // the injected failure is gone; retrying from Idle resumes capture
        controller.reconfigure_aoi(rect, false).unwrap();
        assert_eq!(controller.state(), ControllerState::Capturing);
        assert_eq!(controller.aoi().unwrap(), rect);
        assert!(controller.pull_frame().is_ok());
        controller.disconnect();
    }
}
