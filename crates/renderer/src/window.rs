use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::Key;
use winit::window::{Window, WindowBuilder};

use tracing::{debug, error, info, warn};

use crate::alert::{AlertLevel, AlertNotifier, AlertOverlay};
use crate::desktop::DesktopController;
use crate::error::DesktopError;
use crate::gpu::{GpuContext, WgpuBackend};
use crate::keybind::{Hotkey, KeybindHandle, KeybindRegistry, Keybinds};
use crate::placement::Placement;
use crate::source::{open_source, FrameProducer, FrameTracker, SourceFrame};
use crate::types::{FrameFormat, FrameType, ViewerConfig};

/// Everything the viewer loop owns. Fields drop top to bottom, so the desktop
/// goes before the device and the surface before the window it points into.
struct ViewerState {
    desktop: Option<DesktopController<WgpuBackend>>,
    cycle_key: KeybindHandle,
    backend: WgpuBackend,
    gpu: GpuContext,
    producer: Rc<FrameProducer>,
    keybinds: Keybinds,
    alerts: Rc<AlertOverlay>,
    tracker: FrameTracker,
    rejected: Option<FrameType>,
    title: String,
    shown_title: String,
    window: Arc<Window>,
}

impl ViewerState {
    fn new(window: Arc<Window>, config: &ViewerConfig) -> Result<Self> {
        let gpu = GpuContext::new(
            window.as_ref(),
            window.inner_size(),
            config.gpu_power,
            config.vsync,
        )?;
        let backend = WgpuBackend::new(&gpu);

        let keybinds = Keybinds::new();
        let alerts = Rc::new(AlertOverlay::new(config.alert_timeout));
        let desktop = DesktopController::init(
            &backend,
            &keybinds,
            alerts.clone(),
            config.night_vision_key,
        )
        .context("failed to initialise the desktop renderer")?;

        let source = open_source(&config.source)?;
        let producer = Rc::new(FrameProducer::spawn(
            source,
            config.source.format,
            config.source.fps,
        )?);
        let cycle_key = keybinds.register(config.cycle_format_key, {
            let producer = producer.clone();
            Box::new(move |key: Hotkey| {
                debug!(%key, "cycling source format");
                producer.cycle_format();
            })
        });

        Ok(Self {
            desktop: Some(desktop),
            cycle_key,
            backend,
            gpu,
            producer,
            keybinds,
            alerts,
            tracker: FrameTracker::new(),
            rejected: None,
            title: config.title.clone(),
            shown_title: config.title.clone(),
            window,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.gpu.resize(size);
    }

    fn handle_key(&self, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let Key::Character(value) = &event.logical_key else {
            return;
        };
        if let Ok(key) = value.as_str().parse::<Hotkey>() {
            self.keybinds.dispatch(key);
        }
    }

    /// Runs the desktop update sequence for the newest frame, if any.
    fn ingest(&mut self, frame: SourceFrame) {
        let Some(desktop) = self.desktop.as_mut() else {
            return;
        };
        let result = desktop.apply_frame(&mut self.tracker, &frame.format, &frame.data);
        match &result {
            Err(err) if err.is_recoverable() => {
                debug!(error = %err, frame = frame.index, "desktop update deferred");
            }
            Err(err) => error!(error = %err, frame = frame.index, "desktop update failed"),
            Ok(_) => {}
        }
        if let Some((level, message)) = update_alert(&result, &frame.format, &mut self.rejected) {
            self.alerts.post(level, message);
        }
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        if let Some(frame) = self.producer.latest() {
            self.ingest(frame);
        }

        if let Some(desktop) = self.desktop.as_mut() {
            let placement = desktop
                .source_layout()
                .map(|layout| Placement::letterbox(self.gpu.size, layout.width, layout.height))
                .unwrap_or(Placement::FULL);
            desktop.render(
                placement.x,
                placement.y,
                placement.scale_x,
                placement.scale_y,
            );
        }

        let frame = self.gpu.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("viewer encoder"),
            });
        self.backend.encode_frame(&mut encoder, &view);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        self.refresh_title(Instant::now());
        Ok(())
    }

    fn refresh_title(&mut self, now: Instant) {
        let title = match self.alerts.visible(now) {
            Some(alert) => format!("{} - {}", self.title, alert.message),
            None => self.title.clone(),
        };
        if title != self.shown_title {
            self.window.set_title(&title);
            self.shown_title = title;
        }
    }

    fn shutdown(&mut self) {
        DesktopController::free(&mut self.desktop);
        let cycle_key = std::mem::replace(&mut self.cycle_key, KeybindHandle::detached());
        cycle_key.release();
    }
}

/// Alert to show for the outcome of one frame update. Each rejected frame type
/// is reported once until a frame is applied again.
fn update_alert(
    result: &Result<bool, DesktopError>,
    format: &FrameFormat,
    rejected: &mut Option<FrameType>,
) -> Option<(AlertLevel, String)> {
    match result {
        Ok(changed) => {
            *rejected = None;
            changed.then(|| {
                (
                    AlertLevel::Success,
                    format!(
                        "Source {} {}x{}",
                        format.frame_type, format.width, format.height
                    ),
                )
            })
        }
        Err(DesktopError::UnsupportedFormat(frame_type)) => {
            if *rejected == Some(*frame_type) {
                return None;
            }
            *rejected = Some(*frame_type);
            Some((
                AlertLevel::Warning,
                format!("Unsupported source format {frame_type}"),
            ))
        }
        Err(err) if err.is_recoverable() => None,
        Err(err) => Some((AlertLevel::Error, format!("Desktop update failed: {err}"))),
    }
}

/// Opens the viewer window and blocks until it is closed.
pub fn run_viewer(config: ViewerConfig) -> Result<()> {
    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let (width, height) = config.window_size;
    let window = WindowBuilder::new()
        .with_title(&config.title)
        .with_inner_size(PhysicalSize::new(width, height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create viewer window: {err}"))?;
    let window = Arc::new(window);

    let mut state = ViewerState::new(window.clone(), &config)?;
    info!(
        width,
        height,
        format = %config.source.format,
        fps = config.source.fps,
        "viewer started"
    );

    let frame_interval = Duration::from_secs_f32(1.0 / config.source.fps.max(1.0));
    let mut next_frame = Instant::now();

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                elwt.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => state.handle_key(&event),
            WindowEvent::Resized(new_size) => state.resize(new_size),
            WindowEvent::RedrawRequested => match state.render() {
                Ok(()) => {}
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    state.gpu.reconfigure();
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    error!("surface out of memory; closing viewer");
                    elwt.exit();
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    warn!("surface timeout; retrying next frame");
                }
                Err(other) => {
                    warn!(error = ?other, "surface error; retrying next frame");
                }
            },
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            if now >= next_frame {
                state.window.request_redraw();
                next_frame = now + frame_interval;
            }
            elwt.set_control_flow(ControlFlow::WaitUntil(next_frame));
        }
        Event::LoopExiting => {
            state.shutdown();
            info!("viewer closed");
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("viewer event loop error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceError;

    fn rgba() -> FrameFormat {
        FrameFormat::new(FrameType::Rgba, 640, 480, 2560)
    }

    #[test]
    fn applied_source_change_is_a_success_alert() {
        let mut rejected = Some(FrameType::Unknown(9));
        let alert = update_alert(&Ok(true), &rgba(), &mut rejected);
        assert_eq!(
            alert,
            Some((AlertLevel::Success, "Source rgba 640x480".to_string()))
        );
        assert_eq!(rejected, None);
        assert_eq!(update_alert(&Ok(false), &rgba(), &mut rejected), None);
    }

    #[test]
    fn unsupported_format_warns_once_per_frame_type() {
        let mut rejected = None;
        let format = FrameFormat::new(FrameType::Unknown(9), 640, 480, 2560);
        let result = Err(DesktopError::UnsupportedFormat(FrameType::Unknown(9)));

        let first = update_alert(&result, &format, &mut rejected);
        assert!(matches!(first, Some((AlertLevel::Warning, _))));
        assert_eq!(update_alert(&result, &format, &mut rejected), None);

        let other = Err(DesktopError::UnsupportedFormat(FrameType::Invalid));
        assert!(matches!(
            update_alert(&other, &format, &mut rejected),
            Some((AlertLevel::Warning, _))
        ));
    }

    #[test]
    fn fatal_update_failures_raise_error_alerts() {
        let mut rejected = None;
        let retryable = Err(DesktopError::TextureUpload(ResourceError::NotConfigured));
        assert_eq!(update_alert(&retryable, &rgba(), &mut rejected), None);

        let fatal = Err(DesktopError::ResourceInit {
            resource: "desktop texture",
            source: ResourceError::Compile("broken".into()),
        });
        assert!(matches!(
            update_alert(&fatal, &rgba(), &mut rejected),
            Some((AlertLevel::Error, _))
        ));
    }
}
