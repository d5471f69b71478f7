//! The desktop quad: format selection, streaming texture updates, and drawing.
//!
//! The owning render loop drives one strictly ordered sequence per displayed
//! frame:
//!
//! ```text
//!   prepare_update(changed, format, data)   resolve format + shader, stash data
//!          │
//!          ▼
//!   perform_update(changed)                 uniforms + texture setup, upload
//!          │
//!          ▼
//!   render(x, y, scale_x, scale_y)          activate shader, set uniforms, draw
//! ```
//!
//! The night-vision hot-key runs outside that sequence but on the same thread;
//! it only touches the gain cell read by `render`.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, error, warn};

use crate::alert::AlertNotifier;
use crate::backend::{Backend, Model, ShaderProgram, Texture, UniformLocation, UniformValue};
use crate::compile;
use crate::error::DesktopError;
use crate::keybind::{Hotkey, KeybindHandle, KeybindRegistry};
use crate::night_vision::NightVision;
use crate::source::FrameTracker;
use crate::types::{FrameBuffer, FrameFormat, FrameType, PixelFormat, ShaderKind, SourceLayout};

/// Uniforms the desktop shaders expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DesktopUniform {
    Position,
    NightVision,
    NightVisionGain,
}

impl DesktopUniform {
    pub const ALL: [DesktopUniform; 3] = [
        DesktopUniform::Position,
        DesktopUniform::NightVision,
        DesktopUniform::NightVisionGain,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DesktopUniform::Position => "position",
            DesktopUniform::NightVision => "nv",
            DesktopUniform::NightVisionGain => "nvGain",
        }
    }
}

/// Uniform handles resolved from the active shader on the last source change.
#[derive(Debug, Default)]
struct UniformSlots {
    slots: HashMap<DesktopUniform, UniformLocation>,
}

impl UniformSlots {
    fn resolve<S: ShaderProgram>(shader: &S, kind: ShaderKind) -> Self {
        let mut slots = HashMap::with_capacity(DesktopUniform::ALL.len());
        for uniform in DesktopUniform::ALL {
            match shader.uniform_location(uniform.name()) {
                Some(location) => {
                    slots.insert(uniform, location);
                }
                None => warn!(
                    shader = ?kind,
                    uniform = uniform.name(),
                    "desktop shader does not declare uniform"
                ),
            }
        }
        Self { slots }
    }

    fn set<S: ShaderProgram>(&self, shader: &mut S, uniform: DesktopUniform, value: UniformValue) {
        if let Some(location) = self.slots.get(&uniform) {
            shader.set_uniform(*location, value);
        }
    }
}

// `yuv` is created second, so it is declared (and dropped) first.
struct DesktopShaders<S> {
    yuv: S,
    generic: S,
}

impl<S> DesktopShaders<S> {
    fn get(&self, kind: ShaderKind) -> &S {
        match kind {
            ShaderKind::Generic => &self.generic,
            ShaderKind::Yuv => &self.yuv,
        }
    }

    fn get_mut(&mut self, kind: ShaderKind) -> &mut S {
        match kind {
            ShaderKind::Generic => &mut self.generic,
            ShaderKind::Yuv => &mut self.yuv,
        }
    }
}

/// Renders the remote desktop frame buffer onto a textured quad.
pub struct DesktopController<B: Backend> {
    // Fields drop in declaration order: reverse of creation.
    night_vision_key: KeybindHandle,
    model: B::Model,
    shaders: DesktopShaders<B::Shader>,
    texture: B::Texture,

    uniforms: UniformSlots,
    active: Option<ShaderKind>,
    layout: Option<SourceLayout>,
    pending: Option<FrameBuffer>,
    night_vision: NightVision,
}

impl<B: Backend> DesktopController<B> {
    /// Creates every GPU resource and registers the night-vision hot-key.
    ///
    /// Nothing is returned unless all steps succeed; resources created before
    /// a failure are dropped on the way out.
    pub fn init(
        backend: &B,
        keybinds: &dyn KeybindRegistry,
        alerts: Rc<dyn AlertNotifier>,
        night_vision_key: Hotkey,
    ) -> Result<Self, DesktopError> {
        let texture = backend.create_texture().map_err(|source| {
            error!(error = %source, "failed to initialize the desktop texture");
            DesktopError::init("desktop texture", source)
        })?;

        let generic = Self::build_shader(backend, ShaderKind::Generic)?;
        let yuv = Self::build_shader(backend, ShaderKind::Yuv)?;

        let mut model = backend.create_model().map_err(|source| {
            error!(error = %source, "failed to initialize the desktop model");
            DesktopError::init("desktop model", source)
        })?;
        model.set_default();
        model.set_texture(&texture);

        let night_vision = NightVision::default();
        let handle = keybinds.register(night_vision_key, night_vision.toggle_handler(alerts));
        debug!(key = %night_vision_key, "desktop initialized");

        Ok(Self {
            night_vision_key: handle,
            model,
            shaders: DesktopShaders { generic, yuv },
            texture,
            uniforms: UniformSlots::default(),
            active: None,
            layout: None,
            pending: None,
            night_vision,
        })
    }

    fn build_shader(backend: &B, kind: ShaderKind) -> Result<B::Shader, DesktopError> {
        let resource = match kind {
            ShaderKind::Generic => "generic desktop shader",
            ShaderKind::Yuv => "yuv desktop shader",
        };
        let mut shader = backend.create_shader().map_err(|source| {
            error!(shader = ?kind, error = %source, "failed to initialize desktop shader");
            DesktopError::init(resource, source)
        })?;
        let (vertex, fragment) = compile::sources(kind);
        shader.compile(vertex, fragment).map_err(|source| {
            error!(shader = ?kind, error = %source, "failed to compile desktop shader");
            DesktopError::init(resource, source)
        })?;
        Ok(shader)
    }

    /// Releases the desktop held in `slot`; an empty slot is left untouched.
    pub fn free(slot: &mut Option<Self>) {
        if let Some(desktop) = slot.take() {
            drop(desktop);
            debug!("desktop released");
        }
    }

    /// Records the newest frame and, on a source change, resolves its format.
    ///
    /// An unsupported frame type leaves every piece of state as it was, so the
    /// last valid frame keeps rendering.
    pub fn prepare_update(
        &mut self,
        source_changed: bool,
        format: &FrameFormat,
        data: &FrameBuffer,
    ) -> Result<(), DesktopError> {
        if source_changed {
            let pixel_format = match format.frame_type {
                FrameType::Bgra => PixelFormat::Bgra,
                FrameType::Rgba => PixelFormat::Rgba,
                FrameType::Rgba10 => PixelFormat::Rgba10,
                FrameType::Yuv420 => PixelFormat::Yuv420,
                unsupported @ (FrameType::Invalid | FrameType::Unknown(_)) => {
                    error!(frame_type = %unsupported, "unsupported frame format");
                    return Err(DesktopError::UnsupportedFormat(unsupported));
                }
            };

            self.active = Some(pixel_format.shader_kind());
            self.layout = Some(SourceLayout {
                format: pixel_format,
                width: format.width,
                height: format.height,
                pitch: format.pitch,
            });
            debug!(
                format = %pixel_format,
                width = format.width,
                height = format.height,
                pitch = format.pitch,
                "desktop source changed"
            );
        }

        self.pending = Some(data.clone());
        Ok(())
    }

    /// Applies pending GPU-side changes: texture reconfiguration on a source
    /// change, then the upload of any frame not yet on the GPU.
    pub fn perform_update(&mut self, source_changed: bool) -> Result<(), DesktopError> {
        if source_changed {
            if let Some(kind) = self.active {
                self.uniforms = UniformSlots::resolve(self.shaders.get(kind), kind);
            }

            let Some(layout) = self.layout else {
                error!("desktop texture setup requested before any source format");
                return Err(DesktopError::NoSourceFormat);
            };
            self.texture.setup(&layout, true).map_err(|source| {
                error!(error = %source, "failed to setup the desktop texture");
                DesktopError::TextureSetup(source)
            })?;
        }

        let Some(frame) = self.pending.as_ref() else {
            return Ok(());
        };

        self.texture.update(frame).map_err(|source| {
            error!(error = %source, "failed to update the desktop texture");
            DesktopError::TextureUpload(source)
        })?;
        self.pending = None;
        Ok(())
    }

    /// Feeds one received frame through `prepare_update` and `perform_update`,
    /// deriving the source change from `tracker`.
    ///
    /// Returns whether the frame switched the source. A rejected or
    /// half-applied descriptor is forgotten by the tracker, so the next frame
    /// is resolved from scratch instead of being uploaded into the previous
    /// layout.
    pub fn apply_frame(
        &mut self,
        tracker: &mut FrameTracker,
        format: &FrameFormat,
        data: &FrameBuffer,
    ) -> Result<bool, DesktopError> {
        let changed = tracker.observe(format);

        if let Err(err) = self.prepare_update(changed, format, data) {
            tracker.reset();
            // The previous layout stays active; only retry its pending upload.
            if let Err(retry) = self.perform_update(false) {
                debug!(error = %retry, "pending upload still failing");
            }
            return Err(err);
        }

        if let Err(err) = self.perform_update(changed) {
            if changed {
                tracker.reset();
            }
            return Err(err);
        }
        Ok(changed)
    }

    /// Draws the desktop quad at `(x, y)` scaled by `(scale_x, scale_y)` in
    /// clip space. Does nothing until a format has been resolved.
    pub fn render(&mut self, x: f32, y: f32, scale_x: f32, scale_y: f32) {
        let Some(kind) = self.active else {
            return;
        };

        let shader = self.shaders.get_mut(kind);
        shader.use_program();
        self.uniforms.set(
            shader,
            DesktopUniform::Position,
            UniformValue::Vec4([x, y, scale_x, scale_y]),
        );

        let gain = self.night_vision.gain();
        if gain > 0 {
            self.uniforms
                .set(shader, DesktopUniform::NightVision, UniformValue::Int(1));
            self.uniforms.set(
                shader,
                DesktopUniform::NightVisionGain,
                UniformValue::Float(f32::from(gain)),
            );
        } else {
            self.uniforms
                .set(shader, DesktopUniform::NightVision, UniformValue::Int(0));
        }

        self.model.render();
    }

    pub fn active_shader(&self) -> Option<ShaderKind> {
        self.active
    }

    pub fn source_layout(&self) -> Option<SourceLayout> {
        self.layout
    }

    /// True while a received frame has not been uploaded.
    pub fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    pub fn night_vision_gain(&self) -> u8 {
        self.night_vision.gain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertLevel;
    use crate::error::ResourceError;
    use crate::keybind::Keybinds;
    use std::cell::{Cell, RefCell};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        TextureSetup(SourceLayout, bool),
        TextureUpdate(usize),
        Compile(usize),
        Use(usize),
        Lookup(usize, String),
        SetUniform(usize, UniformLocation, UniformValue),
        ModelDefault,
        ModelTexture,
        ModelRender,
    }

    #[derive(Default)]
    struct Control {
        calls: RefCell<Vec<Call>>,
        shaders_created: Cell<usize>,
        fail_texture_init: Cell<bool>,
        fail_compile: Cell<Option<usize>>,
        fail_setup: Cell<bool>,
        fail_update: Cell<bool>,
        released: Cell<usize>,
        drops: RefCell<Vec<String>>,
    }

    impl Control {
        fn log(&self, call: Call) {
            self.calls.borrow_mut().push(call);
        }

        fn take(&self) -> Vec<Call> {
            std::mem::take(&mut *self.calls.borrow_mut())
        }
    }

    struct Recorder {
        control: Rc<Control>,
    }

    struct MockTexture(Rc<Control>);
    struct MockShader(Rc<Control>, usize);
    struct MockModel(Rc<Control>);

    impl Drop for MockTexture {
        fn drop(&mut self) {
            self.0.released.set(self.0.released.get() + 1);
            self.0.drops.borrow_mut().push("texture".to_string());
        }
    }

    impl Drop for MockShader {
        fn drop(&mut self) {
            self.0.drops.borrow_mut().push(format!("shader{}", self.1));
        }
    }

    impl Drop for MockModel {
        fn drop(&mut self) {
            self.0.drops.borrow_mut().push("model".to_string());
        }
    }

    impl Texture for MockTexture {
        fn setup(&mut self, layout: &SourceLayout, streaming: bool) -> Result<(), ResourceError> {
            self.0.log(Call::TextureSetup(*layout, streaming));
            if self.0.fail_setup.get() {
                return Err(ResourceError::Validation("setup rejected".into()));
            }
            Ok(())
        }

        fn update(&mut self, data: &[u8]) -> Result<(), ResourceError> {
            self.0.log(Call::TextureUpdate(data.len()));
            if self.0.fail_update.get() {
                return Err(ResourceError::NotConfigured);
            }
            Ok(())
        }
    }

    impl ShaderProgram for MockShader {
        fn compile(&mut self, _vertex: &str, _fragment: &str) -> Result<(), ResourceError> {
            self.0.log(Call::Compile(self.1));
            if self.0.fail_compile.get() == Some(self.1) {
                return Err(ResourceError::Compile("syntax error".into()));
            }
            Ok(())
        }

        fn use_program(&mut self) {
            self.0.log(Call::Use(self.1));
        }

        fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
            self.0.log(Call::Lookup(self.1, name.to_string()));
            let index = DesktopUniform::ALL
                .iter()
                .position(|uniform| uniform.name() == name)?;
            // Distinct handles per shader so tests can tell them apart.
            Some(UniformLocation((self.1 as u32) * 10 + index as u32))
        }

        fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
            self.0.log(Call::SetUniform(self.1, location, value));
        }
    }

    impl Model for MockModel {
        type Texture = MockTexture;

        fn set_default(&mut self) {
            self.0.log(Call::ModelDefault);
        }

        fn set_texture(&mut self, _texture: &MockTexture) {
            self.0.log(Call::ModelTexture);
        }

        fn render(&mut self) {
            self.0.log(Call::ModelRender);
        }
    }

    impl Backend for Recorder {
        type Texture = MockTexture;
        type Shader = MockShader;
        type Model = MockModel;

        fn create_texture(&self) -> Result<MockTexture, ResourceError> {
            if self.control.fail_texture_init.get() {
                return Err(ResourceError::OutOfMemory("no room".into()));
            }
            Ok(MockTexture(self.control.clone()))
        }

        fn create_shader(&self) -> Result<MockShader, ResourceError> {
            let id = self.control.shaders_created.get();
            self.control.shaders_created.set(id + 1);
            Ok(MockShader(self.control.clone(), id))
        }

        fn create_model(&self) -> Result<MockModel, ResourceError> {
            Ok(MockModel(self.control.clone()))
        }
    }

    const GENERIC: usize = 0;
    const YUV: usize = 1;

    #[derive(Default)]
    struct Alerts(RefCell<Vec<String>>);

    impl AlertNotifier for Alerts {
        fn post(&self, level: AlertLevel, message: String) {
            assert_eq!(level, AlertLevel::Info);
            self.0.borrow_mut().push(message);
        }
    }

    struct Harness {
        control: Rc<Control>,
        keybinds: Keybinds,
        alerts: Rc<Alerts>,
        desktop: DesktopController<Recorder>,
    }

    fn harness() -> Harness {
        let control = Rc::new(Control::default());
        let backend = Recorder {
            control: control.clone(),
        };
        let keybinds = Keybinds::new();
        let alerts = Rc::new(Alerts::default());
        let desktop =
            DesktopController::init(&backend, &keybinds, alerts.clone(), Hotkey::new('N'))
                .expect("desktop init");
        control.take();
        Harness {
            control,
            keybinds,
            alerts,
            desktop,
        }
    }

    fn frame(len: usize) -> FrameBuffer {
        vec![0u8; len].into()
    }

    fn rgba_1080p() -> FrameFormat {
        FrameFormat::new(FrameType::Rgba, 1920, 1080, 7680)
    }

    fn yuv_720p() -> FrameFormat {
        FrameFormat::new(FrameType::Yuv420, 1280, 720, 1280)
    }

    #[test]
    fn init_compiles_both_shaders_and_binds_model() {
        let control = Rc::new(Control::default());
        let backend = Recorder {
            control: control.clone(),
        };
        let keybinds = Keybinds::new();
        let desktop = DesktopController::init(
            &backend,
            &keybinds,
            Rc::new(Alerts::default()),
            Hotkey::new('N'),
        )
        .expect("desktop init");

        assert_eq!(
            control.take(),
            vec![
                Call::Compile(GENERIC),
                Call::Compile(YUV),
                Call::ModelDefault,
                Call::ModelTexture
            ]
        );
        assert!(keybinds.is_bound(Hotkey::new('N')));
        assert_eq!(desktop.active_shader(), None);
        assert!(!desktop.is_dirty());
        assert_eq!(desktop.night_vision_gain(), 0);
    }

    #[test]
    fn init_reports_out_of_memory_as_allocation_failure() {
        let control = Rc::new(Control::default());
        control.fail_texture_init.set(true);
        let backend = Recorder { control };
        let keybinds = Keybinds::new();

        let result = DesktopController::init(
            &backend,
            &keybinds,
            Rc::new(Alerts::default()),
            Hotkey::new('N'),
        );
        assert!(matches!(result, Err(DesktopError::Allocation { .. })));
        assert!(keybinds.is_empty());
    }

    #[test]
    fn init_fails_without_partial_state_when_yuv_shader_does_not_compile() {
        let control = Rc::new(Control::default());
        control.fail_compile.set(Some(YUV));
        let backend = Recorder {
            control: control.clone(),
        };
        let keybinds = Keybinds::new();

        let result = DesktopController::init(
            &backend,
            &keybinds,
            Rc::new(Alerts::default()),
            Hotkey::new('N'),
        );
        match result {
            Err(DesktopError::ResourceInit { resource, .. }) => {
                assert_eq!(resource, "yuv desktop shader")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("init should fail"),
        }
        assert!(keybinds.is_empty());
        assert_eq!(control.released.get(), 1);
    }

    #[test]
    fn free_releases_resources_and_keybind() {
        let Harness {
            control,
            keybinds,
            desktop,
            ..
        } = harness();
        let mut slot = Some(desktop);
        DesktopController::free(&mut slot);
        assert!(slot.is_none());
        assert!(keybinds.is_empty());
        assert_eq!(control.released.get(), 1);
        assert_eq!(
            *control.drops.borrow(),
            vec![
                "model".to_string(),
                format!("shader{YUV}"),
                format!("shader{GENERIC}"),
                "texture".to_string(),
            ]
        );

        DesktopController::free(&mut slot);
        assert_eq!(control.released.get(), 1);
        assert_eq!(control.drops.borrow().len(), 4);
    }

    #[test]
    fn packed_formats_select_generic_shader() {
        let mut h = harness();
        for (frame_type, expected) in [
            (FrameType::Bgra, PixelFormat::Bgra),
            (FrameType::Rgba, PixelFormat::Rgba),
            (FrameType::Rgba10, PixelFormat::Rgba10),
        ] {
            let format = FrameFormat::new(frame_type, 64, 32, 256);
            h.desktop
                .prepare_update(true, &format, &frame(256 * 32))
                .expect("supported format");
            assert_eq!(h.desktop.active_shader(), Some(ShaderKind::Generic));
            assert_eq!(h.desktop.source_layout().map(|l| l.format), Some(expected));
        }
        assert!(h.control.take().is_empty(), "prepare must not touch the GPU");
    }

    #[test]
    fn rgba_source_change_configures_texture_and_clears_dirty() {
        let mut h = harness();
        h.desktop
            .prepare_update(true, &rgba_1080p(), &frame(7680 * 1080))
            .expect("prepare");
        assert_eq!(h.desktop.active_shader(), Some(ShaderKind::Generic));
        assert!(h.desktop.is_dirty());

        h.desktop.perform_update(true).expect("perform");
        assert!(!h.desktop.is_dirty());

        let layout = SourceLayout {
            format: PixelFormat::Rgba,
            width: 1920,
            height: 1080,
            pitch: 7680,
        };
        assert_eq!(
            h.control.take(),
            vec![
                Call::Lookup(GENERIC, "position".into()),
                Call::Lookup(GENERIC, "nv".into()),
                Call::Lookup(GENERIC, "nvGain".into()),
                Call::TextureSetup(layout, true),
                Call::TextureUpdate(7680 * 1080),
            ]
        );
    }

    #[test]
    fn render_sets_position_and_disables_night_vision_at_gain_zero() {
        let mut h = harness();
        h.desktop
            .prepare_update(true, &rgba_1080p(), &frame(16))
            .unwrap();
        h.desktop.perform_update(true).unwrap();
        h.control.take();

        h.desktop.render(-1.0, -1.0, 2.0, 2.0);
        assert_eq!(
            h.control.take(),
            vec![
                Call::Use(GENERIC),
                Call::SetUniform(
                    GENERIC,
                    UniformLocation(0),
                    UniformValue::Vec4([-1.0, -1.0, 2.0, 2.0])
                ),
                Call::SetUniform(GENERIC, UniformLocation(1), UniformValue::Int(0)),
                Call::ModelRender,
            ]
        );
    }

    #[test]
    fn render_enables_night_vision_with_gain() {
        let mut h = harness();
        h.desktop
            .prepare_update(true, &rgba_1080p(), &frame(16))
            .unwrap();
        h.desktop.perform_update(true).unwrap();
        h.keybinds.dispatch(Hotkey::new('N'));
        h.keybinds.dispatch(Hotkey::new('N'));
        h.control.take();

        h.desktop.render(0.0, 0.0, 1.0, 1.0);
        let calls = h.control.take();
        assert!(calls.contains(&Call::SetUniform(
            GENERIC,
            UniformLocation(1),
            UniformValue::Int(1)
        )));
        assert!(calls.contains(&Call::SetUniform(
            GENERIC,
            UniformLocation(2),
            UniformValue::Float(2.0)
        )));
        assert_eq!(calls.last(), Some(&Call::ModelRender));
    }

    #[test]
    fn toggling_three_times_posts_expected_alerts() {
        let h = harness();
        for _ in 0..3 {
            assert_eq!(h.keybinds.dispatch(Hotkey::new('N')), 1);
        }
        assert_eq!(h.desktop.night_vision_gain(), 3);
        assert_eq!(
            *h.alerts.0.borrow(),
            vec![
                "Night vision enabled",
                "Night vision gain level 1",
                "Night vision gain level 2"
            ]
        );

        h.keybinds.dispatch(Hotkey::new('N'));
        assert_eq!(h.desktop.night_vision_gain(), 0);
        assert_eq!(
            h.alerts.0.borrow().last().map(String::as_str),
            Some("Night vision disabled")
        );
    }

    #[test]
    fn yuv_source_switches_shader_and_resolves_its_uniforms() {
        let mut h = harness();
        h.desktop
            .prepare_update(true, &rgba_1080p(), &frame(16))
            .unwrap();
        h.desktop.perform_update(true).unwrap();

        h.desktop
            .prepare_update(true, &yuv_720p(), &frame(1280 * 720 * 3 / 2))
            .unwrap();
        assert_eq!(h.desktop.active_shader(), Some(ShaderKind::Yuv));
        assert_eq!(
            h.desktop.source_layout().map(|l| l.format),
            Some(PixelFormat::Yuv420)
        );
        h.desktop.perform_update(true).unwrap();
        h.control.take();

        h.desktop.render(-1.0, -1.0, 2.0, 2.0);
        let calls = h.control.take();
        assert_eq!(calls.first(), Some(&Call::Use(YUV)));
        assert!(calls.contains(&Call::SetUniform(
            YUV,
            UniformLocation(10),
            UniformValue::Vec4([-1.0, -1.0, 2.0, 2.0])
        )));
    }

    #[test]
    fn unsupported_format_leaves_state_untouched() {
        let mut h = harness();
        h.desktop
            .prepare_update(true, &yuv_720p(), &frame(16))
            .unwrap();
        h.desktop.perform_update(true).unwrap();
        let layout = h.desktop.source_layout();

        let bogus = FrameFormat::new(FrameType::from(99), 640, 480, 2560);
        let err = h
            .desktop
            .prepare_update(true, &bogus, &frame(8))
            .expect_err("tag 99 is unsupported");
        assert!(matches!(
            err,
            DesktopError::UnsupportedFormat(FrameType::Unknown(99))
        ));
        assert!(err.is_recoverable());
        assert_eq!(h.desktop.source_layout(), layout);
        assert_eq!(h.desktop.active_shader(), Some(ShaderKind::Yuv));
        assert!(!h.desktop.is_dirty());

        let invalid = FrameFormat::new(FrameType::Invalid, 640, 480, 2560);
        assert!(h.desktop.prepare_update(true, &invalid, &frame(8)).is_err());
        assert_eq!(h.desktop.active_shader(), Some(ShaderKind::Yuv));
    }

    #[test]
    fn unsupported_first_frame_keeps_shader_unselected() {
        let mut h = harness();
        let bogus = FrameFormat::new(FrameType::Unknown(7), 8, 8, 32);
        assert!(h.desktop.prepare_update(true, &bogus, &frame(8)).is_err());
        assert_eq!(h.desktop.active_shader(), None);
        assert_eq!(h.desktop.source_layout(), None);
    }

    #[test]
    fn perform_without_dirty_frame_is_a_no_op() {
        let mut h = harness();
        h.desktop.perform_update(false).expect("no-op");
        assert!(h.control.take().is_empty());

        h.desktop
            .prepare_update(true, &rgba_1080p(), &frame(16))
            .unwrap();
        h.desktop.perform_update(true).unwrap();
        h.control.take();
        h.desktop.perform_update(false).expect("no-op");
        assert!(h.control.take().is_empty());
    }

    #[test]
    fn unchanged_source_only_uploads() {
        let mut h = harness();
        h.desktop
            .prepare_update(true, &rgba_1080p(), &frame(16))
            .unwrap();
        h.desktop.perform_update(true).unwrap();
        h.control.take();

        let different = FrameFormat::new(FrameType::Yuv420, 2, 2, 2);
        h.desktop
            .prepare_update(false, &different, &frame(32))
            .unwrap();
        assert_eq!(h.desktop.active_shader(), Some(ShaderKind::Generic));
        assert_eq!(h.desktop.source_layout().map(|l| l.width), Some(1920));
        h.desktop.perform_update(false).unwrap();
        assert_eq!(h.control.take(), vec![Call::TextureUpdate(32)]);
    }

    #[test]
    fn failed_upload_keeps_frame_for_retry() {
        let mut h = harness();
        h.desktop
            .prepare_update(true, &rgba_1080p(), &frame(16))
            .unwrap();
        h.control.fail_update.set(true);

        let err = h.desktop.perform_update(true).expect_err("upload fails");
        assert!(matches!(err, DesktopError::TextureUpload(_)));
        assert!(h.desktop.is_dirty());

        h.control.fail_update.set(false);
        h.control.take();
        h.desktop.perform_update(false).expect("retry succeeds");
        assert!(!h.desktop.is_dirty());
        assert_eq!(h.control.take(), vec![Call::TextureUpdate(16)]);
    }

    #[test]
    fn failed_setup_aborts_before_upload() {
        let mut h = harness();
        h.desktop
            .prepare_update(true, &rgba_1080p(), &frame(16))
            .unwrap();
        h.control.fail_setup.set(true);

        let err = h.desktop.perform_update(true).expect_err("setup fails");
        assert!(matches!(err, DesktopError::TextureSetup(_)));
        assert!(h.desktop.is_dirty());
        assert!(!h
            .control
            .take()
            .iter()
            .any(|call| matches!(call, Call::TextureUpdate(_))));
    }

    #[test]
    fn source_change_before_any_format_is_reported() {
        let mut h = harness();
        let err = h.desktop.perform_update(true).expect_err("nothing resolved");
        assert!(matches!(err, DesktopError::NoSourceFormat));
    }

    #[test]
    fn render_before_format_resolution_draws_nothing() {
        let mut h = harness();
        h.desktop.render(-1.0, -1.0, 2.0, 2.0);
        assert!(h.control.take().is_empty());

        let bogus = FrameFormat::new(FrameType::Invalid, 8, 8, 32);
        let _ = h.desktop.prepare_update(true, &bogus, &frame(8));
        h.desktop.render(-1.0, -1.0, 2.0, 2.0);
        assert!(h.control.take().is_empty());
    }

    #[test]
    fn apply_frame_reports_source_changes_once() {
        let mut h = harness();
        let mut tracker = FrameTracker::new();

        let changed = h
            .desktop
            .apply_frame(&mut tracker, &rgba_1080p(), &frame(7680 * 1080))
            .expect("first frame");
        assert!(changed);
        let changed = h
            .desktop
            .apply_frame(&mut tracker, &rgba_1080p(), &frame(7680 * 1080))
            .expect("same source");
        assert!(!changed);
        assert_eq!(
            h.control
                .take()
                .iter()
                .filter(|call| matches!(call, Call::TextureSetup(..)))
                .count(),
            1
        );
    }

    #[test]
    fn repeated_unsupported_frames_never_reach_the_texture() {
        let mut h = harness();
        let mut tracker = FrameTracker::new();
        h.desktop
            .apply_frame(&mut tracker, &rgba_1080p(), &frame(7680 * 1080))
            .expect("valid source");
        h.control.take();

        let unknown = FrameFormat::new(FrameType::Unknown(9), 640, 480, 2560);
        for _ in 0..2 {
            let err = h
                .desktop
                .apply_frame(&mut tracker, &unknown, &frame(2560 * 480))
                .expect_err("unsupported");
            assert!(matches!(err, DesktopError::UnsupportedFormat(FrameType::Unknown(9))));
        }

        assert!(h.control.take().is_empty(), "no GPU work for rejected frames");
        assert!(!h.desktop.is_dirty());
        assert_eq!(h.desktop.active_shader(), Some(ShaderKind::Generic));
        assert_eq!(
            h.desktop.source_layout().map(|layout| (layout.width, layout.height)),
            Some((1920, 1080))
        );

        let changed = h
            .desktop
            .apply_frame(&mut tracker, &rgba_1080p(), &frame(7680 * 1080))
            .expect("valid source again");
        assert!(changed);
        let calls = h.control.take();
        assert!(matches!(calls.last(), Some(Call::TextureUpdate(len)) if *len == 7680 * 1080));
    }

    #[test]
    fn failed_setup_is_retried_on_the_next_frame() {
        let mut h = harness();
        let mut tracker = FrameTracker::new();
        h.control.fail_setup.set(true);
        h.desktop
            .apply_frame(&mut tracker, &yuv_720p(), &frame(16))
            .expect_err("setup fails");

        h.control.fail_setup.set(false);
        h.control.take();
        let changed = h
            .desktop
            .apply_frame(&mut tracker, &yuv_720p(), &frame(16))
            .expect("setup retried");
        assert!(changed);
        assert!(h
            .control
            .take()
            .iter()
            .any(|call| matches!(call, Call::TextureSetup(..))));
    }
}
