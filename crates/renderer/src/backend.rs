//! Capabilities the desktop controller consumes.
//!
//! Each GPU object is a trait so the controller can be driven by the wgpu
//! implementation in [`crate::gpu`] or by a recording double in tests. Creating
//! a resource through [`Backend`] is its initialisation; dropping it releases it.

use crate::error::ResourceError;
use crate::types::SourceLayout;

/// Handle returned by [`ShaderProgram::uniform_location`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Value written into a uniform slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec4([f32; 4]),
}

pub trait Texture {
    /// (Re)configures storage for the given layout. `streaming` textures are
    /// rewritten every frame.
    fn setup(&mut self, layout: &SourceLayout, streaming: bool) -> Result<(), ResourceError>;

    /// Uploads a complete frame laid out as described by the last `setup`.
    fn update(&mut self, data: &[u8]) -> Result<(), ResourceError>;
}

pub trait ShaderProgram {
    fn compile(&mut self, vertex: &str, fragment: &str) -> Result<(), ResourceError>;

    /// Makes this program the target of subsequent uniform writes and draws.
    fn use_program(&mut self);

    /// Resolves a uniform by name; `None` when the program does not declare it.
    fn uniform_location(&self, name: &str) -> Option<UniformLocation>;

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);
}

pub trait Model {
    type Texture: Texture;

    /// Loads the unit quad spanning `(0, 0)..(1, 1)`.
    fn set_default(&mut self);

    fn set_texture(&mut self, texture: &Self::Texture);

    /// Draws with whichever program was last activated.
    fn render(&mut self);
}

/// Factory for the resources owned by one desktop controller.
pub trait Backend {
    type Texture: Texture;
    type Shader: ShaderProgram;
    type Model: Model<Texture = Self::Texture>;

    fn create_texture(&self) -> Result<Self::Texture, ResourceError>;
    fn create_shader(&self) -> Result<Self::Shader, ResourceError>;
    fn create_model(&self) -> Result<Self::Model, ResourceError>;
}
