pub mod command;
pub mod context;
pub mod depth;
pub mod forward;
pub mod internal;
pub mod lights;
pub mod material;
pub mod pipeline_builder;
pub mod pipeline_state;
pub mod primitives;
pub mod recording;
pub mod shaders;
pub mod texture;
pub mod uniforms;
pub mod vertex;

pub use context::GraphicsContext;
pub use depth::Depth;
pub use forward::{CompositeEffect, ForwardRenderer, FrameOutcome, FrameStats, RenderError};
pub use internal::WgpuContext;
pub use lights::{Light, LightKind, MAX_LIGHTS};
pub use material::{Material, MaterialError, MaterialKind};
pub use pipeline_state::PipelineState;
pub use primitives::{cube_mesh, plane_mesh, sphere_mesh};
pub use recording::RecordingContext;
pub use vertex::Vertex;
