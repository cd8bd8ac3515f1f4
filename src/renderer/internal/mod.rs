pub mod buffers;
pub mod context;
pub mod pipeline;

pub use context::WgpuContext;
