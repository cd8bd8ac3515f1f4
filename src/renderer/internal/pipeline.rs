use std::collections::HashMap;

use crate::renderer::context::{
    BlendEquation, BlendFactor, CompareFunction, Face, FilterMode, ProgramId, WrapMode, Winding,
};
use crate::renderer::depth::Depth;
use crate::renderer::pipeline_builder::PipelineBuilder;
use crate::renderer::recording::DeviceState;
use crate::renderer::Vertex;

/// Geometry source of a draw; each needs its own vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum GeometryKind {
    Indexed,
    Procedural,
}

/// Everything fixed-function that a wgpu pipeline bakes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub(crate) program: ProgramId,
    pub(crate) geometry: GeometryKind,
    pub(crate) color_format: wgpu::TextureFormat,
    pub(crate) cull_mode: Option<Face>,
    pub(crate) front_face: Winding,
    pub(crate) depth_compare: Option<CompareFunction>,
    pub(crate) depth_write: bool,
    pub(crate) blend: Option<(BlendEquation, BlendFactor, BlendFactor)>,
    pub(crate) color_mask: [bool; 4],
}

impl PipelineKey {
    pub(crate) fn from_state(
        state: &DeviceState,
        program: ProgramId,
        geometry: GeometryKind,
        color_format: wgpu::TextureFormat,
    ) -> Self {
        let (source, destination) = state.blend_factors;
        Self {
            program,
            geometry,
            color_format,
            cull_mode: state.face_culling.then_some(state.cull_face),
            front_face: state.front_face,
            depth_compare: state.depth_test.then_some(state.depth_function),
            // GL never writes depth with the test disabled
            depth_write: state.depth_test && state.depth_mask,
            blend: state
                .blending
                .then_some((state.blend_equation, source, destination)),
            color_mask: state.color_mask,
        }
    }

    /// Constant color only matters for the CONSTANT_COLOR factors.
    pub(crate) fn uses_blend_constant(&self) -> bool {
        self.blend.is_some_and(|(_, src, dst)| {
            [src, dst].iter().any(|f| {
                matches!(
                    f,
                    BlendFactor::ConstantColor | BlendFactor::OneMinusConstantColor
                )
            })
        })
    }
}

pub(crate) struct ProgramModules {
    pub(crate) label: String,
    pub(crate) vertex: wgpu::ShaderModule,
    pub(crate) fragment: wgpu::ShaderModule,
}

/// Pipelines built on first use and kept for the device's lifetime.
#[derive(Default)]
pub(crate) struct PipelineCache {
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub(crate) fn prepare(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        program: &ProgramModules,
        key: PipelineKey,
    ) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        log::debug!("Building pipeline for {} ({:?})", program.label, key);

        let mut builder = PipelineBuilder::new(device, layout, &program.vertex, &program.fragment)
            .with_label(&program.label)
            .with_color_target(
                key.color_format,
                key.blend.map(|(equation, src, dst)| blend_state(equation, src, dst)),
                color_writes(key.color_mask),
            )
            .with_depth_stencil(
                Depth::FORMAT,
                key.depth_write,
                key.depth_compare
                    .map(compare_function)
                    .unwrap_or(wgpu::CompareFunction::Always),
            )
            .with_culling(cull_mode(key.cull_mode), front_face(key.front_face));
        if key.geometry == GeometryKind::Indexed {
            builder = builder.with_vertex_buffer(Vertex::layout());
        }
        self.pipelines.insert(key, builder.build());
    }

    pub(crate) fn get(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    pub(crate) fn forget_program(&mut self, program: ProgramId) {
        self.pipelines.retain(|key, _| key.program != program);
    }

    pub(crate) fn len(&self) -> usize {
        self.pipelines.len()
    }
}

pub(crate) fn compare_function(function: CompareFunction) -> wgpu::CompareFunction {
    match function {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

/// Culling both faces draws nothing; the caller skips those draws.
pub(crate) fn cull_mode(face: Option<Face>) -> Option<wgpu::Face> {
    match face {
        Some(Face::Front) => Some(wgpu::Face::Front),
        Some(Face::Back) => Some(wgpu::Face::Back),
        Some(Face::FrontAndBack) | None => None,
    }
}

pub(crate) fn front_face(winding: Winding) -> wgpu::FrontFace {
    match winding {
        Winding::CounterClockwise => wgpu::FrontFace::Ccw,
        Winding::Clockwise => wgpu::FrontFace::Cw,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::ConstantColor => wgpu::BlendFactor::Constant,
        BlendFactor::OneMinusConstantColor => wgpu::BlendFactor::OneMinusConstant,
    }
}

pub(crate) fn blend_state(
    equation: BlendEquation,
    source: BlendFactor,
    destination: BlendFactor,
) -> wgpu::BlendState {
    // MIN and MAX ignore the factors and wgpu requires them to be One
    let (operation, src, dst) = match equation {
        BlendEquation::Add => (wgpu::BlendOperation::Add, source, destination),
        BlendEquation::Subtract => (wgpu::BlendOperation::Subtract, source, destination),
        BlendEquation::ReverseSubtract => {
            (wgpu::BlendOperation::ReverseSubtract, source, destination)
        }
        BlendEquation::Min => (wgpu::BlendOperation::Min, BlendFactor::One, BlendFactor::One),
        BlendEquation::Max => (wgpu::BlendOperation::Max, BlendFactor::One, BlendFactor::One),
    };
    let component = wgpu::BlendComponent {
        src_factor: blend_factor(src),
        dst_factor: blend_factor(dst),
        operation,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

pub(crate) fn color_writes(mask: [bool; 4]) -> wgpu::ColorWrites {
    let channels = [
        wgpu::ColorWrites::RED,
        wgpu::ColorWrites::GREEN,
        wgpu::ColorWrites::BLUE,
        wgpu::ColorWrites::ALPHA,
    ];
    channels
        .into_iter()
        .zip(mask)
        .filter(|(_, enabled)| *enabled)
        .fold(wgpu::ColorWrites::empty(), |acc, (channel, _)| acc | channel)
}

pub(crate) fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

pub(crate) fn address_mode(mode: WrapMode) -> wgpu::AddressMode {
    match mode {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_drops_disabled_capabilities() {
        let mut state = DeviceState::default();
        state.cull_face = Face::Front;
        state.depth_mask = true;
        let key = PipelineKey::from_state(
            &state,
            ProgramId(1),
            GeometryKind::Indexed,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        assert_eq!(key.cull_mode, None);
        assert_eq!(key.depth_compare, None);
        assert!(!key.depth_write);
        assert_eq!(key.blend, None);

        state.face_culling = true;
        state.depth_test = true;
        let key = PipelineKey::from_state(
            &state,
            ProgramId(1),
            GeometryKind::Indexed,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        assert_eq!(key.cull_mode, Some(Face::Front));
        assert!(key.depth_write);
    }

    #[test]
    fn color_mask_maps_per_channel() {
        assert_eq!(color_writes([true; 4]), wgpu::ColorWrites::ALL);
        assert_eq!(
            color_writes([true, false, true, false]),
            wgpu::ColorWrites::RED | wgpu::ColorWrites::BLUE
        );
    }

    #[test]
    fn min_max_blend_use_unit_factors() {
        let state = blend_state(BlendEquation::Max, BlendFactor::SrcAlpha, BlendFactor::Zero);
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(state.color.dst_factor, wgpu::BlendFactor::One);
        assert_eq!(state.color.operation, wgpu::BlendOperation::Max);
    }
}
