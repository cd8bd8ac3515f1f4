use std::mem;
use std::num::NonZeroU64;

use crate::renderer::uniforms::DrawUniforms;

const INITIAL_DRAW_CAPACITY: u32 = 256;

/// One `DrawUniforms` block per draw, addressed with a dynamic offset.
pub(crate) struct DynamicUniformBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) capacity: u32,
    pub(crate) stride: u32,
    pub(crate) bind_group: wgpu::BindGroup,
    pub(crate) bind_layout: wgpu::BindGroupLayout,
    scratch: Vec<u8>,
}

impl DynamicUniformBuffer {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let alignment = device.limits().min_uniform_buffer_offset_alignment;
        let stride = aligned_stride(mem::size_of::<DrawUniforms>() as u32, alignment);

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("DrawUniformsBindLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(mem::size_of::<DrawUniforms>() as u64),
                },
                count: None,
            }],
        });

        let capacity = INITIAL_DRAW_CAPACITY;
        let (buffer, bind_group) = Self::allocate(device, &bind_layout, capacity, stride);

        Self {
            buffer,
            capacity,
            stride,
            bind_group,
            bind_layout,
            scratch: Vec::with_capacity((capacity * stride) as usize),
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        capacity: u32,
        stride: u32,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("DrawUniformsBuffer"),
            size: capacity as u64 * stride as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("DrawUniformsBindGroup"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(mem::size_of::<DrawUniforms>() as u64),
                }),
            }],
        });
        (buffer, bind_group)
    }

    /// Appends a block and returns its dynamic offset.
    pub(crate) fn push(&mut self, uniforms: &DrawUniforms) -> u32 {
        let offset = self.scratch.len() as u32;
        self.scratch.extend_from_slice(bytemuck::bytes_of(uniforms));
        self.scratch.resize((offset + self.stride) as usize, 0);
        offset
    }

    pub(crate) fn len(&self) -> u32 {
        self.scratch.len() as u32 / self.stride
    }

    pub(crate) fn flush(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let required = self.len();
        if required > self.capacity {
            self.grow(device, required);
        }
        if !self.scratch.is_empty() {
            queue.write_buffer(&self.buffer, 0, &self.scratch);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.scratch.clear();
    }

    fn grow(&mut self, device: &wgpu::Device, required: u32) {
        let new_capacity = required.max(self.capacity * 2).max(1);
        log::info!(
            "Growing draw uniforms buffer: {} -> {}",
            self.capacity,
            new_capacity
        );
        let (buffer, bind_group) =
            Self::allocate(device, &self.bind_layout, new_capacity, self.stride);
        self.buffer = buffer;
        self.bind_group = bind_group;
        self.capacity = new_capacity;
    }
}

pub(crate) fn aligned_stride(size: u32, alignment: u32) -> u32 {
    let alignment = alignment.max(1);
    size.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_rounds_up_to_alignment() {
        assert_eq!(aligned_stride(2352, 256), 2560);
        assert_eq!(aligned_stride(256, 256), 256);
        assert_eq!(aligned_stride(10, 0), 10);
    }
}
