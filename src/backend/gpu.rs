use bytemuck::{Pod, Zeroable};
use cgmath::{Point3, Vector3};
use log::debug;
use pollster::FutureExt;
use wgpu::util::DeviceExt;

use crate::backend::{BackendError, StepBackend, StepConfig, StepOutcome, finish_step};
use crate::body::Body;
use crate::constants::GRID_SIDE;
use crate::integrator::Integrator;

const TEXEL_SIZE: u64 = std::mem::size_of::<[f32; 4]>() as u64;
const WORKGROUP_SIZE: u32 = 64;
/// Sentinel for "no body excluded" in the kernel.
const NO_SKIP: u32 = u32::MAX;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Params {
    dt: f32,
    g: f32,
    softening: f32,
    count: u32,
    skip: u32,
    _pad: [u32; 3],
}

/// Double-buffered position/velocity grids. `front` holds the state
/// uploaded for the current step; the kernel writes into the back pair
/// and the roles swap afterwards.
struct PingPong {
    pos: [wgpu::Buffer; 2],
    vel: [wgpu::Buffer; 2],
    front: usize,
}

impl PingPong {
    fn flip(&mut self) {
        self.front = 1 - self.front;
    }
}

/// Data-parallel Euler step on the GPU: one texel per body in a fixed
/// square grid, two compute passes (velocity, then position) over
/// ping-ponged vec4 buffers. Collision resolution and energy stay on
/// the host; the device only integrates. Construction probes adapter,
/// device and shader support and fails with `Unsupported`/`Gpu` when
/// anything is missing, so callers can fall back.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    vel_pipeline: wgpu::ComputePipeline,
    pos_pipeline: wgpu::ComputePipeline,
    bind_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    buffers: PingPong,
    staging_pos: wgpu::Buffer,
    staging_vel: wgpu::Buffer,
    capacity: usize,
    result: Option<StepOutcome>,
}

impl GpuBackend {
    /// Backend with the default 32x32 grid (1024 bodies).
    pub fn new() -> Result<Self, BackendError> {
        Self::with_grid_side(GRID_SIDE)
    }

    /// Backend with a `side * side` body grid. Tests use tiny grids to
    /// exercise the capacity boundary.
    pub fn with_grid_side(side: usize) -> Result<Self, BackendError> {
        let capacity = side * side;
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .block_on()
            .map_err(|_| BackendError::Unsupported("no gpu adapter"))?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .block_on()
            .map_err(|e| BackendError::Gpu(e.to_string()))?;

        // Shader compile or pipeline link failures surface here, not
        // as a dead device later.
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gravsim step kernel"),
            source: wgpu::ShaderSource::Wgsl(include_str!("step.wgsl").into()),
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gravsim step bindings"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let pipeline = |entry: &'static str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        let vel_pipeline = pipeline("vel_pass");
        let pos_pipeline = pipeline("pos_pass");

        if let Some(error) = device.pop_error_scope().block_on() {
            return Err(BackendError::Gpu(error.to_string()));
        }

        let grid = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: capacity as u64 * TEXEL_SIZE,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let staging = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: capacity as u64 * TEXEL_SIZE,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        let buffers = PingPong {
            pos: [grid("pos a"), grid("pos b")],
            vel: [grid("vel a"), grid("vel b")],
            front: 0,
        };
        let staging_pos = staging("pos staging");
        let staging_vel = staging("vel staging");

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("step params"),
            contents: bytemuck::bytes_of(&Params::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        debug!("gpu backend ready, capacity {capacity}");
        Ok(Self {
            device,
            queue,
            vel_pipeline,
            pos_pipeline,
            bind_layout,
            params_buffer,
            buffers,
            staging_pos,
            staging_vel,
            capacity,
            result: None,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn bind_group(&self, in_a: &wgpu::Buffer, in_b: &wgpu::Buffer, out: &wgpu::Buffer) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &self.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: in_a.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: in_b.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
        })
    }

    /// Blocking read of the first `len` texels of a readback buffer.
    fn read_staging(&self, buffer: &wgpu::Buffer, len: usize) -> Result<Vec<[f32; 4]>, BackendError> {
        let slice = buffer.slice(..len as u64 * TEXEL_SIZE);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| BackendError::Gpu(e.to_string()))?;
        rx.block_on()
            .map_err(|_| BackendError::Gpu("map callback lost".into()))?
            .map_err(|e| BackendError::Gpu(e.to_string()))?;

        let view = slice.get_mapped_range();
        let data = bytemuck::cast_slice::<u8, [f32; 4]>(&view).to_vec();
        drop(view);
        buffer.unmap();
        Ok(data)
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl StepBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu-parallel"
    }

    fn ready(&mut self) -> bool {
        self.result.is_none()
    }

    fn begin_step(&mut self, bodies: Vec<Body>, config: StepConfig) -> Result<(), BackendError> {
        if self.result.is_some() {
            return Err(BackendError::Busy);
        }
        if config.integrator != Integrator::Euler {
            return Err(BackendError::Unsupported("gpu backend is euler-only"));
        }
        let count = bodies.len();
        if count > self.capacity {
            return Err(BackendError::Capacity {
                count,
                capacity: self.capacity,
            });
        }
        if count == 0 {
            self.result = Some(finish_step(bodies, &config));
            return Ok(());
        }

        // Upload host state into the front pair.
        let positions: Vec<[f32; 4]> = bodies
            .iter()
            .map(|b| [b.pos.x as f32, b.pos.y as f32, b.pos.z as f32, b.mass as f32])
            .collect();
        let velocities: Vec<[f32; 4]> = bodies
            .iter()
            .map(|b| [b.vel.x as f32, b.vel.y as f32, b.vel.z as f32, 0.0])
            .collect();

        let front = self.buffers.front;
        let back = 1 - front;
        self.queue.write_buffer(
            &self.buffers.pos[front],
            0,
            bytemuck::cast_slice(&positions),
        );
        self.queue.write_buffer(
            &self.buffers.vel[front],
            0,
            bytemuck::cast_slice(&velocities),
        );

        let params = Params {
            dt: config.dt as f32,
            g: config.g as f32,
            softening: config.softening as f32,
            count: count as u32,
            skip: config.excluded.map_or(NO_SKIP, |i| i as u32),
            _pad: [0; 3],
        };
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        // Pass 1: old position + old velocity -> new velocity.
        // Pass 2: old position + new velocity -> new position.
        let vel_bind = self.bind_group(
            &self.buffers.pos[front],
            &self.buffers.vel[front],
            &self.buffers.vel[back],
        );
        let pos_bind = self.bind_group(
            &self.buffers.pos[front],
            &self.buffers.vel[back],
            &self.buffers.pos[back],
        );

        let groups = (count as u32).div_ceil(WORKGROUP_SIZE);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
            pass.set_pipeline(&self.vel_pipeline);
            pass.set_bind_group(0, &vel_bind, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
            pass.set_pipeline(&self.pos_pipeline);
            pass.set_bind_group(0, &pos_bind, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }

        let byte_len = count as u64 * TEXEL_SIZE;
        encoder.copy_buffer_to_buffer(&self.buffers.pos[back], 0, &self.staging_pos, 0, byte_len);
        encoder.copy_buffer_to_buffer(&self.buffers.vel[back], 0, &self.staging_vel, 0, byte_len);
        self.queue.submit(Some(encoder.finish()));

        let new_positions = self.read_staging(&self.staging_pos, count)?;
        let new_velocities = self.read_staging(&self.staging_vel, count)?;
        self.buffers.flip();

        // Rebuild host records. Mass stays the untouched f64 input;
        // the kernel never changes it.
        let integrated: Vec<Body> = bodies
            .iter()
            .zip(new_positions.iter().zip(new_velocities.iter()))
            .map(|(body, (p, v))| Body {
                pos: Point3::new(p[0] as f64, p[1] as f64, p[2] as f64),
                vel: Vector3::new(v[0] as f64, v[1] as f64, v[2] as f64),
                mass: body.mass,
            })
            .collect();

        // Collisions and energy are host-side post-processes.
        self.result = Some(finish_step(integrated, &config));
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<StepOutcome>, BackendError> {
        Ok(self.result.take())
    }
}
