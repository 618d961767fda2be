//! Sparse voxel octree construction and GPU upload.

use ash::vk;
use glam::UVec3;
use gpu_allocator::MemoryLocation;
use voxen_gpu::command::ImmediateSubmit;
use voxen_gpu::error::Result;
use voxen_gpu::memory::{GpuAllocator, GpuBuffer};

/// Voxel grid resolution per axis.
pub const GRID_SIZE: u32 = 32;

/// Octree levels covering the grid (2^5 = 32).
pub const OCTREE_DEPTH: u32 = 5;

/// One octree node, 8 bytes, as consumed by the compute shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Voxel {
    /// Palette index; meaningful on leaves only.
    pub color: u32,
    /// Index of the first of this node's 8 children.
    pub child_pointer: u16,
    /// Which children exist.
    pub valid_mask: u8,
    /// Which children are leaves.
    pub leaf_mask: u8,
}

impl Voxel {
    pub const EMPTY: Self = Self {
        color: 0,
        child_pointer: 0,
        valid_mask: 0,
        leaf_mask: 0,
    };
}

/// CPU-side sparse voxel octree over a [`GRID_SIZE`]³ grid.
pub struct VoxelOctree {
    nodes: Vec<Voxel>,
}

impl VoxelOctree {
    /// An octree containing only the empty root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Voxel::EMPTY],
        }
    }

    /// All nodes, root first.
    pub fn nodes(&self) -> &[Voxel] {
        &self.nodes
    }

    /// Set the voxel at `at` to `color`.
    ///
    /// Walks from the root, allocating 8-child blocks on first descent
    /// into a node. `at` must be within the grid and `color` nonzero
    /// (zero encodes emptiness).
    pub fn insert(&mut self, at: UVec3, color: u32) {
        debug_assert!(at.max_element() < GRID_SIZE);
        debug_assert_ne!(color, 0);

        let mut current = 0_usize;
        let mut center = UVec3::splat(GRID_SIZE / 2);
        let mut span = GRID_SIZE / 2;

        for depth in 0..OCTREE_DEPTH {
            if self.nodes[current].valid_mask == 0 {
                let children = u16::try_from(self.nodes.len())
                    .expect("octree exceeds 16-bit child pointers");
                self.nodes[current].child_pointer = children;
                self.nodes.extend(std::iter::repeat(Voxel::EMPTY).take(8));
            }

            let ge = at.cmpge(center);
            let child = ge.bitmask() as u8;

            span /= 2;
            center -= UVec3::splat(span);
            center += UVec3::splat(span * 2)
                * UVec3::new(u32::from(ge.x), u32::from(ge.y), u32::from(ge.z));

            self.nodes[current].valid_mask |= 1 << child;
            if depth == OCTREE_DEPTH - 1 {
                self.nodes[current].leaf_mask |= 1 << child;
            }
            current = self.nodes[current].child_pointer as usize + child as usize;
        }

        self.nodes[current].color = color;
    }

    /// Resolve the voxel at `at`; zero means empty.
    pub fn get(&self, at: UVec3) -> u32 {
        let mut current = 0_usize;
        let mut center = UVec3::splat(GRID_SIZE / 2);
        let mut span = GRID_SIZE / 2;

        for _ in 0..OCTREE_DEPTH {
            let node = self.nodes[current];
            let ge = at.cmpge(center);
            let child = ge.bitmask() as u8;

            if node.valid_mask & (1 << child) == 0 {
                return 0;
            }

            span /= 2;
            center -= UVec3::splat(span);
            center += UVec3::splat(span * 2)
                * UVec3::new(u32::from(ge.x), u32::from(ge.y), u32::from(ge.z));

            current = node.child_pointer as usize + child as usize;
        }

        self.nodes[current].color
    }
}

impl Default for VoxelOctree {
    fn default() -> Self {
        Self::new()
    }
}

/// Procedural demo content: a hollow shell plus a sphere, carved by a
/// three-axis cross.
pub fn demo_scene() -> VoxelOctree {
    let mut octree = VoxelOctree::new();

    for i in 0..(GRID_SIZE * GRID_SIZE * GRID_SIZE) {
        let x = i & 31;
        let y = (i >> 5) & 31;
        let z = (i >> 10) & 31;

        let is_corner = (x == 0 || x == 31) && (y == 0 || y == 31) && (z == 0 || z == 31);

        let is_ball =
            x.abs_diff(16).pow(2) + y.abs_diff(16).pow(2) + z.abs_diff(16).pow(2) <= 120;

        let is_cross = (x.abs_diff(16) <= 1 && y.abs_diff(16) <= 1)
            || (x.abs_diff(16) <= 1 && z.abs_diff(16) <= 1)
            || (y.abs_diff(16) <= 1 && z.abs_diff(16) <= 1);

        if (is_corner || is_ball) && !is_cross {
            octree.insert(UVec3::new(x, y, z), 1 + i % 3);
        }
    }

    octree
}

/// GPU-resident voxel octree.
pub struct VoxelScene {
    pub buffer: GpuBuffer,
    pub node_count: u32,
}

impl VoxelScene {
    /// Upload an octree to a GPU-only storage buffer.
    ///
    /// Goes through a staging buffer and an immediate submission; blocks
    /// until the copy has completed, then frees the staging buffer.
    ///
    /// # Safety
    /// The device must be valid and the immediate-submit queue must
    /// support transfer operations.
    pub unsafe fn upload(
        device: &ash::Device,
        allocator: &mut GpuAllocator,
        immediate: &ImmediateSubmit,
        octree: &VoxelOctree,
    ) -> Result<Self> {
        let nodes = octree.nodes();
        let size = std::mem::size_of_val(nodes) as u64;

        let buffer = allocator.create_buffer(
            size,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            "voxel_octree",
        )?;

        let mut staging = allocator.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "voxel_octree_staging",
        )?;

        if let Err(e) = staging.write(nodes) {
            let _ = allocator.free_buffer(&mut staging);
            let mut buffer = buffer;
            let _ = allocator.free_buffer(&mut buffer);
            return Err(e);
        }

        let copy_result = immediate.submit(device, |cmd| {
            let copy = vk::BufferCopy::default().size(size);
            device.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[copy]);
            Ok(())
        });

        allocator.free_buffer(&mut staging)?;

        if let Err(e) = copy_result {
            let mut buffer = buffer;
            let _ = allocator.free_buffer(&mut buffer);
            return Err(e);
        }

        tracing::info!(
            "Voxel octree uploaded: {} nodes ({} bytes)",
            nodes.len(),
            size
        );

        Ok(Self {
            buffer,
            node_count: nodes.len() as u32,
        })
    }

    /// Free the octree buffer.
    pub fn destroy(mut self, allocator: &mut GpuAllocator) -> Result<()> {
        allocator.free_buffer(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voxel_node_is_eight_bytes() {
        assert_eq!(std::mem::size_of::<Voxel>(), 8);
        assert_eq!(std::mem::offset_of!(Voxel, color), 0);
        assert_eq!(std::mem::offset_of!(Voxel, child_pointer), 4);
        assert_eq!(std::mem::offset_of!(Voxel, valid_mask), 6);
        assert_eq!(std::mem::offset_of!(Voxel, leaf_mask), 7);
    }

    #[test]
    fn empty_octree_is_a_single_root() {
        let octree = VoxelOctree::new();
        assert_eq!(octree.nodes().len(), 1);
        assert_eq!(octree.get(UVec3::new(5, 5, 5)), 0);
    }

    #[test]
    fn insert_allocates_one_block_per_level() {
        let mut octree = VoxelOctree::new();
        octree.insert(UVec3::new(0, 0, 0), 7);

        // root + one 8-child block per level
        assert_eq!(octree.nodes().len(), 1 + 8 * OCTREE_DEPTH as usize);
        assert_eq!(octree.get(UVec3::new(0, 0, 0)), 7);
    }

    #[test]
    fn root_records_the_chosen_octant() {
        let mut octree = VoxelOctree::new();
        octree.insert(UVec3::new(31, 31, 31), 1);

        // high octant on every axis
        assert_eq!(octree.nodes()[0].valid_mask, 1 << 7);
    }

    #[test]
    fn neighbors_share_interior_nodes() {
        let mut octree = VoxelOctree::new();
        octree.insert(UVec3::new(0, 0, 0), 1);
        let after_first = octree.nodes().len();

        octree.insert(UVec3::new(1, 0, 0), 2);

        // the second voxel only splits the deepest level
        assert_eq!(octree.nodes().len(), after_first);
        assert_eq!(octree.get(UVec3::new(0, 0, 0)), 1);
        assert_eq!(octree.get(UVec3::new(1, 0, 0)), 2);
    }

    #[test]
    fn leaves_are_marked_on_the_last_level() {
        let mut octree = VoxelOctree::new();
        octree.insert(UVec3::new(12, 3, 25), 3);

        let leaf_parents: Vec<_> = octree
            .nodes()
            .iter()
            .filter(|n| n.leaf_mask != 0)
            .collect();
        assert_eq!(leaf_parents.len(), 1);
        assert_eq!(leaf_parents[0].leaf_mask, leaf_parents[0].valid_mask);
    }

    #[test]
    fn demo_scene_has_content() {
        let octree = demo_scene();
        assert!(octree.nodes().len() > 1);

        // center of the ball is carved out by the cross
        assert_eq!(octree.get(UVec3::new(16, 16, 16)), 0);
        // a point on the ball surface away from the cross axes
        assert_ne!(octree.get(UVec3::new(10, 10, 10)), 0);
    }
}
