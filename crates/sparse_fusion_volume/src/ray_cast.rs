use crate::{
    config::DepthRange,
    interpolation::{HashedVoxels, VoxelSource},
    CameraView, FusionError, FusionResult, ScalableTsdfVolume, VolumeGrid,
};

use sparse_fusion_core::prelude::*;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

/// Where a pixel's ray meets the surface, in world coordinates.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct SurfaceSample {
    pub point: Point3f,
    /// Unit normal facing the camera.
    pub normal: Point3f,
    pub color: Rgb,
    /// Depth along the camera's optical axis.
    pub depth: f32,
}

/// The result of ray casting a volume: one optional surface sample per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct RayCastImage {
    intrinsics: PinholeIntrinsics,
    samples: Image<Option<SurfaceSample>>,
}

impl RayCastImage {
    #[inline]
    pub fn intrinsics(&self) -> &PinholeIntrinsics {
        &self.intrinsics
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.samples.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.samples.height()
    }

    #[inline]
    pub fn sample(&self, x: usize, y: usize) -> Option<&SurfaceSample> {
        self.samples.get(x, y)?.as_ref()
    }

    #[inline]
    pub fn depth_at(&self, x: usize, y: usize) -> Option<f32> {
        self.sample(x, y).map(|s| s.depth)
    }

    pub fn num_hits(&self) -> usize {
        self.samples.pixels().iter().filter(|s| s.is_some()).count()
    }

    /// Depth per pixel, with 0 where the ray missed.
    pub fn depth_image(&self) -> DepthImage {
        DepthImage::fill_with(self.width(), self.height(), |x, y| {
            self.depth_at(x, y).unwrap_or(0.0)
        })
    }

    pub fn to_point_cloud(&self) -> PointCloud {
        let mut cloud = PointCloud::default();
        for sample in self.samples.pixels().iter().flatten() {
            cloud.push(sample.point, sample.normal, sample.color);
        }

        cloud
    }

    /// Connects hits of neighboring pixels into triangles, skipping any triangle with an edge longer than `max_edge`
    /// meters.
    pub fn to_mesh(&self, max_edge: f32) -> TriangleMesh {
        let mut mesh = TriangleMesh::default();
        let mut vertex_of_pixel = vec![None; self.width() * self.height()];
        for (i, sample) in self.samples.pixels().iter().enumerate() {
            if let Some(sample) = sample {
                vertex_of_pixel[i] = Some(mesh.vertices.len() as u32);
                mesh.vertices.push(sample.point);
                mesh.vertex_normals.push(sample.normal);
                mesh.vertex_colors.push(sample.color);
            }
        }

        let max_edge_squared = max_edge * max_edge;
        let short_edges = |t: [u32; 3]| {
            let vertex = |i: u32| mesh.vertices[i as usize];
            let (a, b, c) = (vertex(t[0]), vertex(t[1]), vertex(t[2]));
            (a - b).norm_squared() <= max_edge_squared
                && (b - c).norm_squared() <= max_edge_squared
                && (c - a).norm_squared() <= max_edge_squared
        };
        let width = self.width();
        let mut triangles = Vec::new();
        for y in 0..self.height().saturating_sub(1) {
            for x in 0..width.saturating_sub(1) {
                let i = y * width + x;
                let top_left = vertex_of_pixel[i];
                let top_right = vertex_of_pixel[i + 1];
                let bottom_left = vertex_of_pixel[i + width];
                let bottom_right = vertex_of_pixel[i + width + 1];

                if let (Some(a), Some(b), Some(c)) = (top_left, bottom_left, top_right) {
                    if short_edges([a, b, c]) {
                        triangles.push([a, b, c]);
                    }
                }
                if let (Some(a), Some(b), Some(c)) = (top_right, bottom_left, bottom_right) {
                    if short_edges([a, b, c]) {
                        triangles.push([a, b, c]);
                    }
                }
            }
        }
        mesh.triangles = triangles;

        mesh
    }

    /// The hits as a mesh if `max_edge` is given (see `to_mesh`), otherwise as a point cloud.
    pub fn to_geometry(&self, max_edge: Option<f32>) -> Geometry {
        match max_edge {
            Some(max_edge) => self.to_mesh(max_edge).into(),
            None => self.to_point_cloud().into(),
        }
    }
}

impl ScalableTsdfVolume {
    /// Marches a ray through every pixel and reports where it first crosses from free space into a surface. Never
    /// allocates blocks.
    ///
    /// Rays skip unallocated blocks whole. Within allocated blocks they step by the interpolated distance to the
    /// surface, but at least one voxel. Rays that find no crossing within the depth range miss.
    pub fn ray_cast(
        &self,
        intrinsics: &PinholeIntrinsics,
        camera_to_world: &RigidTransform,
    ) -> FusionResult<RayCastImage> {
        let _span = debug_span!("ray_cast").entered();

        let state = self.state()?;
        let marcher = RayMarcher {
            grid: &state.grid,
            view: CameraView::new(&state.grid, intrinsics, camera_to_world),
            source: HashedVoxels::new(&state.table, &state.store),
            depth_range: self.config().depth_range,
            sdf_trunc: self.config().sdf_trunc,
        };

        let width = intrinsics.width;
        let samples: Vec<_> = (0..width * intrinsics.height)
            .into_par_iter()
            .map(|i| marcher.march((i % width) as f32, (i / width) as f32))
            .collect();
        let samples = Image::from_pixels(width, intrinsics.height, samples).ok_or_else(|| {
            FusionError::InvalidInput("camera has no pixels".to_string())
        })?;
        let image = RayCastImage {
            intrinsics: *intrinsics,
            samples,
        };
        debug!(hits = image.num_hits(), "ray cast");

        Ok(image)
    }

    /// Ray casts and shades each hit by how directly its surface faces the camera. Misses are black. Without color
    /// integration, surfaces are gray.
    pub fn render(
        &self,
        intrinsics: &PinholeIntrinsics,
        camera_to_world: &RigidTransform,
    ) -> FusionResult<ColorImage> {
        let _span = debug_span!("render").entered();

        let cast = self.ray_cast(intrinsics, camera_to_world)?;
        let camera_center = camera_to_world.translation;
        let use_color = self.config().integrate_color;

        Ok(ColorImage::fill_with(cast.width(), cast.height(), |x, y| {
            let sample = match cast.sample(x, y) {
                Some(s) => s,
                None => return Rgb::BLACK,
            };
            let shade = (sample.point - camera_center)
                .normalized()
                .map_or(0.0, |ray| ray.dot(&sample.normal).abs());
            let base = if use_color {
                sample.color.to_f32()
            } else {
                Point3f::fill(255.0)
            };

            Rgb::from_f32(base * shade)
        }))
    }
}

struct RayMarcher<'a> {
    grid: &'a VolumeGrid,
    view: CameraView,
    source: HashedVoxels<'a>,
    depth_range: DepthRange,
    sdf_trunc: f32,
}

impl RayMarcher<'_> {
    fn march(&self, u: f32, v: f32) -> Option<SurfaceSample> {
        let (dir, depth_per_distance) = self.view.pixel_ray(u, v)?;
        let origin = self.view.origin();
        let voxel_length = self.grid.voxel_length();
        let nudge = 0.01 * voxel_length;

        let mut t = self.depth_range.min / depth_per_distance;
        let t_max = self.depth_range.max / depth_per_distance;
        let mut previous: Option<(f32, f32)> = None;
        while t < t_max {
            let p = origin + dir * t;
            let key = self.grid.block_containing_point(p);
            if self.source.find_block(key).is_none() {
                previous = None;
                t += self.grid.block_exit_distance(key, p, dir).max(0.0) + nudge;
                continue;
            }

            let tsdf = match self.source.trilinear(self.grid.voxel_coordinates(p)) {
                Some(sample) => sample.tsdf,
                None => {
                    previous = None;
                    t += voxel_length;
                    continue;
                }
            };
            if let Some((t_previous, tsdf_previous)) = previous {
                if tsdf_previous > 0.0 && tsdf <= 0.0 {
                    let t_hit =
                        t_previous + (t - t_previous) * tsdf_previous / (tsdf_previous - tsdf);
                    return self.surface_sample(origin + dir * t_hit, dir, t_hit * depth_per_distance);
                }
            }
            previous = Some((t, tsdf));
            t += (tsdf * self.sdf_trunc).max(voxel_length);
        }

        None
    }

    fn surface_sample(&self, p: Point3f, dir: Point3f, depth: f32) -> Option<SurfaceSample> {
        let coords = self.grid.voxel_coordinates(p);
        let color = self
            .source
            .trilinear(coords)
            .map_or(Rgb::BLACK, |s| Rgb::from_f32(s.color));
        let normal = self
            .source
            .gradient(coords)
            .and_then(|g| g.normalized())
            .unwrap_or(-dir);
        let volume_to_world = self.grid.volume_to_world();

        Some(SurfaceSample {
            point: volume_to_world.transform_point(p),
            normal: volume_to_world.rotate(normal),
            color,
            depth,
        })
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod tests {
    use super::*;

    use crate::TsdfVolumeConfig;

    use pretty_assertions::assert_eq;
    use utilities::{
        data_sets::{planar_depth, small_camera, uniform_color},
        test::test_print,
    };

    const PLANE_DEPTH: f32 = 0.845;
    const PLANE_COLOR: Rgb = Rgb([200, 100, 50]);
    const MARGIN: usize = 8;

    fn plane_volume() -> ScalableTsdfVolume {
        let config = TsdfVolumeConfig::default()
            .with_voxel_length(0.01)
            .with_sdf_trunc(0.03)
            .with_bucket_count(1021)
            .with_value_capacity(4096);
        let camera = small_camera();
        let mut volume = ScalableTsdfVolume::with_config(config).unwrap();
        volume
            .integrate(
                &planar_depth(&camera, PLANE_DEPTH),
                Some(&uniform_color(&camera, PLANE_COLOR)),
                &camera,
                &RigidTransform::identity(),
            )
            .unwrap()
            .check()
            .unwrap();

        volume
    }

    fn interior_pixels(camera: &PinholeIntrinsics) -> impl Iterator<Item = (usize, usize)> {
        let (width, height) = (camera.width, camera.height);

        (MARGIN..height - MARGIN).flat_map(move |y| (MARGIN..width - MARGIN).map(move |x| (x, y)))
    }

    #[test]
    fn ray_cast_reproduces_planar_depth() {
        let volume = plane_volume();
        let camera = small_camera();
        let voxel_length = volume.config().voxel_length;

        let cast = volume
            .ray_cast(&camera, &RigidTransform::identity())
            .unwrap();

        let mut worst_error: f32 = 0.0;
        for (x, y) in interior_pixels(&camera) {
            let sample = cast.sample(x, y).unwrap();
            worst_error = worst_error.max((sample.depth - PLANE_DEPTH).abs());
            assert!(sample.normal.z() < -0.9, "normal {:?}", sample.normal);
            assert_eq!(sample.color, PLANE_COLOR);
        }
        test_print(&format!(
            "ray cast: {} hits, worst depth error {}\n",
            cast.num_hits(),
            worst_error
        ));
        assert!(worst_error < voxel_length);
    }

    #[test]
    fn rays_through_empty_space_miss() {
        let volume = plane_volume();
        let camera = small_camera();
        let turned_around =
            RigidTransform::from_axis_angle(PointN([0.0, 1.0, 0.0]), std::f32::consts::PI);

        let cast = volume.ray_cast(&camera, &turned_around).unwrap();

        assert_eq!(cast.num_hits(), 0);
        assert!(cast.to_point_cloud().is_empty());
        assert!(cast.to_mesh(0.05).is_empty());
    }

    #[test]
    fn ray_cast_does_not_allocate() {
        let volume = plane_volume();
        let camera = small_camera();
        let num_blocks = volume.num_blocks();

        volume
            .ray_cast(&camera, &RigidTransform::from_translation(PointN([0.1, 0.0, 0.0])))
            .unwrap();

        assert_eq!(volume.num_blocks(), num_blocks);
    }

    #[test]
    fn render_shades_a_frontal_plane_with_its_color() {
        let volume = plane_volume();
        let camera = small_camera();

        let image = volume
            .render(&camera, &RigidTransform::identity())
            .unwrap();

        let center = image.get(camera.width / 2, camera.height / 2).unwrap();
        for (c, expected) in center.0.iter().zip(PLANE_COLOR.0.iter()) {
            assert!((*c as i32 - *expected as i32).abs() <= 2);
        }
    }

    #[test]
    fn output_adapters_cover_the_hits() {
        let volume = plane_volume();
        let camera = small_camera();
        let cast = volume
            .ray_cast(&camera, &RigidTransform::identity())
            .unwrap();

        let cloud = cast.to_point_cloud();
        assert_eq!(cloud.len(), cast.num_hits());
        assert_eq!(cloud.normals.len(), cloud.len());

        let mesh = cast.to_mesh(0.05);
        assert_eq!(mesh.vertices.len(), cast.num_hits());
        let interior = camera.width - 2 * MARGIN - 1;
        assert!(mesh.triangles.len() >= 2 * interior * interior.min(camera.height - 2 * MARGIN - 1));
        for triangle in mesh.triangles.iter() {
            assert!(triangle.iter().all(|i| (*i as usize) < mesh.vertices.len()));
        }

        let depth = cast.depth_image();
        assert!((depth.depth_at(32, 24).unwrap() - PLANE_DEPTH).abs() < 0.01);

        assert_eq!(cast.to_geometry(None), Geometry::PointCloud(cloud));
        assert_eq!(cast.to_geometry(Some(0.05)), Geometry::TriangleMesh(mesh));
    }

    #[test]
    fn placed_volume_reports_world_coordinates() {
        let volume_to_world = RigidTransform::from_translation(PointN([0.3, -0.2, 0.5]))
            .compose(&RigidTransform::from_axis_angle(PointN([0.0, 0.0, 1.0]), 0.3));
        let config = TsdfVolumeConfig::default()
            .with_voxel_length(0.01)
            .with_sdf_trunc(0.03)
            .with_bucket_count(1021)
            .with_value_capacity(4096)
            .with_volume_to_world(volume_to_world);
        let camera = small_camera();
        let mut volume = ScalableTsdfVolume::with_config(config).unwrap();
        volume
            .integrate(
                &planar_depth(&camera, PLANE_DEPTH),
                Some(&uniform_color(&camera, PLANE_COLOR)),
                &camera,
                &RigidTransform::identity(),
            )
            .unwrap()
            .check()
            .unwrap();
        let voxel_length = volume.config().voxel_length;

        let cast = volume
            .ray_cast(&camera, &RigidTransform::identity())
            .unwrap();
        for (x, y) in interior_pixels(&camera) {
            let sample = cast.sample(x, y).unwrap();
            assert!((sample.depth - PLANE_DEPTH).abs() < voxel_length);
            assert!(
                (sample.point.z() - PLANE_DEPTH).abs() < voxel_length,
                "point {:?}",
                sample.point
            );
            assert!(sample.normal.z() < -0.9, "normal {:?}", sample.normal);
        }

        // The plane sits at a different place in the volume frame, but the output is in the world frame.
        let cloud = volume.extract_surface_points().unwrap();
        assert!(cloud.len() > 100);
        for point in cloud.points.iter() {
            assert!((point.z() - PLANE_DEPTH).abs() < 2e-3, "point {:?}", point);
        }
    }
}
