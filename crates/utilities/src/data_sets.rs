use sparse_fusion_core::prelude::*;

/// A small camera whose principal point sits at the image corner, so pixel `(u, v)` at depth `z` sees the point
/// `(u * z / 84, v * z / 84, z)`.
pub fn corner_camera(width: usize, height: usize) -> PinholeIntrinsics {
    PinholeIntrinsics::new(width, height, 84.0, 84.0, 0.0, 0.0)
}

/// A centered 64x48 camera with a 90 degree horizontal field of view.
pub fn small_camera() -> PinholeIntrinsics {
    PinholeIntrinsics::new(64, 48, 32.0, 32.0, 31.5, 23.5)
}

/// Depth of a fronto-parallel plane at `distance` meters, seen by a camera at the world origin looking down +Z.
pub fn planar_depth(intrinsics: &PinholeIntrinsics, distance: f32) -> DepthImage {
    DepthImage::fill(intrinsics.width, intrinsics.height, distance)
}

/// All holes, except for the listed pixels which observe `depth`.
pub fn sparse_depth(
    intrinsics: &PinholeIntrinsics,
    pixels: &[(usize, usize)],
    depth: f32,
) -> DepthImage {
    DepthImage::fill_with(intrinsics.width, intrinsics.height, |x, y| {
        if pixels.contains(&(x, y)) {
            depth
        } else {
            0.0
        }
    })
}

pub fn uniform_color(intrinsics: &PinholeIntrinsics, color: Rgb) -> ColorImage {
    ColorImage::fill(intrinsics.width, intrinsics.height, color)
}

/// Six pixels whose truncation bands fall into six distinct blocks of 8 voxels of 1 cm, given a truncation distance of
/// at most 4 cm. See `dot_blocks` for the block keys.
pub fn dots_frame() -> (PinholeIntrinsics, DepthImage) {
    let camera = corner_camera(24, 16);
    let pixels = [(4, 4), (12, 4), (20, 4), (4, 12), (12, 12), (20, 12)];
    let depth = sparse_depth(&camera, &pixels, 0.84);

    (camera, depth)
}

/// The blocks observed by `dots_frame`: x in `0..3`, y in `0..2`, z = 10.
pub fn dot_blocks() -> Vec<Point3i> {
    let mut keys = Vec::new();
    for y in 0..2 {
        for x in 0..3 {
            keys.push(PointN([x, y, 10]));
        }
    }

    keys
}
