//! Output containers handed to whatever displays or stores a reconstruction. They carry data only.

use crate::{Point3f, Rgb};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PointCloud {
    pub points: Vec<Point3f>,
    /// Either empty or the same length as `points`.
    pub normals: Vec<Point3f>,
    /// Either empty or the same length as `points`.
    pub colors: Vec<Rgb>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn push(&mut self, point: Point3f, normal: Point3f, color: Rgb) {
        self.points.push(point);
        self.normals.push(normal);
        self.colors.push(color);
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub vertex_normals: Vec<Point3f>,
    pub vertex_colors: Vec<Rgb>,
    /// Counter-clockwise when viewed from the side the normals face.
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Anything the reconstruction can hand to a renderer.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Geometry {
    PointCloud(PointCloud),
    TriangleMesh(TriangleMesh),
}

impl Geometry {
    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::PointCloud(cloud) => cloud.is_empty(),
            Geometry::TriangleMesh(mesh) => mesh.is_empty(),
        }
    }
}

impl From<PointCloud> for Geometry {
    fn from(cloud: PointCloud) -> Self {
        Geometry::PointCloud(cloud)
    }
}

impl From<TriangleMesh> for Geometry {
    fn from(mesh: TriangleMesh) -> Self {
        Geometry::TriangleMesh(mesh)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    use crate::PointN;

    #[test]
    fn mesh_without_triangles_is_empty_geometry() {
        let mut cloud = PointCloud::default();
        assert!(Geometry::from(cloud.clone()).is_empty());
        cloud.push(PointN([0.0, 0.0, 1.0]), PointN([0.0, 0.0, -1.0]), Rgb::new(1, 2, 3));
        assert!(!Geometry::from(cloud).is_empty());

        let mut mesh = TriangleMesh {
            vertices: vec![PointN([0.0, 0.0, 1.0]); 3],
            ..Default::default()
        };
        assert!(Geometry::from(mesh.clone()).is_empty());
        mesh.triangles.push([0, 1, 2]);
        assert!(!Geometry::from(mesh).is_empty());
    }
}
