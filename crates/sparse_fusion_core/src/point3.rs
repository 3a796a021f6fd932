use crate::{DotProduct, IntegerPoint, NormSquared, Ones, Point, PointN, SmallZero};

use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use num::Integer;

pub type Point3<T> = PointN<[T; 3]>;
pub type Point3i = PointN<[i32; 3]>;
pub type Point3f = PointN<[f32; 3]>;

impl<T: Copy> Point3<T> {
    #[inline]
    pub fn x(&self) -> T {
        self.0[0]
    }

    #[inline]
    pub fn y(&self) -> T {
        self.0[1]
    }

    #[inline]
    pub fn z(&self) -> T {
        self.0[2]
    }

    #[inline]
    fn zip_with(self, other: Self, f: impl Fn(T, T) -> T) -> Self {
        let [a0, a1, a2] = self.0;
        let [b0, b1, b2] = other.0;

        PointN([f(a0, b0), f(a1, b1), f(a2, b2)])
    }

    #[inline]
    fn map(self, f: impl Fn(T) -> T) -> Self {
        let [a0, a1, a2] = self.0;

        PointN([f(a0), f(a1), f(a2)])
    }
}

// Component-wise arithmetic for both scalar types. Scalar division is the one operation that differs, so each type
// gets its own `Div` impl below.
macro_rules! impl_point3_arithmetic {
    ($t:ty, $zero:expr, $one:expr) => {
        impl Point for PointN<[$t; 3]> {
            type Scalar = $t;

            #[inline]
            fn fill(value: $t) -> Self {
                PointN([value; 3])
            }
        }

        impl SmallZero for PointN<[$t; 3]> {
            const ZERO: Self = PointN([$zero; 3]);
        }

        impl Ones for PointN<[$t; 3]> {
            const ONES: Self = PointN([$one; 3]);
        }

        impl Add for PointN<[$t; 3]> {
            type Output = Self;

            #[inline]
            fn add(self, rhs: Self) -> Self {
                self.zip_with(rhs, |a, b| a + b)
            }
        }

        impl Sub for PointN<[$t; 3]> {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: Self) -> Self {
                self.zip_with(rhs, |a, b| a - b)
            }
        }

        impl Neg for PointN<[$t; 3]> {
            type Output = Self;

            #[inline]
            fn neg(self) -> Self {
                self.map(|a| -a)
            }
        }

        impl AddAssign for PointN<[$t; 3]> {
            #[inline]
            fn add_assign(&mut self, rhs: Self) {
                *self = *self + rhs;
            }
        }

        impl SubAssign for PointN<[$t; 3]> {
            #[inline]
            fn sub_assign(&mut self, rhs: Self) {
                *self = *self - rhs;
            }
        }

        impl Mul<$t> for PointN<[$t; 3]> {
            type Output = Self;

            #[inline]
            fn mul(self, rhs: $t) -> Self {
                self.map(|a| a * rhs)
            }
        }

        /// Component-wise product.
        impl Mul for PointN<[$t; 3]> {
            type Output = Self;

            #[inline]
            fn mul(self, rhs: Self) -> Self {
                self.zip_with(rhs, |a, b| a * b)
            }
        }

        impl DotProduct for PointN<[$t; 3]> {
            type Scalar = $t;

            #[inline]
            fn dot(&self, other: &Self) -> $t {
                let p = *self * *other;

                p.x() + p.y() + p.z()
            }
        }

        impl NormSquared for PointN<[$t; 3]> {
            #[inline]
            fn norm_squared(&self) -> f32 {
                self.dot(self) as f32
            }
        }
    };
}

impl_point3_arithmetic!(i32, 0, 1);
impl_point3_arithmetic!(f32, 0.0, 1.0);

/// Floor division, so that negative voxels map to negative blocks.
impl Div<i32> for Point3i {
    type Output = Self;

    #[inline]
    fn div(self, rhs: i32) -> Self {
        self.map(|a| a.div_floor(&rhs))
    }
}

impl Div<f32> for Point3f {
    type Output = Self;

    #[inline]
    fn div(self, rhs: f32) -> Self {
        self.map(|a| a / rhs)
    }
}

impl Point3i {
    /// Component-wise remainder with the sign of `rhs`.
    #[inline]
    pub fn vector_mod_floor(&self, rhs: &Self) -> Self {
        self.zip_with(*rhs, |a, b| a.mod_floor(&b))
    }
}

impl IntegerPoint for Point3i {
    fn corner_offsets() -> Vec<Self> {
        (0..8).map(|i| PointN([i & 1, (i >> 1) & 1, i >> 2])).collect()
    }

    fn moore_offsets() -> Vec<Self> {
        (0..27)
            .map(|i| PointN([i % 3 - 1, (i / 3) % 3 - 1, i / 9 - 1]))
            .collect()
    }
}

impl Point3f {
    #[inline]
    pub fn round(&self) -> Self {
        self.map(f32::round)
    }

    #[inline]
    pub fn floor(&self) -> Self {
        self.map(f32::floor)
    }

    /// Truncates each component toward zero.
    #[inline]
    pub fn as_3i(&self) -> Point3i {
        PointN([self.x() as i32, self.y() as i32, self.z() as i32])
    }

    /// The lattice point whose unit cell contains `self`.
    #[inline]
    pub fn in_voxel(&self) -> Point3i {
        self.floor().as_3i()
    }

    /// The unit vector in the same direction, or `None` if `self` is too short to normalize.
    pub fn normalized(&self) -> Option<Self> {
        let norm = crate::Norm::norm(self);
        if norm > std::f32::EPSILON {
            Some(*self / norm)
        } else {
            None
        }
    }

    pub fn cross(&self, other: &Self) -> Self {
        PointN([
            self.y() * other.z() - self.z() * other.y(),
            self.z() * other.x() - self.x() * other.z(),
            self.x() * other.y() - self.y() * other.x(),
        ])
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.is_finite())
    }
}

impl From<Point3i> for Point3f {
    #[inline]
    fn from(p: Point3i) -> Self {
        PointN([p.x() as f32, p.y() as f32, p.z() as f32])
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
