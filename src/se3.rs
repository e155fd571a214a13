//! Rigid body transforms and ordered collections of them.
//!
//! A [Pose] is a rotation and a translation in 3D. A [PoseSet] is an ordered, non-empty sequence
//! of poses with elementwise algebra. Binary operations between sets broadcast a singleton set
//! against a set of any length, like scalar broadcasting:
//!
//! ```
//! use traverse2vpr::se3::*;
//!
//! let origin = PoseSet::from_xyzrpy(&[[0., 0., 0., 0., 0., 0.]]).unwrap();
//! let path = PoseSet::from_xyzrpy(&[[1., 0., 0., 0., 0., 0.], [2., 0., 0., 0., 0., 0.]]).unwrap();
//! let rel = origin.relative(&path).unwrap();
//! assert_eq!(rel.len(), 2);
//! ```

use cgmath::prelude::*;
use cgmath::{AbsDiffEq, Matrix3, Matrix4, One, Quaternion, Rad, Vector3, Zero};

use std::ops::{Index, Mul, Range};

use crate::error::Error;

/// A rigid body transform `x -> R x + t`.
///
/// The rotation is stored as a unit quaternion. Poses are immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    translation: Vector3<f64>,
    rotation: Quaternion<f64>,
}

impl Pose {
    /// Create a pose from a translation and a rotation. The rotation is normalized.
    pub fn new(translation: Vector3<f64>, rotation: Quaternion<f64>) -> Self {
        Pose {
            translation: translation,
            rotation: rotation.normalize(),
        }
    }

    pub fn identity() -> Self {
        Pose::new(Vector3::zero(), Quaternion::one())
    }

    /// Create a pose from a translation and roll, pitch, yaw angles in radians.
    ///
    /// Angles are intrinsic ZYX Euler angles: roll is about x, pitch about y and yaw about z, with
    /// `R = Rz(yaw) * Ry(pitch) * Rx(roll)`. This is the RobotCar INS convention. Tables built
    /// with scipy's `from_euler('ZYX', [roll, pitch, yaw])` turn the roll value about z instead;
    /// that reading is deliberately not reproduced, so weighted distances differ from it.
    pub fn from_xyzrpy(xyzrpy: [f64; 6]) -> Self {
        let [x, y, z, roll, pitch, yaw] = xyzrpy;
        let rotation = Quaternion::from_angle_z(Rad(yaw))
            * Quaternion::from_angle_y(Rad(pitch))
            * Quaternion::from_angle_x(Rad(roll));
        Pose::new(Vector3::new(x, y, z), rotation)
    }

    /// Create a pose from a translation and a quaternion in `(x, y, z, w)` order.
    pub fn from_xyzquat(t: [f64; 3], q: [f64; 4]) -> Result<Self, Error> {
        let rotation = Quaternion::new(q[3], q[0], q[1], q[2]);
        if !(rotation.magnitude2() > 0.0) {
            return Err(Error::InvalidShape(format!(
                "quaternion {:?} cannot be normalized",
                q
            )));
        }
        Ok(Pose::new(Vector3::new(t[0], t[1], t[2]), rotation))
    }

    /// Create a pose from a 4x4 homogeneous transform. The bottom row is ignored.
    pub fn from_matrix(m: &Matrix4<f64>) -> Self {
        let r = Matrix3::from_cols(m.x.truncate(), m.y.truncate(), m.z.truncate());
        Pose::new(m.w.truncate(), Quaternion::from(r))
    }

    /// 4x4 homogeneous transform of this pose.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        Matrix4::from_translation(self.translation) * Matrix4::from(self.rotation)
    }

    /// Inverse of [Pose::from_xyzrpy].
    pub fn to_xyzrpy(&self) -> [f64; 6] {
        // column major: r.c.r
        let r = Matrix3::from(self.rotation);
        let roll = r.y.z.atan2(r.z.z);
        let yaw = r.x.y.atan2(r.x.x);
        let pitch = (-r.x.z).atan2(r.x.x.hypot(r.x.y));
        let t = self.translation;
        [t.x, t.y, t.z, roll, pitch, yaw]
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    pub fn rotation(&self) -> Quaternion<f64> {
        self.rotation
    }

    /// `self * other`: rotation `R_a R_b`, translation `R_a t_b + t_a`.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose::new(
            self.rotation.rotate_vector(other.translation) + self.translation,
            self.rotation * other.rotation,
        )
    }

    pub fn inverse(&self) -> Pose {
        let r_inv = self.rotation.conjugate();
        Pose::new(-r_inv.rotate_vector(self.translation), r_inv)
    }

    /// Pose of `other` expressed in the frame of `self`.
    pub fn relative(&self, other: &Pose) -> Pose {
        self.inverse().compose(other)
    }

    /// Euclidean norm of the translation.
    pub fn translation_norm(&self) -> f64 {
        self.translation.magnitude()
    }

    /// Rotation angle in radians, in `[0, pi]`.
    pub fn angle(&self) -> f64 {
        2.0 * self.rotation.v.magnitude().atan2(self.rotation.s.abs())
    }

    /// Interpolate between two poses. Translation is linear and rotation follows the shortest arc.
    pub fn interpolate(&self, other: &Pose, amount: f64) -> Pose {
        let target = if self.rotation.dot(other.rotation) < 0.0 {
            -other.rotation
        } else {
            other.rotation
        };
        Pose::new(
            self.translation + (other.translation - self.translation) * amount,
            self.rotation.slerp(target, amount),
        )
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, other: Pose) -> Pose {
        self.compose(&other)
    }
}

impl AbsDiffEq for Pose {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::default_epsilon()
    }

    /// Quaternions `q` and `-q` are the same rotation.
    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.translation.abs_diff_eq(&other.translation, epsilon)
            && (self.rotation.abs_diff_eq(&other.rotation, epsilon)
                || self.rotation.abs_diff_eq(&-other.rotation, epsilon))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Repr {
    Single(Pose),
    Many(Vec<Pose>),
}

/// Ordered, non-empty sequence of poses.
///
/// A set holding exactly one pose is a singleton and broadcasts against sets of any length in
/// [PoseSet::compose], [PoseSet::relative] and the metric functions.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSet(Repr);

/// Length of the result of a binary operation on sets of length `left` and `right`.
pub fn broadcast_len(left: usize, right: usize) -> Result<usize, Error> {
    if left == 1 || right == 1 || left == right {
        Ok(left.max(right))
    } else {
        Err(Error::ShapeMismatch {
            left: left,
            right: right,
        })
    }
}

fn check_row(row: &[f64], expected: usize, what: &str) -> Result<(), Error> {
    if row.len() == expected {
        Ok(())
    } else {
        Err(Error::InvalidShape(format!(
            "expected {} to have {} components, got {}",
            what,
            expected,
            row.len()
        )))
    }
}

impl PoseSet {
    pub fn single(pose: Pose) -> Self {
        PoseSet(Repr::Single(pose))
    }

    /// Build a set from a list of poses. A single pose yields a singleton set.
    pub fn from_poses(mut poses: Vec<Pose>) -> Result<Self, Error> {
        match poses.len() {
            0 => Err(Error::InvalidShape(
                "a pose set needs at least one pose".to_string(),
            )),
            1 => Ok(PoseSet::single(poses.remove(0))),
            _ => Ok(PoseSet(Repr::Many(poses))),
        }
    }

    /// Build a set from rows of `[x, y, z, roll, pitch, yaw]`. See [Pose::from_xyzrpy].
    pub fn from_xyzrpy<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, Error> {
        let poses = rows
            .iter()
            .map(|row| {
                let row = row.as_ref();
                check_row(row, 6, "xyzrpy row")?;
                Ok(Pose::from_xyzrpy([
                    row[0], row[1], row[2], row[3], row[4], row[5],
                ]))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        PoseSet::from_poses(poses)
    }

    /// Build a set from parallel arrays of translations and `(x, y, z, w)` quaternions.
    pub fn from_xyzquat<T, Q>(translations: &[T], quaternions: &[Q]) -> Result<Self, Error>
    where
        T: AsRef<[f64]>,
        Q: AsRef<[f64]>,
    {
        if translations.len() != quaternions.len() {
            return Err(Error::InvalidShape(format!(
                "differing number of translations {} and rotations {}",
                translations.len(),
                quaternions.len()
            )));
        }
        let poses = translations
            .iter()
            .zip(quaternions)
            .map(|(t, q)| {
                let (t, q) = (t.as_ref(), q.as_ref());
                check_row(t, 3, "translation")?;
                check_row(q, 4, "quaternion")?;
                Pose::from_xyzquat([t[0], t[1], t[2]], [q[0], q[1], q[2], q[3]])
            })
            .collect::<Result<Vec<_>, Error>>()?;
        PoseSet::from_poses(poses)
    }

    /// Build a set from 4x4 homogeneous transforms.
    pub fn from_matrices(matrices: &[Matrix4<f64>]) -> Result<Self, Error> {
        PoseSet::from_poses(matrices.iter().map(Pose::from_matrix).collect())
    }

    /// Concatenate several sets, in order, into one.
    pub fn concat<'a, I>(sets: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = &'a PoseSet>,
    {
        PoseSet::from_poses(
            sets.into_iter()
                .flat_map(|s| s.iter().cloned())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match &self.0 {
            Repr::Single(_) => 1,
            Repr::Many(poses) => poses.len(),
        }
    }

    /// True if this set broadcasts against sets of other lengths.
    pub fn is_single(&self) -> bool {
        match &self.0 {
            Repr::Single(_) => true,
            Repr::Many(_) => false,
        }
    }

    pub fn as_slice(&self) -> &[Pose] {
        match &self.0 {
            Repr::Single(pose) => std::slice::from_ref(pose),
            Repr::Many(poses) => poses.as_slice(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pose> {
        self.as_slice().iter()
    }

    pub fn get(&self, i: usize) -> Option<&Pose> {
        self.as_slice().get(i)
    }

    /// The `i`th pose as a singleton set.
    pub fn at(&self, i: usize) -> Option<PoseSet> {
        self.get(i).map(|p| PoseSet::single(*p))
    }

    /// Contiguous sub-sequence of this set.
    pub fn slice(&self, range: Range<usize>) -> Result<PoseSet, Error> {
        match self.as_slice().get(range.clone()) {
            Some(poses) => PoseSet::from_poses(poses.to_vec()),
            None => Err(Error::InvalidShape(format!(
                "range {:?} out of bounds for {} poses",
                range,
                self.len()
            ))),
        }
    }

    /// Poses at `indices`, in the order given.
    pub fn select(&self, indices: &[usize]) -> Result<PoseSet, Error> {
        let poses = indices
            .iter()
            .map(|&i| {
                self.get(i).cloned().ok_or_else(|| {
                    Error::InvalidShape(format!(
                        "index {} out of bounds for {} poses",
                        i,
                        self.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        PoseSet::from_poses(poses)
    }

    fn broadcast<F>(&self, other: &PoseSet, f: F) -> Result<PoseSet, Error>
    where
        F: Fn(&Pose, &Pose) -> Pose,
    {
        let (a, b) = (self.as_slice(), other.as_slice());
        let n = broadcast_len(a.len(), b.len())?;
        let poses = (0..n)
            .map(|i| {
                let x = if a.len() == 1 { &a[0] } else { &a[i] };
                let y = if b.len() == 1 { &b[0] } else { &b[i] };
                f(x, y)
            })
            .collect();
        PoseSet::from_poses(poses)
    }

    /// Elementwise composition `self[i] * other[i]`.
    pub fn compose(&self, other: &PoseSet) -> Result<PoseSet, Error> {
        self.broadcast(other, |a, b| a.compose(b))
    }

    /// Elementwise inverse.
    pub fn inverse(&self) -> PoseSet {
        match &self.0 {
            Repr::Single(pose) => PoseSet::single(pose.inverse()),
            Repr::Many(poses) => PoseSet(Repr::Many(poses.iter().map(Pose::inverse).collect())),
        }
    }

    /// Elementwise relative pose `self[i]^-1 * other[i]`, the pose of `other` in the frame of
    /// `self`.
    pub fn relative(&self, other: &PoseSet) -> Result<PoseSet, Error> {
        self.inverse().compose(other)
    }

    /// Translation norms and rotation angles (radians) of each pose. Meaningful on relative poses.
    pub fn magnitude(&self) -> (Vec<f64>, Vec<f64>) {
        (
            self.iter().map(Pose::translation_norm).collect(),
            self.iter().map(Pose::angle).collect(),
        )
    }

    /// Translations and rotations of each pose.
    pub fn components(&self) -> (Vec<Vector3<f64>>, Vec<Quaternion<f64>>) {
        (
            self.iter().map(Pose::translation).collect(),
            self.iter().map(Pose::rotation).collect(),
        )
    }
}

impl Index<usize> for PoseSet {
    type Output = Pose;

    fn index(&self, i: usize) -> &Pose {
        &self.as_slice()[i]
    }
}

impl From<Pose> for PoseSet {
    fn from(pose: Pose) -> Self {
        PoseSet::single(pose)
    }
}

impl<'a> IntoIterator for &'a PoseSet {
    type Item = &'a Pose;
    type IntoIter = std::slice::Iter<'a, Pose>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
fn random_pose(rng: &mut impl rand::Rng) -> Pose {
    let pi = std::f64::consts::PI;
    Pose::from_xyzrpy([
        rng.gen_range(-50.0, 50.0),
        rng.gen_range(-50.0, 50.0),
        rng.gen_range(-5.0, 5.0),
        rng.gen_range(-pi, pi),
        rng.gen_range(-pi / 2.0 + 0.01, pi / 2.0 - 0.01),
        rng.gen_range(-pi, pi),
    ])
}

#[cfg(test)]
pub(crate) fn random_poses(n: usize) -> PoseSet {
    let mut rng = rand::thread_rng();
    PoseSet::from_poses((0..n).map(|_| random_pose(&mut rng)).collect()).unwrap()
}

#[test]
fn test_compose_inverse_is_identity() {
    let poses = random_poses(50);
    let id = poses.compose(&poses.inverse()).unwrap();
    let (t, r) = id.magnitude();
    assert!(t.iter().all(|x| *x < 1e-9));
    assert!(r.iter().all(|x| *x < 1e-6));
}

#[test]
fn test_relative_is_inverse_compose() {
    let a = random_poses(20);
    let b = random_poses(20);
    assert_eq!(
        a.relative(&b).unwrap(),
        a.inverse().compose(&b).unwrap()
    );
}

#[test]
fn test_compose_convention() {
    let a = Pose::from_xyzrpy([1., 2., 3., 0., 0., std::f64::consts::FRAC_PI_2]);
    let b = Pose::from_xyzrpy([1., 0., 0., 0., 0., 0.]);
    let c = a * b;
    // b's translation is rotated into a's frame before being added
    assert!(c
        .translation()
        .abs_diff_eq(&Vector3::new(1., 3., 3.), 1e-12));
    assert!((c.angle() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
}

#[test]
fn test_broadcast() {
    let one = random_poses(1);
    let many = random_poses(7);
    let other = random_poses(5);

    assert!(one.is_single());
    assert_eq!(one.compose(&many).unwrap().len(), 7);
    assert_eq!(many.compose(&one).unwrap().len(), 7);
    assert_eq!(one.relative(&many).unwrap().len(), 7);
    assert_eq!(many.relative(&one).unwrap().len(), 7);
    assert!(one.compose(&one).unwrap().is_single());

    match many.compose(&other) {
        Err(Error::ShapeMismatch { left: 7, right: 5 }) => (),
        x => panic!("expected a shape mismatch, got {:?}", x),
    }
    assert!(many.relative(&other).is_err());
}

#[test]
fn test_euler_axes() {
    let half_pi = std::f64::consts::FRAC_PI_2;
    let y = Vector3::new(0., 1., 0.);
    let x = Vector3::new(1., 0., 0.);
    let roll = Pose::from_xyzrpy([0., 0., 0., half_pi, 0., 0.]).rotation();
    assert!(roll.rotate_vector(y).abs_diff_eq(&Vector3::new(0., 0., 1.), 1e-12));
    assert!(roll.rotate_vector(x).abs_diff_eq(&x, 1e-12));
    let pitch = Pose::from_xyzrpy([0., 0., 0., 0., half_pi, 0.]).rotation();
    assert!(pitch.rotate_vector(x).abs_diff_eq(&Vector3::new(0., 0., -1.), 1e-12));
    let yaw = Pose::from_xyzrpy([0., 0., 0., 0., 0., half_pi]).rotation();
    assert!(yaw.rotate_vector(x).abs_diff_eq(&y, 1e-12));
}

#[test]
fn test_xyzrpy_round_trip() {
    let xyzrpy = [4.0, -2.0, 0.5, 0.1, -0.3, 2.5];
    let pose = Pose::from_xyzrpy(xyzrpy);
    let back = pose.to_xyzrpy();
    for (a, b) in xyzrpy.iter().zip(back.iter()) {
        assert!((a - b).abs() < 1e-12, "{:?} != {:?}", xyzrpy, back);
    }
    assert!(Pose::from_xyzrpy(back).abs_diff_eq(&pose, 1e-12));
}

#[test]
fn test_components_round_trip() {
    let poses = random_poses(10);
    let (t, r) = poses.components();
    let rebuilt = PoseSet::from_poses(
        t.into_iter()
            .zip(r)
            .map(|(t, r)| Pose::new(t, r))
            .collect(),
    )
    .unwrap();
    for (a, b) in poses.iter().zip(rebuilt.iter()) {
        assert!(a.abs_diff_eq(b, 1e-12));
    }
}

#[test]
fn test_matrix_round_trip() {
    let poses = random_poses(10);
    let matrices = poses.iter().map(Pose::to_matrix).collect::<Vec<_>>();
    let rebuilt = PoseSet::from_matrices(&matrices).unwrap();
    for (a, b) in poses.iter().zip(rebuilt.iter()) {
        assert!(a.abs_diff_eq(b, 1e-9));
    }
}

#[test]
fn test_xyzquat_matches_euler() {
    let half = std::f64::consts::FRAC_PI_4;
    let quat = PoseSet::from_xyzquat(&[[1., 2., 3.]], &[[0., 0., half.sin(), half.cos()]]).unwrap();
    let euler = Pose::from_xyzrpy([1., 2., 3., 0., 0., std::f64::consts::FRAC_PI_2]);
    assert!(quat[0].abs_diff_eq(&euler, 1e-12));
}

#[test]
fn test_invalid_shapes() {
    match PoseSet::from_xyzrpy(&[vec![1., 2., 0.1, 0.2, 0.3]]) {
        Err(Error::InvalidShape(_)) => (),
        x => panic!("expected invalid shape, got {:?}", x),
    }
    assert!(PoseSet::from_xyzquat(&[[1., 2.]], &[[0., 0., 0., 1.]]).is_err());
    assert!(PoseSet::from_xyzquat(&[[1., 2., 3.], [1., 2., 3.]], &[[0., 0., 0., 1.]]).is_err());
    assert!(PoseSet::from_xyzquat(&[[1., 2., 3.]], &[[0., 0., 0., 0.]]).is_err());
    assert!(PoseSet::from_poses(Vec::new()).is_err());
}

#[test]
fn test_select_and_slice() {
    let poses = PoseSet::from_xyzrpy(
        &(0..10)
            .map(|i| [i as f64, 0., 0., 0., 0., 0.])
            .collect::<Vec<_>>(),
    )
    .unwrap();
    let sub = poses.select(&[0, 3, 9]).unwrap();
    assert_eq!(sub.len(), 3);
    assert_eq!(sub[1].translation().x, 3.0);
    assert!(poses.select(&[10]).is_err());

    let sl = poses.slice(2..5).unwrap();
    assert_eq!(sl.len(), 3);
    assert_eq!(sl[0].translation().x, 2.0);
    assert!(poses.slice(2..2).is_err());
    assert!(poses.slice(5..11).is_err());
    assert!(poses.slice(4..5).unwrap().is_single());

    let joined = PoseSet::concat(vec![&sub, &sl]).unwrap();
    assert_eq!(joined.len(), 6);
}

#[test]
fn test_interpolate() {
    let a = Pose::from_xyzrpy([0., 0., 0., 0., 0., 0.]);
    let b = Pose::from_xyzrpy([2., 0., 0., 0., 0., 1.]);
    let mid = a.interpolate(&b, 0.5);
    assert!((mid.translation().x - 1.0).abs() < 1e-12);
    assert!((mid.angle() - 0.5).abs() < 1e-12);
}
