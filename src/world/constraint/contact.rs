//! Contact constraints.

use super::{ConstrainedBody, PreparedTwoBodyConstraint, TwoBodyConstraint};
use crate::{
    fph,
    quantities::{Position, Velocity},
};
use nalgebra::{UnitVector3, Vector3};
use num_traits::Zero;
use std::ops::{Add, Mul, Sub};
use tinyvec::TinyVec;

/// A set of contact points representing the region where two bodies touch.
#[derive(Clone, Debug)]
pub struct ContactManifold {
    contacts: TinyVec<[ContactWithID; 4]>,
}

#[derive(Clone, Debug)]
pub struct ContactWithID {
    /// Identifier that stays the same for the same feature pair over
    /// consecutive steps.
    pub id: ContactID,
    pub geometry: ContactGeometry,
}

/// Identifier for a contact.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContactID(u64);

/// Geometrical information about a point of contact between two bodies A
/// and B.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactGeometry {
    /// The world space position of the point on body B that penetrates
    /// deepest into body A.
    pub position: Position,
    /// The world space outward surface normal of body B at
    /// [`Self::position`], pointing towards body A.
    pub surface_normal: UnitVector3<fph>,
    /// The distance between the deepest penetration points on A and B along
    /// [`Self::surface_normal`]. Never negative.
    pub penetration_depth: fph,
}

/// How two touching bodies respond to each other, obtained by combining the
/// properties of their materials.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContactResponseParameters {
    pub restitution_coef: fph,
    pub static_friction_coef: fph,
    pub dynamic_friction_coef: fph,
}

/// A contact together with how the bodies respond to it.
#[derive(Clone, Copy, Debug)]
pub(super) struct Contact {
    pub geometry: ContactGeometry,
    pub response_params: ContactResponseParameters,
    /// Approach speeds below this do not bounce.
    pub restitution_threshold: fph,
}

/// Derived information about a contact used for solving the normal (bounce)
/// and tangential (friction) contact constraints.
#[derive(Clone, Debug)]
pub(super) struct PreparedContact {
    /// The point on body A that penetrates deepest into body B, in the frame
    /// of body A with origin at its center of mass.
    local_position_on_a: Position,
    /// The point on body B that penetrates deepest into body A, in the frame
    /// of body B with origin at its center of mass.
    local_position_on_b: Position,
    normal: UnitVector3<fph>,
    tangent: UnitVector3<fph>,
    bitangent: UnitVector3<fph>,
    effective_mass_normal: fph,
    effective_mass_tangent: fph,
    effective_mass_bitangent: fph,
    restitution_coef: fph,
    friction_coef: fph,
}

/// Impulses along the three axes of a surface aligned coordinate system.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContactImpulses {
    pub normal: fph,
    pub tangent: fph,
    pub bitangent: fph,
}

impl ContactManifold {
    pub fn new() -> Self {
        Self {
            contacts: TinyVec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn contacts(&self) -> &[ContactWithID] {
        self.contacts.as_slice()
    }

    pub fn clear(&mut self) {
        self.contacts.clear();
    }

    pub fn add_contact(&mut self, contact: ContactWithID) {
        self.contacts.push(contact);
    }
}

impl Default for ContactManifold {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ContactWithID {
    fn default() -> Self {
        Self {
            id: ContactID(u64::MAX),
            geometry: ContactGeometry::default(),
        }
    }
}

impl ContactID {
    pub fn from_two_u32(a: u32, b: u32) -> Self {
        Self((u64::from(a) << 32) | u64::from(b))
    }

    pub fn from_two_u32_and_n_indices<const N: usize>(a: u32, b: u32, indices: [usize; N]) -> Self {
        let mut id = Self::from_two_u32(a, b).0;
        for index in indices {
            id = id.wrapping_mul(31).wrapping_add(index as u64);
        }
        Self(id)
    }
}

impl ContactGeometry {
    /// Returns the world space position of the point on body A that
    /// penetrates deepest into body B.
    pub fn position_on_a(&self) -> Position {
        self.position - self.penetration_depth * self.surface_normal.into_inner()
    }

    pub fn position_on_b(&self) -> Position {
        self.position
    }
}

impl Default for ContactGeometry {
    fn default() -> Self {
        Self {
            position: Position::origin(),
            surface_normal: Vector3::z_axis(),
            penetration_depth: 0.0,
        }
    }
}

impl ContactResponseParameters {
    /// Combines the restitution of two materials (the geometric mean) with
    /// the friction between them.
    pub fn from_materials(
        restitution_a: fph,
        restitution_b: fph,
        static_friction_coef: fph,
        dynamic_friction_coef: fph,
    ) -> Self {
        Self {
            restitution_coef: (restitution_a * restitution_b).max(0.0).sqrt(),
            static_friction_coef,
            dynamic_friction_coef,
        }
    }
}

impl Default for ContactResponseParameters {
    fn default() -> Self {
        Self {
            restitution_coef: 0.0,
            static_friction_coef: 0.5,
            dynamic_friction_coef: 0.2,
        }
    }
}

impl TwoBodyConstraint for Contact {
    type Prepared = PreparedContact;

    fn prepare(&self, body_a: &ConstrainedBody, body_b: &ConstrainedBody) -> PreparedContact {
        let local_position_on_a =
            body_a.transform_point_from_world_to_body_frame(&self.geometry.position_on_a());
        let local_position_on_b =
            body_b.transform_point_from_world_to_body_frame(&self.geometry.position_on_b());

        // Displacements from each center of mass to the reference contact
        // point, which is taken to lie on body B
        let disp_a = self.geometry.position - body_a.position;
        let disp_b = self.geometry.position - body_b.position;

        let normal = self.geometry.surface_normal;
        let (tangent, bitangent) = construct_tangent_vectors(&normal);

        let effective_mass =
            |direction| compute_effective_mass(body_a, body_b, &disp_a, &disp_b, direction);

        let ContactResponseParameters {
            restitution_coef,
            static_friction_coef,
            dynamic_friction_coef,
        } = self.response_params;

        // The body velocities have not been advanced by the external forces
        // yet, so this is the slip and approach velocity of the previous step
        let relative_velocity =
            compute_point_velocity(body_a, &disp_a) - compute_point_velocity(body_b, &disp_b);

        let slip_speed_squared =
            tangent.dot(&relative_velocity).powi(2) + bitangent.dot(&relative_velocity).powi(2);
        let friction_coef = if slip_speed_squared < 1e-4 {
            static_friction_coef
        } else {
            dynamic_friction_coef
        };

        let approach_speed = -relative_velocity.dot(&normal);
        let restitution_coef = if approach_speed > self.restitution_threshold {
            restitution_coef
        } else {
            0.0
        };

        PreparedContact {
            local_position_on_a,
            local_position_on_b,
            normal,
            tangent,
            bitangent,
            effective_mass_normal: effective_mass(&normal),
            effective_mass_tangent: effective_mass(&tangent),
            effective_mass_bitangent: effective_mass(&bitangent),
            restitution_coef,
            friction_coef,
        }
    }
}

impl PreparedTwoBodyConstraint for PreparedContact {
    type Impulses = ContactImpulses;

    fn can_use_warm_impulses_from(&self, other: &Self) -> bool {
        // `max_deviation_angle = acos(1 - threshold)`
        const THRESHOLD: fph = 1e-2;

        // The tangent must be checked too, as a slightly tilted normal may
        // flip the tangents
        self.normal.dot(other.normal.as_ref()) > 1.0 - THRESHOLD
            && self.tangent.dot(other.tangent.as_ref()) > 1.0 - THRESHOLD
    }

    fn compute_impulses(
        &self,
        body_a: &ConstrainedBody,
        body_b: &ConstrainedBody,
    ) -> ContactImpulses {
        let position_on_b =
            body_b.transform_point_from_body_to_world_frame(&self.local_position_on_b);
        let disp_a = position_on_b - body_a.position;
        let disp_b = position_on_b - body_b.position;

        let relative_velocity =
            compute_point_velocity(body_a, &disp_a) - compute_point_velocity(body_b, &disp_b);

        let separating_velocity = self.normal.dot(&relative_velocity);

        ContactImpulses {
            // Separating bodies need no normal impulse
            normal: -self.effective_mass_normal
                * (1.0 + self.restitution_coef)
                * separating_velocity.min(0.0),
            tangent: -self.effective_mass_tangent * self.tangent.dot(&relative_velocity),
            bitangent: -self.effective_mass_bitangent * self.bitangent.dot(&relative_velocity),
        }
    }

    fn clamp_impulses(&self, impulses: ContactImpulses) -> ContactImpulses {
        let normal = impulses.normal.max(0.0);

        // Coulomb's law in impulse form
        let max_tangent_impulse_magnitude = self.friction_coef * normal;
        let tangent_impulse_magnitude = impulses.tangent.hypot(impulses.bitangent);

        let tangent_impulse_scaling = if tangent_impulse_magnitude > max_tangent_impulse_magnitude
        {
            max_tangent_impulse_magnitude / tangent_impulse_magnitude
        } else {
            1.0
        };

        ContactImpulses {
            normal,
            tangent: impulses.tangent * tangent_impulse_scaling,
            bitangent: impulses.bitangent * tangent_impulse_scaling,
        }
    }

    fn apply_impulses_to_body_pair(
        &self,
        body_a: &mut ConstrainedBody,
        body_b: &mut ConstrainedBody,
        impulses: ContactImpulses,
    ) {
        let momentum_change = impulses.normal * self.normal.into_inner()
            + impulses.tangent * self.tangent.into_inner()
            + impulses.bitangent * self.bitangent.into_inner();

        let position_on_b =
            body_b.transform_point_from_body_to_world_frame(&self.local_position_on_b);
        let disp_a = position_on_b - body_a.position;
        let disp_b = position_on_b - body_b.position;

        body_a.velocity += body_a.inverse_mass * momentum_change;
        body_b.velocity -= body_b.inverse_mass * momentum_change;

        body_a.angular_velocity += body_a.inverse_inertia_tensor * disp_a.cross(&momentum_change);
        body_b.angular_velocity -= body_b.inverse_inertia_tensor * disp_b.cross(&momentum_change);
    }

    fn apply_positional_correction_to_body_pair(
        &self,
        body_a: &mut ConstrainedBody,
        body_b: &mut ConstrainedBody,
        correction_factor: fph,
    ) {
        // Collision detection is not rerun while correcting, so the contact
        // points are assumed fixed on each body and the normal fixed in world
        // space
        let position_on_a =
            body_a.transform_point_from_body_to_world_frame(&self.local_position_on_a);
        let position_on_b =
            body_b.transform_point_from_body_to_world_frame(&self.local_position_on_b);

        let penetration_depth = self.normal.dot(&(position_on_b - position_on_a));
        if penetration_depth <= 0.0 {
            return;
        }

        let disp_a = position_on_b - body_a.position;
        let disp_b = position_on_b - body_b.position;

        let effective_mass = compute_effective_mass(body_a, body_b, &disp_a, &disp_b, &self.normal);

        // The pseudo impulse would move the bodies apart by the given
        // fraction of the penetration over one step. Positions are changed
        // directly so no kinetic energy is added.
        let pseudo_momentum_change =
            (effective_mass * correction_factor * penetration_depth) * self.normal.into_inner();

        body_a.apply_pseudo_impulse(&pseudo_momentum_change, &disp_a);
        body_b.apply_pseudo_impulse(&-pseudo_momentum_change, &disp_b);
    }

    fn squared_impulse_magnitude(impulses: &ContactImpulses) -> fph {
        impulses.normal.powi(2) + impulses.tangent.powi(2) + impulses.bitangent.powi(2)
    }
}

impl Zero for ContactImpulses {
    fn zero() -> Self {
        Self::default()
    }

    fn is_zero(&self) -> bool {
        self.normal == 0.0 && self.tangent == 0.0 && self.bitangent == 0.0
    }
}

impl Add for ContactImpulses {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            normal: self.normal + rhs.normal,
            tangent: self.tangent + rhs.tangent,
            bitangent: self.bitangent + rhs.bitangent,
        }
    }
}

impl Sub for ContactImpulses {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            normal: self.normal - rhs.normal,
            tangent: self.tangent - rhs.tangent,
            bitangent: self.bitangent - rhs.bitangent,
        }
    }
}

impl Mul<fph> for ContactImpulses {
    type Output = Self;

    fn mul(self, rhs: fph) -> Self::Output {
        Self {
            normal: self.normal * rhs,
            tangent: self.tangent * rhs,
            bitangent: self.bitangent * rhs,
        }
    }
}

fn compute_point_velocity(body: &ConstrainedBody, disp: &Vector3<fph>) -> Velocity {
    body.velocity + body.angular_velocity.cross(disp)
}

pub(super) fn compute_effective_mass(
    body_a: &ConstrainedBody,
    body_b: &ConstrainedBody,
    disp_a: &Vector3<fph>,
    disp_b: &Vector3<fph>,
    direction: &UnitVector3<fph>,
) -> fph {
    let disp_a_cross_dir = disp_a.cross(direction.as_ref());
    let disp_b_cross_dir = disp_b.cross(direction.as_ref());

    let inverse_effective_mass = body_a.inverse_mass
        + body_b.inverse_mass
        + disp_a_cross_dir.dot(&(body_a.inverse_inertia_tensor * disp_a_cross_dir))
        + disp_b_cross_dir.dot(&(body_b.inverse_inertia_tensor * disp_b_cross_dir));

    // Two immovable bodies cannot be pushed apart
    if inverse_effective_mass > 0.0 {
        inverse_effective_mass.recip()
    } else {
        0.0
    }
}

pub(super) fn construct_tangent_vectors(
    surface_normal: &UnitVector3<fph>,
) -> (UnitVector3<fph>, UnitVector3<fph>) {
    const INV_SQRT_THREE: fph = 0.577_350_269_189_625_8;

    let tangent = UnitVector3::new_normalize(if surface_normal.x.abs() < INV_SQRT_THREE {
        // The normal is close to the yz-plane, so its projection onto that
        // plane rotated by 90 degrees is far from parallel with it
        Vector3::new(0.0, surface_normal.z, -surface_normal.y)
    } else {
        Vector3::new(surface_normal.y, -surface_normal.x, 0.0)
    });

    let bitangent = UnitVector3::new_unchecked(surface_normal.cross(tangent.as_ref()));

    (tangent, bitangent)
}
