//! Narrow phase collision detection between rigid body shapes.

use crate::{
    fph,
    geometry::Shape,
    quantities::{Pose, Position},
    world::{
        RigidBodyID,
        constraint::contact::{ContactGeometry, ContactID, ContactManifold, ContactWithID},
    },
};
use nalgebra::UnitVector3;

/// Contacts beyond this number per body pair are discarded, keeping the
/// deepest ones.
const MAX_CONTACTS_PER_PAIR: usize = 8;

/// A shape placed in the world, tagged with the body it belongs to.
#[derive(Clone, Copy, Debug)]
pub struct PlacedShape<'a> {
    pub body: RigidBodyID,
    pub shape: &'a Shape,
    pub pose: Pose,
}

/// Whether the bounding volumes of the two shapes overlap.
pub fn bounding_volumes_overlap(a: &PlacedShape<'_>, b: &PlacedShape<'_>) -> bool {
    match (a.shape, b.shape) {
        (Shape::Plane, Shape::Plane) => false,
        (Shape::Plane, _) => plane_distance(a, &center(b)) < b.shape.bounding_radius(),
        (_, Shape::Plane) => plane_distance(b, &center(a)) < a.shape.bounding_radius(),
        _ => {
            (center(a) - center(b)).norm()
                < a.shape.bounding_radius() + b.shape.bounding_radius()
        }
    }
}

/// Determines the contacts between the two shapes and adds them to the
/// given manifold.
///
/// Spheres are handled exactly by evaluating the other shape's signed
/// distance at the sphere center. Other pairs test the collision sample
/// points of each shape against the signed distance of the other.
pub fn detect_contacts(a: &PlacedShape<'_>, b: &PlacedShape<'_>, manifold: &mut ContactManifold) {
    if !bounding_volumes_overlap(a, b) {
        return;
    }

    let mut contacts = Vec::new();

    match (a.shape, b.shape) {
        (Shape::Plane, Shape::Plane) => {}
        (Shape::Sphere { radius }, _) => {
            let sphere_center = center(a);
            let (distance, normal) = signed_distance(b, &sphere_center);
            if distance < *radius {
                contacts.push((
                    0,
                    ContactGeometry {
                        position: sphere_center - distance * normal.into_inner(),
                        surface_normal: normal,
                        penetration_depth: radius - distance,
                    },
                ));
            }
        }
        (_, Shape::Sphere { radius }) => {
            let sphere_center = center(b);
            let (distance, normal) = signed_distance(a, &sphere_center);
            if distance < *radius {
                contacts.push((
                    0,
                    ContactGeometry {
                        position: sphere_center - *radius * normal.into_inner(),
                        surface_normal: -normal,
                        penetration_depth: radius - distance,
                    },
                ));
            }
        }
        _ => {
            // Points of A inside B
            for (idx, local_point) in a.shape.collision_sample_points().iter().enumerate() {
                let point = a.pose.transform_point(local_point);
                let (distance, normal) = signed_distance(b, &point);
                if distance < 0.0 {
                    contacts.push((
                        2 * idx,
                        ContactGeometry {
                            position: point - distance * normal.into_inner(),
                            surface_normal: normal,
                            penetration_depth: -distance,
                        },
                    ));
                }
            }
            // Points of B inside A
            for (idx, local_point) in b.shape.collision_sample_points().iter().enumerate() {
                let point = b.pose.transform_point(local_point);
                let (distance, normal) = signed_distance(a, &point);
                if distance < 0.0 {
                    contacts.push((
                        2 * idx + 1,
                        ContactGeometry {
                            position: point,
                            surface_normal: -normal,
                            penetration_depth: -distance,
                        },
                    ));
                }
            }
        }
    }

    if contacts.len() > MAX_CONTACTS_PER_PAIR {
        contacts.sort_by(|(idx_a, contact_a), (idx_b, contact_b)| {
            contact_b
                .penetration_depth
                .total_cmp(&contact_a.penetration_depth)
                .then(idx_a.cmp(idx_b))
        });
        contacts.truncate(MAX_CONTACTS_PER_PAIR);
    }

    for (feature_idx, geometry) in contacts {
        manifold.add_contact(ContactWithID {
            id: ContactID::from_two_u32_and_n_indices(
                a.body.0.idx(),
                b.body.0.idx(),
                [feature_idx],
            ),
            geometry,
        });
    }
}

fn center(placed: &PlacedShape<'_>) -> Position {
    Position::from(placed.pose.translation.vector)
}

fn plane_distance(plane: &PlacedShape<'_>, point: &Position) -> fph {
    plane.pose.inverse_transform_point(point).z
}

/// Computes the signed distance from the world space point to the surface
/// of the placed shape, along with the world space outward normal.
fn signed_distance(placed: &PlacedShape<'_>, point: &Position) -> (fph, UnitVector3<fph>) {
    let surface_distance = placed
        .shape
        .surface_distance(&placed.pose.inverse_transform_point(point));
    (
        surface_distance.distance,
        placed.pose.rotation * surface_distance.normal,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use hydrosim_utils::Arena;
    use nalgebra::{Vector3, point, vector};

    fn two_ids() -> (RigidBodyID, RigidBodyID) {
        let mut arena = Arena::new();
        (RigidBodyID(arena.insert(())), RigidBodyID(arena.insert(())))
    }

    fn detect(shape_a: &Shape, pose_a: Pose, shape_b: &Shape, pose_b: Pose) -> ContactManifold {
        let (id_a, id_b) = two_ids();
        let mut manifold = ContactManifold::new();
        detect_contacts(
            &PlacedShape {
                body: id_a,
                shape: shape_a,
                pose: pose_a,
            },
            &PlacedShape {
                body: id_b,
                shape: shape_b,
                pose: pose_b,
            },
            &mut manifold,
        );
        manifold
    }

    #[test]
    fn sphere_resting_in_plane_gets_one_contact() {
        let manifold = detect(
            &Shape::Sphere { radius: 0.5 },
            Pose::translation(0.0, 0.0, 0.45),
            &Shape::Plane,
            Pose::identity(),
        );
        assert_eq!(manifold.contacts().len(), 1);
        let geometry = manifold.contacts()[0].geometry;
        assert_abs_diff_eq!(geometry.penetration_depth, 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(geometry.surface_normal.into_inner(), Vector3::z(), epsilon = 1e-12);
        assert_abs_diff_eq!(geometry.position, Position::origin(), epsilon = 1e-12);
        assert_abs_diff_eq!(geometry.position_on_a(), point![0.0, 0.0, -0.05], epsilon = 1e-12);
    }

    #[test]
    fn plane_against_sphere_flips_normal() {
        let manifold = detect(
            &Shape::Plane,
            Pose::identity(),
            &Shape::Sphere { radius: 0.5 },
            Pose::translation(0.0, 0.0, 0.45),
        );
        let geometry = manifold.contacts()[0].geometry;
        assert_abs_diff_eq!(geometry.surface_normal.into_inner(), -Vector3::z(), epsilon = 1e-12);
        assert_abs_diff_eq!(geometry.position, point![0.0, 0.0, -0.05], epsilon = 1e-12);
        assert_abs_diff_eq!(geometry.position_on_a(), Position::origin(), epsilon = 1e-12);
    }

    #[test]
    fn separated_spheres_do_not_touch() {
        let manifold = detect(
            &Shape::Sphere { radius: 0.5 },
            Pose::translation(0.0, 0.0, 0.0),
            &Shape::Sphere { radius: 0.5 },
            Pose::translation(1.01, 0.0, 0.0),
        );
        assert!(manifold.is_empty());
    }

    #[test]
    fn box_sunk_into_plane_touches_with_bottom_corners() {
        let manifold = detect(
            &Shape::Box {
                half_extents: vector![0.5, 0.5, 0.5],
            },
            Pose::translation(0.0, 0.0, 0.49),
            &Shape::Plane,
            Pose::identity(),
        );
        assert_eq!(manifold.contacts().len(), 4);
        for contact in manifold.contacts() {
            assert_abs_diff_eq!(contact.geometry.penetration_depth, 0.01, epsilon = 1e-12);
            assert_abs_diff_eq!(contact.geometry.position.z, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn contact_ids_are_stable_between_detections() {
        let shape = Shape::Box {
            half_extents: vector![0.5, 0.5, 0.5],
        };
        let at_height = |z| {
            detect(&shape, Pose::translation(0.0, 0.0, z), &Shape::Plane, Pose::identity())
        };
        let first = at_height(0.49);
        let second = at_height(0.48);
        let ids = |manifold: &ContactManifold| {
            manifold.contacts().iter().map(|contact| contact.id).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn number_of_contacts_per_pair_is_bounded() {
        let manifold = detect(
            &Shape::Cylinder {
                radius: 0.5,
                length: 1.0,
            },
            Pose::translation(0.0, 0.0, 0.49),
            &Shape::Plane,
            Pose::identity(),
        );
        assert_eq!(manifold.contacts().len(), MAX_CONTACTS_PER_PAIR);
    }
}
