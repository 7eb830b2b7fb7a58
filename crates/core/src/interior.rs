// SPDX-License-Identifier: Apache-2.0

//! Extended-source expansion
//!
//! An object with non-zero aperture is rendered as up to three virtual
//! point sources spread around the primary direction. Side sources are
//! displaced along the horizontal axis orthogonal to the source
//! direction, by an angle proportional to the aperture; divergence pulls
//! them back toward the primary and shifts energy weight onto it. The
//! weights are power weights and always sum to one.

use crate::geometry::Vector3;
use crate::transform::{cube_to_sphere, CubePosition};

/// Aperture or divergence below this threshold renders as a point source.
const EXTENT_EPSILON: f32 = 1e-4;

/// Maximum number of virtual sources an extended source expands to.
pub const MAX_VIRTUAL_SOURCES: usize = 3;

/// One virtual VBAP source with its power weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VirtualSource {
    pub direction: Vector3,
    /// Power weight in [0, 1]; weights of one expansion sum to 1.
    pub weight: f32,
}

/// Expand an object position with aperture and divergence into virtual
/// sources. Zero aperture degenerates to a single source at the original
/// position regardless of divergence.
pub fn expand_source(
    position: &CubePosition,
    aperture: f32,
    divergence: f32,
) -> Vec<VirtualSource> {
    let primary = cube_to_sphere(position);
    let aperture = aperture.clamp(0.0, 1.0);
    let divergence = divergence.clamp(0.0, 1.0);

    if aperture <= EXTENT_EPSILON {
        return vec![VirtualSource {
            direction: primary,
            weight: 1.0,
        }];
    }

    let lateral = lateral_axis(&primary);
    // Side sources sit at +/- aperture * 90 degrees, pulled back toward
    // the primary as divergence rises.
    let half_angle = (aperture * 90.0).to_radians() * (1.0 - divergence);
    if half_angle <= EXTENT_EPSILON {
        return vec![VirtualSource {
            direction: primary,
            weight: 1.0,
        }];
    }

    let (sin_a, cos_a) = half_angle.sin_cos();
    let side_left = primary.scale(cos_a).sub(&lateral.scale(sin_a)).normalized();
    let side_right = primary.scale(cos_a).add(&lateral.scale(sin_a)).normalized();

    // Divergence shifts power toward the primary source; at zero the
    // three sources share power evenly.
    let primary_weight = (1.0 + 2.0 * divergence) / 3.0;
    let side_weight = (1.0 - primary_weight) / 2.0;

    vec![
        VirtualSource {
            direction: primary,
            weight: primary_weight,
        },
        VirtualSource {
            direction: side_left,
            weight: side_weight,
        },
        VirtualSource {
            direction: side_right,
            weight: side_weight,
        },
    ]
}

/// Horizontal axis orthogonal to the source direction. For a source at
/// the zenith any horizontal axis works; +x is used.
fn lateral_axis(direction: &Vector3) -> Vector3 {
    let up = Vector3::new(0.0, 0.0, 1.0);
    let lateral = direction.cross(&up);
    if lateral.norm() < 1e-6 {
        Vector3::new(1.0, 0.0, 0.0)
    } else {
        lateral.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_source_degenerates() {
        let sources = expand_source(&CubePosition::new(0.5, 0.0, 0.0), 0.0, 0.0);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].weight, 1.0);
        let front = cube_to_sphere(&CubePosition::new(0.5, 0.0, 0.0));
        assert_eq!(sources[0].direction, front);
    }

    #[test]
    fn test_full_divergence_collapses_spread() {
        let sources = expand_source(&CubePosition::new(0.5, 0.0, 0.0), 0.5, 1.0);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].weight, 1.0);
    }

    #[test]
    fn test_weights_sum_to_one() {
        for (aperture, divergence) in [(0.2, 0.0), (0.5, 0.3), (1.0, 0.7), (0.9, 0.0)] {
            let sources = expand_source(
                &CubePosition::new(0.3, 0.4, 0.2),
                aperture,
                divergence,
            );
            let total: f32 = sources.iter().map(|s| s.weight).sum();
            assert!((total - 1.0).abs() < 1e-6, "weights for a={aperture} d={divergence}");
            assert!(sources.len() <= MAX_VIRTUAL_SOURCES);
        }
    }

    #[test]
    fn test_side_sources_symmetric_about_primary() {
        let sources = expand_source(&CubePosition::new(0.5, 0.0, 0.0), 0.5, 0.0);
        assert_eq!(sources.len(), 3);
        let primary = sources[0].direction;
        let left_dot = sources[1].direction.dot(&primary);
        let right_dot = sources[2].direction.dot(&primary);
        assert!((left_dot - right_dot).abs() < 1e-5);
        // 45 degree spread at aperture 0.5.
        assert!((left_dot - 45.0f32.to_radians().cos()).abs() < 1e-4);
    }

    #[test]
    fn test_side_sources_unit_length() {
        let sources = expand_source(&CubePosition::new(0.2, 0.6, 0.5), 0.8, 0.1);
        for source in sources {
            assert!((source.direction.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_zenith_source_uses_fallback_axis() {
        let sources = expand_source(&CubePosition::new(0.5, 0.5, 1.0), 0.5, 0.0);
        assert_eq!(sources.len(), 3);
        // Side sources must not be collinear with the primary.
        assert!(sources[1].direction.dot(&sources[0].direction) < 0.999);
    }
}
