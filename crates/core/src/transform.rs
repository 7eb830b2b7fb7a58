// SPDX-License-Identifier: Apache-2.0

//! Coordinate transforms between the IAB unit cube and the VBAP sphere
//!
//! The bitstream addresses positions in a unit cube: x in [0,1] left to
//! right, y in [0,1] screen to rear, z in [0,1] floor to ceiling. The
//! panner works on the unit sphere with +x right, +y front, +z up. Cube
//! surface and sphere surface are mapped onto each other through the
//! signed cube [-1,1]^3: sphere directions scale onto the cube by the
//! largest coordinate magnitude, cube points project back by
//! normalization. Both directions are deterministic and are applied once
//! per speaker at configuration load and once per sub-block position
//! while rendering.

use serde::{Deserialize, Serialize};

use crate::geometry::Vector3;

/// Position inside the IAB unit cube, components in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct CubePosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl CubePosition {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Chebyshev (L-infinity) distance to another cube position.
    ///
    /// Used by the snap-speaker search, which compares each axis
    /// separately against the snap tolerance.
    pub fn chebyshev_distance(&self, other: &CubePosition) -> f32 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
    }
}

/// IAB unit-cube position to VBAP unit-sphere direction.
pub fn cube_to_sphere(pos: &CubePosition) -> Vector3 {
    // Listener at the centre of the floor plane: (0.5, 0.5, 0).
    let v = Vector3::new(
        pos.x.clamp(0.0, 1.0) * 2.0 - 1.0,
        1.0 - pos.y.clamp(0.0, 1.0) * 2.0,
        pos.z.clamp(0.0, 1.0),
    );
    let n = v.normalized();
    if n.norm() == 0.0 {
        // Cube centre has no direction; treat as screen-front.
        Vector3::new(0.0, 1.0, 0.0)
    } else {
        n
    }
}

/// VBAP unit-sphere direction to IAB unit-cube position.
///
/// The direction is pushed out to the signed cube surface by its largest
/// coordinate magnitude, then shifted into [0,1] ranges. Inverse of
/// [`cube_to_sphere`] on the cube surface.
pub fn sphere_to_cube(dir: &Vector3) -> CubePosition {
    let d = dir.normalized();
    let max_mag = d.x.abs().max(d.y.abs()).max(d.z.abs());
    if max_mag == 0.0 {
        return CubePosition::new(0.5, 0.5, 0.0);
    }

    let on_cube = d.scale(1.0 / max_mag);
    CubePosition::new(
        ((on_cube.x + 1.0) * 0.5).clamp(0.0, 1.0),
        ((1.0 - on_cube.y) * 0.5).clamp(0.0, 1.0),
        on_cube.z.clamp(0.0, 1.0),
    )
}
