//! Row-vector 4x4 matrices for the transform constants.
//!
//! Vectors are multiplied on the left (`v * M`), so translations live in the last row. Matrices
//! are uploaded row by row as four `Vec4` constants.

use bytemuck::{Pod, Zeroable};

#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vec4 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }

    pub fn transform(self, m: &Mat4) -> Self {
        let v = self.to_array();
        let mut out = [0.0f32; 4];
        for (col, slot) in out.iter_mut().enumerate() {
            *slot = (0..4).map(|row| v[row] * m.rows[row][col]).sum();
        }
        Self::new(out[0], out[1], out[2], out[3])
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Mat4 {
    pub rows: [[f32; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Self = Self {
        rows: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn multiply(&self, rhs: &Mat4) -> Mat4 {
        let mut out = [[0.0f32; 4]; 4];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.rows[i][k] * rhs.rows[k][j]).sum();
            }
        }
        Mat4 { rows: out }
    }

    pub fn translation(x: f32, y: f32, z: f32) -> Mat4 {
        let mut m = Mat4::IDENTITY;
        m.rows[3] = [x, y, z, 1.0];
        m
    }

    pub fn rotation_x(radians: f32) -> Mat4 {
        let (s, c) = radians.sin_cos();
        Mat4 {
            rows: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, c, s, 0.0],
                [0.0, -s, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn rotation_y(radians: f32) -> Mat4 {
        let (s, c) = radians.sin_cos();
        Mat4 {
            rows: [
                [c, 0.0, -s, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [s, 0.0, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn rotation_z(radians: f32) -> Mat4 {
        let (s, c) = radians.sin_cos();
        Mat4 {
            rows: [
                [c, s, 0.0, 0.0],
                [-s, c, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// World → view transform for a camera at `position` with Euler angles `rotation` (radians).
    pub fn world_view(position: Vec4, rotation: Vec4) -> Mat4 {
        Mat4::translation(-position.x, -position.y, -position.z)
            .multiply(&Mat4::rotation_z(-rotation.z))
            .multiply(&Mat4::rotation_y(-rotation.y))
            .multiply(&Mat4::rotation_x(-rotation.x))
    }

    /// Right-handed perspective projection into clip space (`z` in `[0, 1]` after divide).
    pub fn view_screen(aspect: f32, fov_y_degrees: f32, z_near: f32, z_far: f32) -> Mat4 {
        let y_scale = 1.0 / (fov_y_degrees.to_radians() * 0.5).tan();
        let x_scale = y_scale / aspect;
        let depth = z_far / (z_near - z_far);
        Mat4 {
            rows: [
                [x_scale, 0.0, 0.0, 0.0],
                [0.0, y_scale, 0.0, 0.0],
                [0.0, 0.0, depth, -1.0],
                [0.0, 0.0, z_near * depth, 0.0],
            ],
        }
    }

    /// Clip space → window coordinates, with depth scaled into `[z_min, z_max]`.
    pub fn viewport(x: f32, y: f32, width: f32, height: f32, z_min: f32, z_max: f32) -> Mat4 {
        Mat4 {
            rows: [
                [width * 0.5, 0.0, 0.0, 0.0],
                [0.0, -height * 0.5, 0.0, 0.0],
                [0.0, 0.0, z_max - z_min, 0.0],
                [x + width * 0.5, y + height * 0.5, z_min, 1.0],
            ],
        }
    }

    pub fn row_vectors(&self) -> [Vec4; 4] {
        self.rows.map(|[x, y, z, w]| Vec4::new(x, y, z, w))
    }
}

/// Everything uploaded to the transform constant bank each frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransformSet {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec4,
    pub light_direction: Vec4,
}

impl TransformSet {
    pub fn new(
        display_width: u32,
        display_height: u32,
        fov_y_degrees: f32,
        z_near: f32,
        z_far: f32,
    ) -> Self {
        let camera_position = Vec4::new(0.0, 0.0, 1.0, 1.0);
        let camera_rotation = Vec4::new(0.0, 0.0, 0.0, 1.0);
        let (w, h) = (display_width as f32, display_height as f32);

        let projection = Mat4::view_screen(w / h, fov_y_degrees, z_near, z_far)
            .multiply(&Mat4::viewport(0.0, 0.0, w, h, 0.0, 0xFF_FFFF as f32));

        Self {
            model: Mat4::IDENTITY,
            view: Mat4::world_view(camera_position, camera_rotation),
            projection,
            camera_position,
            light_direction: Vec4::new(0.0, 0.0, 1.0, 1.0),
        }
    }

    /// Constants in upload order: model, view, projection rows, camera, light, reserved zero.
    pub fn constants(&self) -> Vec<Vec4> {
        let mut out = Vec::with_capacity(15);
        out.extend(self.model.row_vectors());
        out.extend(self.view.row_vectors());
        out.extend(self.projection.row_vectors());
        out.push(self.camera_position);
        out.push(self.light_direction);
        out.push(Vec4::ZERO);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-3 * b.abs().max(1.0)
    }

    #[test]
    fn identity_is_neutral() {
        let m = Mat4::translation(1.0, 2.0, 3.0);
        assert_eq!(m.multiply(&Mat4::IDENTITY), m);
        assert_eq!(Mat4::IDENTITY.multiply(&m), m);
    }

    #[test]
    fn world_view_moves_camera_to_origin() {
        let view = Mat4::world_view(Vec4::new(0.0, 0.0, 1.0, 1.0), Vec4::new(0.0, 0.0, 0.0, 1.0));
        let p = Vec4::new(0.0, 0.0, 1.0, 1.0).transform(&view);
        assert_eq!(p, Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn projection_maps_view_axis_to_screen_centre() {
        let t = TransformSet::new(640, 480, 60.0, 1.0, 10000.0);
        // Origin is one unit in front of the camera.
        let clip = Vec4::new(0.0, 0.0, 0.0, 1.0)
            .transform(&t.model)
            .transform(&t.view)
            .transform(&t.projection);
        assert!(approx(clip.x / clip.w, 320.0));
        assert!(approx(clip.y / clip.w, 240.0));
        assert!(clip.w > 0.0);
    }

    #[test]
    fn constants_are_ordered_and_padded() {
        let t = TransformSet::new(640, 480, 60.0, 1.0, 10000.0);
        let c = t.constants();
        assert_eq!(c.len(), 15);
        assert_eq!(c[0], Vec4::new(1.0, 0.0, 0.0, 0.0));
        assert_eq!(c[12], t.camera_position);
        assert_eq!(c[13], t.light_direction);
        assert_eq!(c[14], Vec4::ZERO);
    }
}
