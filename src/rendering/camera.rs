//! Orbit camera: drag to orbit, scroll to zoom, smoothed toward targets.

use glam::{Mat4, Vec3};
use winit::dpi::PhysicalPosition;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

pub struct OrbitCamera {
    pub center: Vec3,
    pub distance: f32,
    pub target_distance: f32,
    yaw: f32,
    pitch: f32,
    target_yaw: f32,
    target_pitch: f32,

    is_dragging: bool,
    last_mouse_pos: Option<PhysicalPosition<f64>>,

    pub mouse_sensitivity: f32,
    pub zoom_speed: f32,
    pub smoothing: f32,
}

impl OrbitCamera {
    pub fn new(distance: f32) -> Self {
        Self {
            center: Vec3::ZERO,
            distance,
            target_distance: distance,
            yaw: 0.6,
            pitch: -0.5,
            target_yaw: 0.6,
            target_pitch: -0.5,
            is_dragging: false,
            last_mouse_pos: None,
            mouse_sensitivity: 0.005,
            zoom_speed: 1.1,
            smoothing: 12.0,
        }
    }

    /// Feed a window event; returns true if the camera consumed it.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state,
                ..
            } => {
                self.is_dragging = *state == ElementState::Pressed;
                if !self.is_dragging {
                    self.last_mouse_pos = None;
                }
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.is_dragging {
                    if let Some(last) = self.last_mouse_pos {
                        let dx = (position.x - last.x) as f32;
                        let dy = (position.y - last.y) as f32;
                        self.target_yaw += dx * self.mouse_sensitivity;
                        self.target_pitch = (self.target_pitch - dy * self.mouse_sensitivity)
                            .clamp(-1.5, 1.5);
                    }
                }
                self.last_mouse_pos = Some(*position);
                self.is_dragging
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 40.0,
                };
                self.target_distance =
                    (self.target_distance * self.zoom_speed.powf(-scroll)).clamp(2.0, 200.0);
                true
            }
            _ => false,
        }
    }

    /// Ease the pose toward its targets.
    pub fn update(&mut self, dt: f32) {
        let t = 1.0 - (-self.smoothing * dt).exp();
        self.yaw += (self.target_yaw - self.yaw) * t;
        self.pitch += (self.target_pitch - self.pitch) * t;
        self.distance += (self.target_distance - self.distance) * t;
    }

    pub fn eye(&self) -> Vec3 {
        let dir = Vec3::new(
            self.pitch.cos() * self.yaw.sin(),
            -self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        );
        self.center + dir * self.distance
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        let view = Mat4::look_at_rh(self.eye(), self.center, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, aspect, 0.1, 1000.0);
        proj * view
    }

    /// Billboard basis: camera-space right and up in world coordinates.
    pub fn basis(&self) -> (Vec3, Vec3) {
        let forward = (self.center - self.eye()).normalize();
        let right = forward.cross(Vec3::Y).normalize();
        let up = right.cross(forward);
        (right, up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothing_converges_on_the_targets() {
        let mut camera = OrbitCamera::new(30.0);
        camera.target_distance = 10.0;
        camera.target_yaw = 1.0;
        for _ in 0..240 {
            camera.update(1.0 / 60.0);
        }
        assert!((camera.distance - 10.0).abs() < 0.01);
        assert!((camera.yaw - 1.0).abs() < 0.001);
    }

    #[test]
    fn basis_is_orthonormal() {
        let camera = OrbitCamera::new(30.0);
        let (right, up) = camera.basis();
        assert!(right.dot(up).abs() < 1e-5);
        assert!((right.length() - 1.0).abs() < 1e-5);
        assert!((up.length() - 1.0).abs() < 1e-5);
    }
}
