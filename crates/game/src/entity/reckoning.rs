//! Dead reckoning for late snapshots. Only spatial fields are advanced;
//! everything else in a snapshot is taken verbatim.

use std::f32::consts::TAU;

use glam::Vec2;

use crate::net::STATE_PRECISION;

pub fn elapsed_secs(latency_ms: f64) -> f32 {
    (latency_ms / 1000.0) as f32
}

/// Wraps an angle into `[0, 2π)`.
pub fn normalize_rotation(angle: f32) -> f32 {
    let normalized = angle.rem_euclid(TAU);
    if normalized >= TAU { 0.0 } else { normalized }
}

pub fn advance_position(position: Vec2, velocity: Vec2, latency_ms: f64) -> Vec2 {
    position + velocity * elapsed_secs(latency_ms)
}

pub fn advance_rotation(rotation: f32, angular_velocity: f32, latency_ms: f64) -> f32 {
    normalize_rotation(rotation + angular_velocity * elapsed_secs(latency_ms))
}

/// Integrates constant acceleration over the gap, moving the position with
/// the mean of the old and new velocity so the replica does not snap.
/// Returns `(position, velocity)`.
pub fn advance_with_thrust(
    position: Vec2,
    velocity: Vec2,
    acceleration: Vec2,
    max_speed: f32,
    latency_ms: f64,
) -> (Vec2, Vec2) {
    let dt = elapsed_secs(latency_ms);
    let new_velocity = (velocity + acceleration * dt).clamp_length_max(max_speed);
    let mean_velocity = (velocity + new_velocity) * 0.5;
    (position + mean_velocity * dt, new_velocity)
}

pub fn round_to(value: f32) -> f32 {
    let scale = 10f32.powi(STATE_PRECISION);
    (value * scale).round() / scale
}

pub fn round_vec(value: Vec2) -> Vec2 {
    Vec2::new(round_to(value.x), round_to(value.y))
}
