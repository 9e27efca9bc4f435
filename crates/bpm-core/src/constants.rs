//! Physical constants used across the simulator.
//!
//! Central provider so that every noise and timing formula agrees on
//! the same values (CODATA 2018 where exact).

/// Boltzmann constant in J/K (exact since the 2019 SI redefinition).
pub const BOLTZMANN: f64 = 1.380_649e-23;

/// Speed of light in vacuum, m/s (exact).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Reference temperature for noise-factor definitions, Kelvin.
pub const REFERENCE_TEMPERATURE: f64 = 290.0;

/// Thermal noise power spectral density `k * T0` at the reference
/// temperature, W/Hz. About -174 dBm/Hz.
pub const KT0: f64 = BOLTZMANN * REFERENCE_TEMPERATURE;
