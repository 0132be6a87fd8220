//! Wet Bulb Globe Temperature approximations from 2 m temperature and dew point.
//!
//! Neither formula needs radiation or wind inputs, so both are screening-level
//! estimates. The approximation in use is chosen per run through
//! [`WbgtApproximation`] in the hazard configuration.

use serde::{Deserialize, Serialize};

const KELVIN_OFFSET: f32 = 273.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WbgtApproximation {
    /// Australian Bureau of Meteorology simplified WBGT:
    /// `0.567·Ta + 0.393·e + 3.94`, with `e` from the Magnus formula.
    #[default]
    Bom,
    /// Shaded WBGT `0.7·Tw + 0.3·Ta`, with `Tw` from Stull (2011).
    StullShade,
}

impl WbgtApproximation {
    /// WBGT in °C from temperature and dew point in kelvin.
    pub fn wbgt_c(self, temp_k: f32, dewpoint_k: f32) -> f32 {
        let ta = temp_k - KELVIN_OFFSET;
        let td = dewpoint_k - KELVIN_OFFSET;
        match self {
            WbgtApproximation::Bom => 0.567 * ta + 0.393 * vapour_pressure_hpa(td) + 3.94,
            WbgtApproximation::StullShade => {
                let rh = relative_humidity_pct(ta, td);
                0.7 * stull_wet_bulb_c(ta, rh) + 0.3 * ta
            }
        }
    }
}

/// Magnus formula, vapour pressure in hPa from dew point in °C.
pub fn vapour_pressure_hpa(dewpoint_c: f32) -> f32 {
    6.112 * ((17.67 * dewpoint_c) / (dewpoint_c + 243.5)).exp()
}

/// Relative humidity (%) from temperature and dew point in °C, clamped to 0–100.
pub fn relative_humidity_pct(temp_c: f32, dewpoint_c: f32) -> f32 {
    (100.0 * vapour_pressure_hpa(dewpoint_c) / vapour_pressure_hpa(temp_c)).clamp(0.0, 100.0)
}

/// Stull (2011) empirical wet-bulb temperature (°C). Fitted for RH 5–99 %.
pub fn stull_wet_bulb_c(temp_c: f32, rh_pct: f32) -> f32 {
    let t = temp_c as f64;
    let rh = rh_pct.clamp(5.0, 99.0) as f64;
    let tw = t * (0.151977 * (rh + 8.313659).sqrt()).atan() + (t + rh).atan() - (rh - 1.676331).atan()
        + 0.00391838 * rh.powf(1.5) * (0.023101 * rh).atan()
        - 4.686035;
    tw as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn bom_hot_humid_cell_exceeds_30() {
        // 305 K / 298 K: e ≈ 31.4 hPa → WBGT ≈ 34.3 °C.
        let w = WbgtApproximation::Bom.wbgt_c(305.0, 298.0);
        assert_abs_diff_eq!(w, 34.34, epsilon = 0.1);
        assert!(w > 30.0);
    }

    #[test]
    fn magnus_at_zero_celsius() {
        assert_abs_diff_eq!(vapour_pressure_hpa(0.0), 6.112, epsilon = 1e-4);
    }

    #[test]
    fn saturated_air_has_full_humidity() {
        assert_abs_diff_eq!(relative_humidity_pct(25.0, 25.0), 100.0, epsilon = 1e-3);
    }

    #[test]
    fn stull_reference_point() {
        // Stull (2011): T = 20 °C, RH = 50 % → Tw ≈ 13.7 °C.
        assert_abs_diff_eq!(stull_wet_bulb_c(20.0, 50.0), 13.7, epsilon = 0.1);
    }

    #[test]
    fn shaded_wbgt_sits_between_wet_bulb_and_air_temperature() {
        let w = WbgtApproximation::StullShade.wbgt_c(305.0, 298.0);
        let ta = 305.0 - KELVIN_OFFSET;
        assert!(w < ta && w > ta - 10.0, "shaded WBGT {w:.2} out of range");
    }
}
