/// Movement-triggered position beacons.
///
/// A node announces its position on the first valid fix of the session and
/// afterwards only when it has moved at least the configured threshold from
/// the last announced point. Elapsed time alone never triggers a beacon.

/// Mean Earth radius used for great-circle distances (meters).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A valid GPS fix in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub lat: f64,
    pub lon: f64,
}

impl Fix {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl From<Fix> for crate::protocol::Position {
    fn from(fix: Fix) -> Self {
        Self {
            lat: fix.lat as f32,
            lon: fix.lon as f32,
        }
    }
}

/// Pull-based GPS collaborator.
pub trait PositionSource {
    /// Current fix, or `None` when there is no valid fix.
    fn current_fix(&mut self) -> Option<Fix>;
}

/// Position source for nodes without a GPS module. Absence is permanent for
/// the session.
pub struct GpsUnavailable;

impl PositionSource for GpsUnavailable {
    fn current_fix(&mut self) -> Option<Fix> {
        None
    }
}

/// Great-circle distance in meters (haversine formula).
pub fn distance_m(a: &Fix, b: &Fix) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let s_phi = libm::sin(d_phi / 2.0);
    let s_lambda = libm::sin(d_lambda / 2.0);
    let h = s_phi * s_phi + libm::cos(phi1) * libm::cos(phi2) * s_lambda * s_lambda;
    let c = 2.0 * libm::atan2(libm::sqrt(h), libm::sqrt(1.0 - h));

    EARTH_RADIUS_M * c
}

/// Whether `current` warrants a beacon given the last announced position.
///
/// `None` for `last` means nothing has been announced yet this session.
/// The threshold is inclusive.
pub fn should_beacon(current: &Fix, last: Option<&Fix>, threshold_m: f64) -> bool {
    match last {
        None => true,
        Some(last) => distance_m(last, current) >= threshold_m,
    }
}

/// Owns the last-beacon state. Only the control loop touches it.
#[derive(Debug, Clone)]
pub struct BeaconController {
    threshold_m: f64,
    last: Option<Fix>,
}

impl BeaconController {
    pub const fn new(threshold_m: f64) -> Self {
        Self {
            threshold_m,
            last: None,
        }
    }

    pub fn last_beacon(&self) -> Option<&Fix> {
        self.last.as_ref()
    }

    /// Check `fix` and, when a beacon is due, record it as the new last
    /// position and return it for broadcast.
    pub fn update(&mut self, fix: Fix) -> Option<Fix> {
        if !should_beacon(&fix, self.last.as_ref(), self.threshold_m) {
            return None;
        }
        self.last = Some(fix);
        Some(fix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Point `meters` due north of `from` along the meridian.
    fn north_of(from: Fix, meters: f64) -> Fix {
        Fix::new(from.lat + (meters / EARTH_RADIUS_M).to_degrees(), from.lon)
    }

    const BASE: Fix = Fix::new(44.0521, -123.0868);

    #[test]
    fn first_fix_always_beacons() {
        assert!(should_beacon(&BASE, None, 25.0));
        assert!(should_beacon(&Fix::new(0.0, 0.0), None, 25.0));
    }

    #[test]
    fn same_point_never_beacons() {
        assert!(!should_beacon(&BASE, Some(&BASE), 25.0));
    }

    #[test]
    fn threshold_boundary() {
        let over = north_of(BASE, 25.01);
        let under = north_of(BASE, 24.99);
        assert!(should_beacon(&over, Some(&BASE), 25.0));
        assert!(!should_beacon(&under, Some(&BASE), 25.0));
    }

    #[test]
    fn haversine_known_distance() {
        // One degree of longitude on the equator.
        let d = distance_m(&Fix::new(0.0, 0.0), &Fix::new(0.0, 1.0));
        assert!((d - 111_194.93).abs() < 1.0, "got {d}");
    }

    #[test]
    fn haversine_is_symmetric() {
        let other = Fix::new(44.0600, -123.1000);
        let ab = distance_m(&BASE, &other);
        let ba = distance_m(&other, &BASE);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn controller_tracks_last_beacon() {
        let mut ctl = BeaconController::new(25.0);
        assert_eq!(ctl.update(BASE), Some(BASE));
        assert_eq!(ctl.last_beacon(), Some(&BASE));

        // Small drift: no beacon, last position unchanged.
        let drift = north_of(BASE, 10.0);
        assert_eq!(ctl.update(drift), None);
        assert_eq!(ctl.last_beacon(), Some(&BASE));

        // Movement is measured from the last beacon, not the last fix.
        let moved = north_of(BASE, 30.0);
        assert_eq!(ctl.update(moved), Some(moved));
        assert_eq!(ctl.last_beacon(), Some(&moved));
    }

    #[test]
    fn gps_unavailable_never_has_a_fix() {
        let mut gps = GpsUnavailable;
        assert!(gps.current_fix().is_none());
    }
}
