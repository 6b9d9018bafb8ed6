//! Fuzz testing for coordinate parsing from archive JSON and query strings.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_coordinates -- -max_total_time=60
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use walk_archive::geo::Coordinate;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(point) = Coordinate::parse_pair(s)
    {
        assert!((-90.0..=90.0).contains(&point.lat));
        assert!((-180.0..=180.0).contains(&point.lon));
    }

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = Coordinate::from_value(&value);
    }
});
