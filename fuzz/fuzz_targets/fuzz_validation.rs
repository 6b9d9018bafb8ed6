//! Fuzz testing for query parameter parsing.
//!
//! Every parser must return a value or an error for any input, never panic.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use walk_archive::validation::{
    comma_terms, is_iso_date, is_month, month_of, parse_index, parse_offset_seconds,
    parse_point, parse_positive_count, parse_radius, parse_time_bound, plate_key,
    validate_video_id,
};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if is_iso_date(s) {
        let _ = month_of(s);
    }
    let _ = is_month(s);
    let _ = parse_time_bound(s);
    let _ = parse_point(s, "targetPoint");
    if let Ok(radius) = parse_radius(s, "radius") {
        assert!(radius.is_finite() && radius >= 0.0);
    }
    let _ = parse_index(s);
    let _ = parse_positive_count(s, "filterByCount");
    let _ = validate_video_id(s);
    let _ = parse_offset_seconds(s);
    let _ = comma_terms(s);

    let key = plate_key(s);
    assert!(key.chars().all(char::is_alphanumeric));
});
