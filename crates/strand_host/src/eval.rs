//! Animation curve evaluation

use strand_core::{Interpolation, Key};

/// Evaluate sorted `keys` at `time`
///
/// Holds the first and last values outside the keyed range. The
/// interpolation of the earlier key governs each segment.
pub fn evaluate(keys: &[Key], time: f64) -> f64 {
    let (first, last) = match (keys.first(), keys.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };
    if time <= first.time {
        return first.value;
    }
    if time >= last.time {
        return last.value;
    }

    let i = keys.partition_point(|k| k.time <= time) - 1;
    let (k0, k1) = (&keys[i], &keys[i + 1]);
    let span = k1.time - k0.time;
    let s = (time - k0.time) / span;

    match k0.interpolation {
        Interpolation::Step => k0.value,
        Interpolation::Linear => k0.value + (k1.value - k0.value) * s,
        Interpolation::Smooth => {
            let m0 = tangent(keys, i) * span;
            let m1 = tangent(keys, i + 1) * span;
            let s2 = s * s;
            let s3 = s2 * s;
            (2.0 * s3 - 3.0 * s2 + 1.0) * k0.value
                + (s3 - 2.0 * s2 + s) * m0
                + (-2.0 * s3 + 3.0 * s2) * k1.value
                + (s3 - s2) * m1
        }
    }
}

/// Catmull-Rom slope, flat at both ends
fn tangent(keys: &[Key], i: usize) -> f64 {
    if i == 0 || i + 1 >= keys.len() {
        return 0.0;
    }
    let (prev, next) = (&keys[i - 1], &keys[i + 1]);
    (next.value - prev.value) / (next.time - prev.time)
}

/// Insert `key`, replacing one at the same time, keeping `keys` sorted
pub fn insert_key(keys: &mut Vec<Key>, key: Key) {
    match keys.iter().position(|k| (k.time - key.time).abs() < 1e-9) {
        Some(i) => keys[i] = key,
        None => {
            let at = keys.partition_point(|k| k.time < key.time);
            keys.insert(at, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(time: f64, value: f64, interpolation: Interpolation) -> Key {
        Key {
            time,
            value,
            interpolation,
        }
    }

    #[test]
    fn test_linear_and_hold() {
        let keys = vec![
            key(0.0, 0.0, Interpolation::Linear),
            key(2.0, 10.0, Interpolation::Linear),
        ];
        assert_eq!(evaluate(&keys, -1.0), 0.0);
        assert_eq!(evaluate(&keys, 1.0), 5.0);
        assert_eq!(evaluate(&keys, 3.0), 10.0);
        assert_eq!(evaluate(&[], 3.0), 0.0);
    }

    #[test]
    fn test_step() {
        let keys = vec![
            key(0.0, 1.0, Interpolation::Step),
            key(1.0, 2.0, Interpolation::Step),
        ];
        assert_eq!(evaluate(&keys, 0.99), 1.0);
        assert_eq!(evaluate(&keys, 1.0), 2.0);
    }

    #[test]
    fn test_smooth_is_symmetric_between_flat_ends() {
        let keys = vec![
            key(0.0, 0.0, Interpolation::Smooth),
            key(1.0, 1.0, Interpolation::Smooth),
        ];
        assert!((evaluate(&keys, 0.5) - 0.5).abs() < 1e-12);
        assert!(evaluate(&keys, 0.25) < 0.25);
    }

    #[test]
    fn test_insert_overwrites() {
        let mut keys = Vec::new();
        insert_key(&mut keys, key(2.0, 1.0, Interpolation::Linear));
        insert_key(&mut keys, key(0.0, 1.0, Interpolation::Linear));
        insert_key(&mut keys, key(2.0, 5.0, Interpolation::Linear));
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].time, 0.0);
        assert_eq!(keys[1].value, 5.0);
    }
}
