use crate::config::ProfileConfig;
use crate::error::{Error, Result};
use crate::profile::{ProfileSession, profile};

/// Run the profile command - wrapped calls sampled into one session
pub fn run(config: ProfileConfig, value: i64, repeat: usize) -> Result<i64> {
    let session = ProfileSession::new(config)?;

    let inner = session.clone();
    let double = profile(&session, "double", move |x: i64| {
        let checksum = checksum(&inner, x);
        std::hint::black_box(checksum);
        x.checked_mul(2)
    });

    let mut result = 0;
    for _ in 0..repeat {
        result = double(value)
            .ok_or_else(|| Error::InvalidArgument(format!("{value} doubled overflows i64")))?;
    }
    Ok(result)
}

fn checksum(session: &ProfileSession, seed: i64) -> u64 {
    let _guard = session.enter("checksum");
    let mut acc = seed as u64;
    for i in 0..100_000u64 {
        acc = acc.rotate_left(5) ^ mix(session, i);
    }
    acc
}

fn mix(session: &ProfileSession, i: u64) -> u64 {
    if i % 10_000 == 0 {
        let _guard = session.enter("mix");
        return i.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    }
    i
}
