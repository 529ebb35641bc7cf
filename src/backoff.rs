/// Equal jitter backoff: base/2 + rand(0, base/2), where base = initial * 2^attempt.
pub fn jittered(initial_ms: u64, attempt: u32) -> u64 {
    let base = initial_ms.saturating_mul(2u64.saturating_pow(attempt));
    let half = base / 2;
    half + fastrand::u64(..half.max(1))
}
