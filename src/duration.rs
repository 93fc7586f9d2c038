use std::sync::LazyLock;

use regex::Regex;

/// Unanchored: the first `PT` run anywhere in the input is used. Day-bearing
/// forms such as `P1DT2H` contain no `PT` and parse as 0.
static ISO_DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?").expect("valid duration pattern"));

/// Converts a `PT[nH][nM][nS]` duration into total seconds.
///
/// Missing components count as zero and input without a `PT` marker yields 0.
/// Components too large for `u64` saturate instead of failing.
pub fn parse_duration(duration: &str) -> u64 {
    let Some(caps) = ISO_DURATION.captures(duration) else {
        tracing::debug!(duration, "unparsable duration, treating as zero");
        return 0;
    };

    let component = |idx: usize| -> u64 {
        caps.get(idx)
            .map(|m| m.as_str().parse::<u64>().unwrap_or(u64::MAX))
            .unwrap_or(0)
    };

    component(1)
        .saturating_mul(3600)
        .saturating_add(component(2).saturating_mul(60))
        .saturating_add(component(3))
}
