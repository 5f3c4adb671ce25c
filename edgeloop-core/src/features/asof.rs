//! Backward as-of join over sorted integer keys.

/// For each left key, the index of the last right key `<= left`.
///
/// Both slices must be sorted ascending. With `tolerance = Some(t)`, a match
/// is only accepted if `left - right <= t`. Runs in `O(left + right)`.
pub fn asof_backward(left: &[i64], right: &[i64], tolerance: Option<i64>) -> Vec<Option<usize>> {
    let mut out = Vec::with_capacity(left.len());
    let mut j = 0usize;
    let mut last: Option<usize> = None;

    for &key in left {
        while j < right.len() && right[j] <= key {
            last = Some(j);
            j += 1;
        }
        let matched = last.filter(|&idx| match tolerance {
            Some(t) => key - right[idx] <= t,
            None => true,
        });
        out.push(matched);
    }
    out
}
