/// Replace `values` with their 1-based ranks, ties sharing the average rank
///
/// Returns the tie correction term `sum(t^3 - t)` over tie groups of size `t`.
///
/// # Example
/// ```
/// use surface_clusters::statistic::average_ranks;
///
/// let mut values = vec![3.0, 1.0, 3.0, 2.0];
/// let ties = average_ranks(&mut values);
/// assert_eq!(values, vec![3.5, 1.0, 3.5, 2.0]);
/// assert_eq!(ties, 6.0);
/// ```
pub fn average_ranks(values: &mut [f32]) -> f64 {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0f32; n];
    let mut tie_term = 0.0f64;
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold equal values, ranks start+1..=end
        let rank = (start + 1 + end) as f32 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        let t = (end - start) as f64;
        tie_term += t * t * t - t;
        start = end;
    }

    values.copy_from_slice(&ranks);
    tie_term
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_values() {
        let mut values = vec![10.0, -1.0, 4.0];
        assert_eq!(average_ranks(&mut values), 0.0);
        assert_eq!(values, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_all_tied() {
        let mut values = vec![7.0; 4];
        let ties = average_ranks(&mut values);
        assert_eq!(values, vec![2.5; 4]);
        assert_eq!(ties, 60.0);
    }

    #[test]
    fn test_empty() {
        let mut values: Vec<f32> = Vec::new();
        assert_eq!(average_ranks(&mut values), 0.0);
    }
}
