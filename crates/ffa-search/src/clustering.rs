//! One-dimensional single-linkage clustering.

/// Group `values` so that consecutive sorted values closer than `radius`
/// (inclusive) share a group.
///
/// Returns groups of indices into `values`. Groups come out in ascending
/// value order and each group lists its indices by ascending value, equal
/// values keeping their input order. Non-finite values sort last and each
/// forms its own group.
pub fn cluster_1d(values: &[f64], radius: f64) -> Vec<Vec<usize>> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then(a.cmp(&b)));

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut cur: Vec<usize> = Vec::new();
    for index in order {
        let joins = match cur.last() {
            Some(&prev) => (values[index] - values[prev]).abs() <= radius,
            None => true,
        };
        if joins {
            cur.push(index);
        } else {
            clusters.push(std::mem::replace(&mut cur, vec![index]));
        }
    }
    if !cur.is_empty() {
        clusters.push(cur);
    }
    clusters
}
