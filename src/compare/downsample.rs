/// LTTB (Largest Triangle Three Buckets) downsampling.
///
/// Reduces a series to `target_points` while keeping its visual shape. The
/// first and last points are always kept.
pub fn downsample_lttb(times: &[f64], values: &[f64], target_points: usize) -> Vec<[f64; 2]> {
    let n = times.len().min(values.len());

    if n <= target_points || target_points < 3 {
        return times.iter().zip(values).map(|(t, v)| [*t, *v]).collect();
    }

    let mut result = Vec::with_capacity(target_points);
    result.push([times[0], values[0]]);

    // Interior points per bucket
    let bucket_size = (n - 2) as f64 / (target_points - 2) as f64;
    let mut a_index = 0usize;

    for i in 0..(target_points - 2) {
        let bucket_start = (i as f64 * bucket_size).floor() as usize + 1;
        let bucket_end = (((i + 1) as f64 * bucket_size).floor() as usize + 1).min(n - 1);

        // Average of the next bucket is the third triangle vertex
        let next_start = bucket_end;
        let next_end = (((i + 2) as f64 * bucket_size).floor() as usize + 1).min(n);
        let (avg_x, avg_y) = if next_start < next_end {
            let count = (next_end - next_start) as f64;
            let sum_x: f64 = times[next_start..next_end].iter().sum();
            let sum_y: f64 = values[next_start..next_end].iter().sum();
            (sum_x / count, sum_y / count)
        } else {
            (times[n - 1], values[n - 1])
        };

        let (a_x, a_y) = (times[a_index], values[a_index]);
        let mut max_area = -1.0f64;
        let mut max_index = bucket_start;
        for j in bucket_start..bucket_end {
            let area = ((a_x - avg_x) * (values[j] - a_y) - (a_x - times[j]) * (avg_y - a_y)).abs();
            if area > max_area {
                max_area = area;
                max_index = j;
            }
        }

        result.push([times[max_index], values[max_index]]);
        a_index = max_index;
    }

    result.push([times[n - 1], values[n - 1]]);
    result
}
