/// Cost methods whose quantity is expected to track campaign duration.
const FLAGGED_COST_METHODS: &[&str] = &["cpu", "cost per unit"];

/// A line item needs attention when it bills per unit and runs across more
/// than one calendar month. Pure rule: absent cost method never flags.
pub fn is_flagged(cost_method: &str, months_spanned: i64) -> bool {
    let method = cost_method.trim().to_lowercase();
    FLAGGED_COST_METHODS.contains(&method.as_str()) && months_spanned > 1
}

/// Difference between the billed quantity and the months the item spans,
/// under the "required quantity equals months spanned" policy. Negative
/// values signal under-allocation.
pub fn quantity_gap(quantity: f64, months_spanned: i64) -> f64 {
    quantity - months_spanned as f64
}
