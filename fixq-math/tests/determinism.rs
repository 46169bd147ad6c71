use fixq_math::{
    quantize, quantize_slice, requantize, Exact, FixedPointFormat, OverflowPolicy,
    QuantizationPolicy,
};

// Expected raw integers are written out by hand. Every input is a dyadic
// rational so the encoding is unambiguous on any platform.

fn q(wl: i64, fl: i64, o: OverflowPolicy, p: QuantizationPolicy) -> FixedPointFormat {
    FixedPointFormat::new(wl, fl, o, p).unwrap()
}

#[test]
fn test_q0_15_encoding() {
    let format = q(16, 15, OverflowPolicy::Saturate, QuantizationPolicy::RoundNearest);
    let vals = [0.0, 0.5, -0.5, 0.25, -0.25, 0.75, -0.75, -1.0, 1.0];
    let expected: Vec<i64> = vec![0, 16384, -16384, 8192, -8192, 24576, -24576, -32768, 32767];

    let raws: Vec<i64> = quantize_slice(&vals, &format)
        .iter()
        .map(|r| r.value.raw())
        .collect();
    assert_eq!(raws, expected, "Q0.15 encoding mismatch");
}

#[test]
fn test_rounding_policies_on_ties() {
    // Ties at fractional length 1: x.5 in Q6.1 brought to Q7.0
    let ties = [-2.5, -1.5, -0.5, 0.5, 1.5, 2.5];
    let cases = [
        (QuantizationPolicy::Truncate, vec![-3, -2, -1, 0, 1, 2]),
        (QuantizationPolicy::RoundNearest, vec![-3, -2, -1, 1, 2, 3]),
        (QuantizationPolicy::RoundNearestEven, vec![-2, -2, 0, 0, 2, 2]),
    ];
    for (policy, expected) in cases {
        let format = q(8, 0, OverflowPolicy::Wrap, policy);
        let from_float: Vec<i64> = ties.iter().map(|&t| quantize(t, &format).value.raw()).collect();
        let from_exact: Vec<i64> = ties
            .iter()
            .map(|&t| requantize(Exact::new((t * 2.0) as i128, 1), &format).value.raw())
            .collect();
        assert_eq!(from_float, expected, "{policy} via f64");
        assert_eq!(from_exact, expected, "{policy} via exact");
    }
}

#[test]
fn test_product_requantization() {
    // 0.75 (Q0.7) * -0.625 (Q0.7) = -0.46875, exact at fractional length 14
    let format = q(8, 7, OverflowPolicy::Saturate, QuantizationPolicy::RoundNearest);
    let a = quantize(0.75, &format).value;
    let b = quantize(-0.625, &format).value;
    assert_eq!((a.raw(), b.raw()), (96, -80));

    let product = a.to_exact().mul(&b.to_exact());
    assert_eq!(product, Exact::new(-7680, 14));

    let back = requantize(product, &format);
    assert_eq!(back.value.raw(), -60);
    assert!(!back.truncated);
    assert!(!back.overflowed);
}

#[test]
fn test_wrap_sequence() {
    // Counting past the top of a 4-bit word wraps to the bottom
    let format = q(4, 0, OverflowPolicy::Wrap, QuantizationPolicy::Truncate);
    let raws: Vec<i64> = (5..12)
        .map(|n| quantize(n as f64, &format).value.raw())
        .collect();
    assert_eq!(raws, vec![5, 6, 7, -8, -7, -6, -5]);
}
