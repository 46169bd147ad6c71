use fixq_math::{quantize_slice, FixedPointFormat, OverflowPolicy, QuantizationPolicy};

fn main() {
    let vals: Vec<f64> = vec![
        0.0, 1.0, -1.0, 0.5, -0.5, 0.25, -0.25, 0.75, -0.75, 1.25, -1.25, 127.0, -128.0,
    ];
    let format = FixedPointFormat::new(
        32,
        23,
        OverflowPolicy::Saturate,
        QuantizationPolicy::RoundNearestEven,
    )
    .expect("valid format");

    let mut bytes = Vec::with_capacity(vals.len() * 8);
    for q in quantize_slice(&vals, &format) {
        bytes.extend_from_slice(&q.value.raw().to_le_bytes());
    }
    println!("{}_HASH {}", format, sha256(&bytes));
}

fn sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
