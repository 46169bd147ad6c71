use fixq_core::{Coefficients, FilterDescription, RangeTracker, Structure, TopologyModel};
use fixq_math::{FixedPointFormat, OverflowPolicy, QuantizationPolicy};
use fixq_sim::{compare, lfilter, run, run_reference};
use proptest::prelude::*;

fn fir(taps: Vec<f64>, structure: Structure) -> TopologyModel {
    FilterDescription::new(
        Coefficients::TransferFunction {
            numerator: taps,
            denominator: vec![1.0],
        },
        structure,
    )
    .realize()
    .unwrap()
}

fn structure() -> impl Strategy<Value = Structure> {
    prop_oneof![Just(Structure::DirectForm1), Just(Structure::DirectForm2)]
}

// Property 1: with the growth rules applied, FIR filters never overflow and
// track the floating reference to within a few LSBs per tap
proptest! {
    #[test]
    fn prop_fir_tracks_reference(
        taps in prop::collection::vec(-0.99f64..0.99, 2..8),
        samples in prop::collection::vec(-0.99f64..0.99, 1..64),
        s in structure(),
    ) {
        prop_assume!(taps.iter().any(|&c| c != 0.0));
        let t = fir(taps.clone(), s);
        let signal = FixedPointFormat::new(22, 20, OverflowPolicy::Saturate, QuantizationPolicy::RoundNearest).unwrap();
        let assignment = RangeTracker::new(signal).size(&t).unwrap();
        let result = run(&t, &assignment, &samples).unwrap();
        prop_assert!(result.is_overflow_free(), "{:?}", result.events);

        let expected = lfilter(&taps, &[1.0], &samples).unwrap();
        let err = compare(result.output(), &expected).unwrap();
        prop_assert!(err.max_abs <= taps.len() as f64 * 2f64.powi(-18), "{:?}", err);

        let float = run_reference(&t, &[samples.as_slice()]).unwrap();
        let float_err = compare(&float[0], &expected).unwrap();
        prop_assert!(float_err.max_abs < 1e-12);
    }
}

// Property 2: bit-exact reproducibility, events in sample order
proptest! {
    #[test]
    fn prop_runs_are_reproducible(
        samples in prop::collection::vec(-4.0f64..4.0, 1..64),
        wl in 4i64..12,
        saturate in any::<bool>(),
    ) {
        let t = FilterDescription::new(
            Coefficients::TransferFunction {
                numerator: vec![0.3, 0.3],
                denominator: vec![1.0, -0.6],
            },
            Structure::DirectForm2,
        )
        .realize()
        .unwrap();
        let overflow = if saturate { OverflowPolicy::Saturate } else { OverflowPolicy::Wrap };
        let signal = FixedPointFormat::new(wl, wl - 2, overflow, QuantizationPolicy::RoundNearestEven).unwrap();
        let assignment = RangeTracker::new(signal).size(&t).unwrap();

        let a = run(&t, &assignment, &samples).unwrap();
        let b = run(&t, &assignment, &samples).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.output().len(), samples.len());
        prop_assert!(a.events.windows(2).all(|w| w[0].sample_index <= w[1].sample_index));
        prop_assert!(a.events.iter().all(|e| e.sample_index < samples.len()));
    }
}

// Property 3: every output value lies in its node's format
proptest! {
    #[test]
    fn prop_outputs_in_range(
        samples in prop::collection::vec(-10.0f64..10.0, 1..32),
        wl in 3i64..10,
    ) {
        let t = fir(vec![0.7, -0.9, 0.4], Structure::DirectForm1);
        let signal = FixedPointFormat::new(wl, wl - 1, OverflowPolicy::Wrap, QuantizationPolicy::Truncate).unwrap();
        let assignment = fixq_core::FormatAssignment::uniform(&t, signal);
        let result = run(&t, &assignment, &samples).unwrap();
        for &raw in &result.raw_outputs[0] {
            prop_assert!(raw >= signal.min_raw() && raw <= signal.max_raw());
        }
    }
}
