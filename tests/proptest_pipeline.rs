// Property tests over whole designs: any short FIR, sized from its config,
// simulates without overflow, stays close to the f64 reference and emits
// the same netlist every time.
use fixq::{Coefficients, DesignConfig, FilterDescription, QuantizationPolicy, QuantizedDesign, Structure};
use proptest::prelude::*;

fn design(taps: &[f64], structure: Structure, word_length: u32) -> QuantizedDesign {
    let mut cfg = DesignConfig::new(FilterDescription::new(
        Coefficients::TransferFunction {
            numerator: taps.to_vec(),
            denominator: vec![1.0],
        },
        structure,
    ));
    cfg.word_length = word_length;
    cfg.fractional_length = word_length - 2;
    cfg.quantization = QuantizationPolicy::RoundNearest;
    QuantizedDesign::from_config(&cfg).unwrap()
}

fn structures() -> impl Strategy<Value = Structure> {
    prop_oneof![Just(Structure::DirectForm1), Just(Structure::DirectForm2)]
}

proptest! {
    #[test]
    fn test_fir_designs_are_overflow_free(
        taps in prop::collection::vec(-0.9f64..0.9, 2..7),
        x in prop::collection::vec(-1.0f64..1.0, 1..48),
        structure in structures(),
        word_length in 10u32..24,
    ) {
        let d = design(&taps, structure, word_length);
        let result = d.simulate(&x).unwrap();
        prop_assert!(result.is_overflow_free(), "{:?}", result.events);

        // one rounding per product and per constant, plus the input
        let lsb = 2f64.powi(-(word_length as i32 - 2));
        let err = d.error(&x).unwrap();
        prop_assert!(err.max_abs <= 4.0 * taps.len() as f64 * lsb, "{:?}", err);
    }

    #[test]
    fn test_designs_are_reproducible(
        taps in prop::collection::vec(-0.9f64..0.9, 2..6),
        structure in structures(),
    ) {
        let a = design(&taps, structure, 16);
        let b = design(&taps, structure, 16);
        prop_assert_eq!(a.assignment(), b.assignment());
        prop_assert_eq!(a.netlist().unwrap().digest(), b.netlist().unwrap().digest());

        let x: Vec<f64> = (0..16).map(|n| ((n * 5 % 7) as f64 - 3.0) / 4.0).collect();
        prop_assert_eq!(a.simulate(&x).unwrap(), b.simulate(&x).unwrap());
    }
}
