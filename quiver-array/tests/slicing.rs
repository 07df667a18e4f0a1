use quiver_array::builder::{BinaryBuilder, PrimitiveBuilder, Utf8Builder};
use rstest::rstest;

#[rstest]
#[case(0)]
#[case(1)]
#[case(3)]
#[case(7)]
fn sliced_fixed_width_matches_unsliced(#[case] k: usize) {
    let array = PrimitiveBuilder::<i64>::from_iter((0..8).map(|v| Some(v * 11 - 30)))
        .finish()
        .unwrap();
    let sliced = array.clone().slice(k, 8 - k).unwrap();
    for i in 0..sliced.len() {
        assert_eq!(sliced.i64_value(i), array.i64_value(i + k));
    }
}

#[rstest]
#[case(0)]
#[case(2)]
#[case(4)]
fn sliced_variable_width_matches_unsliced(#[case] k: usize) {
    let mut builder = Utf8Builder::new();
    for s in ["a", "bb", "", "dddd", "e", "ffffff"] {
        builder.append_value(s).unwrap();
    }
    let array = builder.finish().unwrap();
    let sliced = array.clone().slice(k, 6 - k).unwrap();
    for i in 0..sliced.len() {
        assert_eq!(sliced.utf8_value(i), array.utf8_value(i + k));
    }
}

#[test]
fn sliced_binary_views_the_same_bytes() {
    let mut builder = BinaryBuilder::new();
    builder.append_value([0u8, 1]).unwrap();
    builder.append_value([2u8]).unwrap();
    builder.append_value([3u8, 4, 5]).unwrap();
    let array = builder.finish().unwrap();
    let sliced = array.clone().slice(1, 2).unwrap();
    assert_eq!(sliced.binary_value(1), Some([3u8, 4, 5].as_slice()));
    assert_eq!(sliced.binary_value(1), array.binary_value(2));
}
