//! Property tests over the alignment and suffix-array layers: invariants
//! that should hold for arbitrary byte strings, not just hand-picked
//! examples.

use bsdiff_align::{align, suffix_sort};
use proptest::prelude::*;

proptest! {
    #[test]
    fn suffix_array_is_a_permutation_with_sentinel(buf in proptest::collection::vec(any::<u8>(), 0..200)) {
        let sa = suffix_sort(&buf).unwrap();
        prop_assert_eq!(sa.len(), buf.len() + 1);
        prop_assert_eq!(sa[0], buf.len() as i64);

        let mut rest: Vec<i64> = sa[1..].to_vec();
        rest.sort_unstable();
        prop_assert_eq!(rest, (0..buf.len() as i64).collect::<Vec<_>>());
    }

    #[test]
    fn suffix_array_is_lexicographically_sorted(buf in proptest::collection::vec(any::<u8>(), 1..200)) {
        let sa = suffix_sort(&buf).unwrap();
        for w in sa[1..].windows(2) {
            let a = &buf[w[0] as usize..];
            let b = &buf[w[1] as usize..];
            prop_assert!(a <= b);
        }
    }

    #[test]
    fn alignment_segments_are_ordered_and_non_overlapping(
        old in proptest::collection::vec(any::<u8>(), 0..150),
        new in proptest::collection::vec(any::<u8>(), 0..150),
    ) {
        let segs = align(&old, &new).unwrap();
        for w in segs.windows(2) {
            prop_assert!(w[0].npos + w[0].alen <= w[1].npos);
        }
        for s in &segs {
            prop_assert!(s.npos + s.alen <= new.len() as u64);
            prop_assert!(s.opos + s.alen <= old.len() as u64);
        }
    }

    #[test]
    fn identical_inputs_cover_the_whole_buffer(buf in proptest::collection::vec(any::<u8>(), 0..150)) {
        let segs = align(&buf, &buf).unwrap();
        let total: u64 = segs.iter().map(|s| s.alen).sum();
        prop_assert_eq!(total as usize, buf.len());
    }
}

#[test]
fn digest_score_is_symmetric() {
    use bsdiff_align::psimm::{score, PsimmContext};

    let ctx = PsimmContext::from_seed(48, 16, 16, [3u8; 32]).unwrap();
    let a = ctx.digest(b"the first buffer, used to compare against the second one");
    let b = ctx.digest(b"a rather different second buffer with its own content");
    assert!((score(&a, &b) - score(&b, &a)).abs() < 1e-9);
}
