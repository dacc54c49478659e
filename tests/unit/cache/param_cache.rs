use std::cell::RefCell;
use std::rc::Rc;

use super::*;

fn key(w: i32, scale: f64) -> Params {
    [Scalar::from(w), Scalar::from(scale)].into_iter().collect()
}

#[test]
fn get_hits_only_on_exact_params() {
    let mut cache = ParamCache::new(ParamCacheOpts::default());
    assert!(cache.get(&key(8, 1.0)).is_none());

    cache.add("mask", key(8, 1.0));
    assert_eq!(cache.get(&key(8, 1.0)), Some(&"mask"));
    assert!(cache.get(&key(8, 1.000_000_1)).is_none());
    assert!(cache.get(&key(9, 1.0)).is_none());
    assert!(cache.get(&key(8, 1.0)[..1]).is_none());

    assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 4 });
}

#[test]
fn int_and_float_scalars_never_compare_equal() {
    let mut cache = ParamCache::new(ParamCacheOpts::default());
    cache.add(1u8, [Scalar::Int(1)]);
    assert!(cache.get(&[Scalar::Float(1.0)]).is_none());
}

#[test]
fn add_releases_previous_entry() {
    let released = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&released);
    let mut cache = ParamCache::with_release(ParamCacheOpts::default(), move |v: u32| {
        sink.borrow_mut().push(v);
    });

    cache.add(1, key(1, 1.0));
    cache.add(2, key(2, 1.0));
    assert_eq!(*released.borrow(), vec![1]);
    assert!(cache.get(&key(1, 1.0)).is_none());
    assert_eq!(cache.get(&key(2, 1.0)), Some(&2));

    cache.clear();
    assert!(!cache.is_filled());
    assert_eq!(*released.borrow(), vec![1, 2]);

    cache.add(3, key(3, 1.0));
    drop(cache);
    assert_eq!(*released.borrow(), vec![1, 2, 3]);
}

#[test]
fn stats_can_be_disabled() {
    let mut cache = ParamCache::new(ParamCacheOpts {
        label: "quiet".to_owned(),
        count_stats: false,
    });
    cache.add((), key(1, 1.0));
    let _ = cache.get(&key(1, 1.0));
    let _ = cache.get(&key(2, 1.0));
    assert_eq!(cache.stats(), CacheStats::default());
}

#[test]
fn brush_transform_keys_every_component() {
    let base = BrushTransform {
        width: 17,
        height: 17,
        scale: 1.0,
        aspect_ratio: 0.0,
        angle: 0.0,
        hardness: 1.0,
    };
    assert!(base.is_identity());

    let mut cache = ParamCache::new(ParamCacheOpts::default());
    cache.add("identity", base.params());
    assert_eq!(cache.get(&base.params()), Some(&"identity"));

    let rotated = BrushTransform {
        angle: 0.25,
        ..base
    };
    assert!(!rotated.is_identity());
    assert!(cache.get(&rotated.params()).is_none());
}
