use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use strata_ecs::{VirtualVec, PAGE_SIZE};

mod common;
use common::{live, Dropper};

#[test]
fn push_pop_and_len() {
    let mut v: VirtualVec<u64> = VirtualVec::new(16).unwrap();
    assert!(v.is_empty());
    assert_eq!(v.capacity(), 16);

    for i in 0..10 {
        v.push(i);
    }
    assert_eq!(v.len(), 10);
    assert_eq!(&v[..3], &[0, 1, 2]);
    assert_eq!(v.pop(), Some(9));
    assert_eq!(v.len(), 9);
}

#[test]
fn base_pointer_is_stable_across_growth() {
    let mut v: VirtualVec<u32> = VirtualVec::new(100_000).unwrap();
    v.push(7);
    let base = v.as_ptr();

    for i in 0..99_999 {
        v.push(i);
    }
    assert_eq!(v.as_ptr(), base);
    assert_eq!(v[0], 7);
    assert_eq!(v.len(), 100_000);
}

#[test]
fn reservation_is_page_aligned() {
    let v: VirtualVec<u8> = VirtualVec::new(PAGE_SIZE * 3).unwrap();
    assert_eq!(v.as_ptr() as usize % PAGE_SIZE, 0);
    assert!(v.reserved_bytes() >= PAGE_SIZE * 3);
}

#[test]
#[should_panic(expected = "capacity exceeded")]
fn push_past_capacity_panics() {
    let mut v: VirtualVec<u8> = VirtualVec::new(2).unwrap();
    v.push(1);
    v.push(2);
    v.push(3);
}

#[test]
#[should_panic(expected = "capacity exceeded")]
fn resize_past_capacity_panics() {
    let mut v: VirtualVec<u8> = VirtualVec::new(8).unwrap();
    v.resize(9, 0);
}

#[test]
fn resize_and_extend() {
    let mut v: VirtualVec<u8> = VirtualVec::new(64).unwrap();
    v.resize(4, 0xAB);
    assert_eq!(&v[..], &[0xAB; 4]);

    v.extend_from_slice(&[1, 2, 3]);
    assert_eq!(&v[..], &[0xAB, 0xAB, 0xAB, 0xAB, 1, 2, 3]);

    v.resize(2, 0);
    assert_eq!(&v[..], &[0xAB, 0xAB]);

    v.extend([9, 8]);
    assert_eq!(&v[..], &[0xAB, 0xAB, 9, 8]);
}

#[test]
fn swap_remove_and_remove() {
    let mut v: VirtualVec<i32> = VirtualVec::new(8).unwrap();
    v.extend_from_slice(&[10, 20, 30, 40]);

    assert_eq!(v.swap_remove(0), 10);
    assert_eq!(&v[..], &[40, 20, 30]);

    assert_eq!(v.remove(0), 40);
    assert_eq!(&v[..], &[20, 30]);

    assert_eq!(v.swap_remove(1), 30);
    assert_eq!(&v[..], &[20]);
}

#[test]
#[should_panic(expected = "out of bounds")]
fn swap_remove_out_of_bounds_panics() {
    let mut v: VirtualVec<i32> = VirtualVec::new(8).unwrap();
    v.push(1);
    v.swap_remove(1);
}

#[test]
fn truncate_and_drop_run_destructors() {
    let counter = Arc::new(AtomicU32::new(0));
    {
        let mut v: VirtualVec<Dropper> = VirtualVec::new(8).unwrap();
        for _ in 0..5 {
            v.push(Dropper::new(&counter));
        }
        assert_eq!(live(&counter), 5);

        v.truncate(2);
        assert_eq!(live(&counter), 2);

        let removed = v.swap_remove(0);
        assert_eq!(live(&counter), 2);
        drop(removed);
        assert_eq!(live(&counter), 1);
    }
    assert_eq!(live(&counter), 0);
}

#[test]
fn zero_sized_reservations() {
    let mut empty: VirtualVec<u64> = VirtualVec::new(0).unwrap();
    assert_eq!(empty.reserved_bytes(), 0);
    assert_eq!(empty.pop(), None);

    let mut units: VirtualVec<()> = VirtualVec::new(1000).unwrap();
    assert_eq!(units.reserved_bytes(), 0);
    for _ in 0..1000 {
        units.push(());
    }
    assert_eq!(units.len(), 1000);
}

#[test]
fn oversized_reservation_is_an_error() {
    let result: Result<VirtualVec<u64>, _> = VirtualVec::new(usize::MAX);
    let error = result.err().expect("overflowing reservation must fail");
    assert!(error.bytes.is_none());
}
