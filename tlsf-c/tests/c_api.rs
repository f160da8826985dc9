use std::ptr;

use tlsf_c::{
    tlsf_block_size, tlsf_check, tlsf_free, tlsf_malloc, tlsf_memalign, tlsf_realloc, tlsf_reserve, tlsf_trim,
    tlsf_warm_up,
};

const WORD: usize = std::mem::size_of::<usize>();

#[test]
fn warm_up_reserve() {
    assert_eq!(0, tlsf_warm_up());
    assert!(tlsf_reserve(1024 * 1024) >= 1024 * 1024);
    assert_eq!(0, tlsf_check());
}

#[test]
fn malloc_free() {
    let pointer = tlsf_malloc(100);

    assert!(!pointer.is_null());
    assert_eq!(0, pointer as usize % WORD);
    assert!(unsafe { tlsf_block_size(pointer) } >= 100);

    unsafe { tlsf_free(pointer) };

    assert_eq!(0, tlsf_check());
}

#[test]
fn malloc_zero() {
    assert!(tlsf_malloc(0).is_null());
}

#[test]
fn free_null() {
    unsafe { tlsf_free(ptr::null_mut()) };

    assert_eq!(0, unsafe { tlsf_block_size(ptr::null_mut()) });
}

#[test]
fn memalign() {
    for shift in 0..13 {
        let alignment = 1 << shift;
        let pointer = tlsf_memalign(alignment, 40);

        assert!(!pointer.is_null());
        assert_eq!(0, pointer as usize % alignment);

        unsafe { tlsf_free(pointer) };
    }

    assert!(tlsf_memalign(3, 40).is_null());
    assert!(tlsf_memalign(0, 40).is_null());
}

#[test]
fn realloc() {
    unsafe {
        let pointer = tlsf_realloc(ptr::null_mut(), 16);
        assert!(!pointer.is_null());

        for i in 0..16 {
            *pointer.add(i) = i as u8;
        }

        let pointer = tlsf_realloc(pointer, 4096);
        assert!(!pointer.is_null());

        for i in 0..16 {
            assert_eq!(i as u8, *pointer.add(i));
        }

        assert!(tlsf_realloc(pointer, 1 << 40).is_null());
        assert!(tlsf_block_size(pointer) >= 4096);

        assert!(tlsf_realloc(pointer, 0).is_null());
    }

    assert_eq!(0, tlsf_check());
}

#[test]
fn trim() {
    let pointer = tlsf_malloc(100);
    assert!(!pointer.is_null());

    //  The pool holding `pointer` is never trimmed.
    tlsf_trim();
    assert_eq!(0, tlsf_check());

    unsafe {
        *pointer = 42;
        tlsf_free(pointer);
    }
}
