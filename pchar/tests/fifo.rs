use pchar::{ByteFifo, DeviceError, FifoInfo};

fn drain(fifo: &mut ByteFifo) -> Vec<u8> {
    let mut out = vec![0u8; fifo.capacity()];
    let n = fifo.dequeue(&mut out);
    out.truncate(n);
    out
}

// --------------------------------------------------------------------
// Enqueue / dequeue
//

#[test]
fn test_new_fifo_is_empty() {
    let fifo = ByteFifo::with_capacity(32).unwrap();
    assert!(fifo.is_empty());
    assert!(!fifo.is_full());
    assert_eq!(
        fifo.snapshot(),
        FifoInfo {
            size: 32,
            length: 0,
            avail: 32
        }
    );
}

#[test]
fn test_writes_come_back_in_order() {
    let mut fifo = ByteFifo::with_capacity(32).unwrap();
    assert_eq!(fifo.enqueue(b"Hello"), 5);
    assert_eq!(fifo.enqueue(b" "), 1);
    assert_eq!(fifo.enqueue(b"World"), 5);
    assert_eq!(drain(&mut fifo), b"Hello World");
    assert!(fifo.is_empty());
}

#[test]
fn test_enqueue_bounded_by_avail() {
    let mut fifo = ByteFifo::with_capacity(32).unwrap();
    assert_eq!(fifo.enqueue(b"abcdefghijklmnopqrstuvwxyz"), 26);
    assert_eq!(fifo.avail(), 6);
    assert_eq!(fifo.enqueue(b"DESD"), 4);
    assert_eq!(fifo.avail(), 2);
    // only two of the four bytes fit now
    assert_eq!(fifo.enqueue(b"DESD"), 2);
    assert!(fifo.is_full());
    assert_eq!(fifo.enqueue(b"x"), 0);
    assert_eq!(drain(&mut fifo), b"abcdefghijklmnopqrstuvwxyzDESDDE");
}

#[test]
fn test_dequeue_empty_returns_zero() {
    let mut fifo = ByteFifo::with_capacity(4).unwrap();
    let mut out = [0u8; 4];
    assert_eq!(fifo.dequeue(&mut out), 0);
}

#[test]
fn test_partial_dequeue() {
    let mut fifo = ByteFifo::with_capacity(8).unwrap();
    fifo.enqueue(b"abcdef");
    let mut out = [0u8; 2];
    assert_eq!(fifo.dequeue(&mut out), 2);
    assert_eq!(&out, b"ab");
    assert_eq!(fifo.len(), 4);
    assert_eq!(drain(&mut fifo), b"cdef");
}

#[test]
fn test_many_cycles_through_small_fifo() {
    let mut fifo = ByteFifo::with_capacity(5).unwrap();
    let mut seen = Vec::new();
    let input: Vec<u8> = (0u8..100).collect();
    // one byte stays behind every round so head keeps moving around the ring
    fifo.enqueue(&input[..1]);
    for chunk in input[1..].chunks(3) {
        assert_eq!(fifo.enqueue(chunk), chunk.len());
        let mut out = [0u8; 3];
        let n = fifo.dequeue(&mut out);
        seen.extend_from_slice(&out[..n]);
    }
    seen.extend(drain(&mut fifo));
    assert_eq!(seen, input);
}

// --------------------------------------------------------------------
// Reset / resize
//

#[test]
fn test_reset_keeps_capacity() {
    let mut fifo = ByteFifo::with_capacity(16).unwrap();
    fifo.enqueue(b"some data");
    fifo.reset();
    assert_eq!(
        fifo.snapshot(),
        FifoInfo {
            size: 16,
            length: 0,
            avail: 16
        }
    );
}

#[test]
fn test_grow_preserves_bytes() {
    let mut fifo = ByteFifo::with_capacity(8).unwrap();
    fifo.enqueue(b"abcdefgh");
    fifo.resize(16).unwrap();
    assert_eq!(fifo.snapshot().avail, 8);
    assert_eq!(fifo.enqueue(b"ijkl"), 4);
    assert_eq!(drain(&mut fifo), b"abcdefghijkl");
}

#[test]
fn test_resize_to_exact_length_preserves_bytes() {
    let mut fifo = ByteFifo::with_capacity(8).unwrap();
    fifo.enqueue(b"abcde");
    fifo.resize(5).unwrap();
    assert!(fifo.is_full());
    assert_eq!(drain(&mut fifo), b"abcde");
}

#[test]
fn test_shrink_keeps_oldest_bytes() {
    let mut fifo = ByteFifo::with_capacity(32).unwrap();
    fifo.enqueue(b"abcdefghijklmnopqrstuvwxyz");
    fifo.resize(10).unwrap();
    assert_eq!(
        fifo.snapshot(),
        FifoInfo {
            size: 10,
            length: 10,
            avail: 0
        }
    );
    assert_eq!(drain(&mut fifo), b"abcdefghij");
}

#[test]
fn test_resize_empty() {
    let mut fifo = ByteFifo::with_capacity(32).unwrap();
    fifo.resize(64).unwrap();
    assert_eq!(
        fifo.snapshot(),
        FifoInfo {
            size: 64,
            length: 0,
            avail: 64
        }
    );
}

#[test]
fn test_failed_resize_leaves_fifo_intact() {
    let mut fifo = ByteFifo::with_capacity(8).unwrap();
    fifo.enqueue(b"keep");
    let before = fifo.snapshot();

    let err = fifo.resize(usize::MAX).unwrap_err();
    assert_eq!(
        err,
        DeviceError::Allocation {
            requested: usize::MAX
        }
    );
    assert_eq!(fifo.snapshot(), before);
    assert_eq!(drain(&mut fifo), b"keep");
}

#[test]
fn test_resize_to_zero_rejected() {
    let mut fifo = ByteFifo::with_capacity(8).unwrap();
    fifo.enqueue(b"x");
    assert!(matches!(
        fifo.resize(0),
        Err(DeviceError::InvalidArgument(_))
    ));
    assert_eq!(fifo.len(), 1);
}

#[test]
fn test_unprovisionable_capacity() {
    assert!(matches!(
        ByteFifo::with_capacity(usize::MAX),
        Err(DeviceError::Allocation { .. })
    ));
}
