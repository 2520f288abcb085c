use std::sync::Arc;

use strata_io::{ReadAt, SharedIoBuffer, WriteAt, temp_file_store::TemporaryFileStore};

fn create_stores() -> Vec<Arc<dyn TemporaryFileStore>> {
    create_stores_with_capacity(10 * 1024 * 1024)
}

fn create_stores_with_capacity(capacity: u64) -> Vec<Arc<dyn TemporaryFileStore>> {
    vec![
        super::create_in_memory(capacity).unwrap(),
        super::create_file_based(capacity, None).unwrap(),
    ]
}

fn test_write_read_impl(store: &Arc<dyn TemporaryFileStore>) {
    let buffer = store
        .allocate_shared_buffer(None)
        .expect("Failed to allocate buffer");
    assert_eq!(buffer.size().unwrap(), 0);

    let data = b"Hello, TemporaryFileStore!";
    buffer.write_at(0, data).expect("Failed to write data");
    assert_eq!(buffer.size().unwrap(), data.len() as u64);

    let read_data = buffer
        .read_at(0..data.len() as u64)
        .expect("Failed to read data");
    assert_eq!(read_data, data);
}

#[test]
fn test_write_read() {
    for store in create_stores() {
        test_write_read_impl(&store);
    }
}

fn test_random_blocks_impl(store: &Arc<dyn TemporaryFileStore>) {
    let buffer = store.allocate_shared_buffer(Some(4096)).unwrap();
    let mut expected = Vec::new();
    let mut pos = 0u64;
    for _ in 0..50 {
        let len = fastrand::usize(1..500);
        let block = std::iter::repeat_with(|| fastrand::u8(..))
            .take(len)
            .collect::<Vec<_>>();
        buffer.write_at(pos, &block).unwrap();
        expected.push((pos, block));
        pos += len as u64;
    }
    for (pos, block) in expected.iter().rev() {
        let read = buffer.read_exact_at(*pos..*pos + block.len() as u64).unwrap();
        assert_eq!(&read, block);
    }
}

#[test]
fn test_random_blocks() {
    for store in create_stores() {
        test_random_blocks_impl(&store);
    }
}

fn test_set_size_impl(store: &Arc<dyn TemporaryFileStore>) {
    let buffer: Box<dyn SharedIoBuffer> = store.allocate_shared_buffer(None).unwrap();
    buffer.write_at(0, &[7u8; 100]).unwrap();
    buffer.set_size(10).unwrap();
    assert_eq!(buffer.size().unwrap(), 10);
    assert_eq!(buffer.read_at(0..100).unwrap(), vec![7u8; 10]);
    buffer.set_size(20).unwrap();
    let read = buffer.read_at(0..20).unwrap();
    assert_eq!(&read[..10], &[7u8; 10]);
    assert_eq!(&read[10..], &[0u8; 10]);
}

#[test]
fn test_set_size() {
    for store in create_stores() {
        test_set_size_impl(&store);
    }
}

fn test_budget_exceeded_impl(store: &Arc<dyn TemporaryFileStore>) {
    let buffer = store.allocate_shared_buffer(None).unwrap();
    buffer.write_at(0, &[1u8; 1000]).unwrap();
    let err = buffer.write_at(1000, &[1u8; 100]).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::Other);
}

#[test]
fn test_budget_exceeded() {
    for store in create_stores_with_capacity(1024) {
        test_budget_exceeded_impl(&store);
    }
}

#[test]
fn test_null_store_discards() {
    let store = super::create_null().unwrap();
    let buffer = store.allocate_shared_buffer(None).unwrap();
    buffer.write_at(0, b"abc").unwrap();
    assert_eq!(buffer.size().unwrap(), 0);
    assert!(buffer.read_at(0..3).unwrap().is_empty());
}
