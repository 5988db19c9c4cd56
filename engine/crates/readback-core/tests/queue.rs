mod common;

use common::{EXPECTED, FrameHarness, both_backends};
use readback_core::software::TextureFormat;
use readback_core::{ReadbackConfig, ReadbackError, RequestQueue};

#[test]
fn test_overflow_does_not_disturb_in_flight_requests() {
    for backend in both_backends() {
        let mut h = FrameHarness::new(backend);
        let mut queue = RequestQueue::from_config(&ReadbackConfig::default());
        assert_eq!(queue.capacity(), 8);

        let buffers: Vec<_> = (0..10)
            .map(|i| {
                let buffer = h.gpu.create_buffer(EXPECTED.len(), size_of::<i32>());
                buffer.set_data(&EXPECTED.map(|v| v + i));
                buffer
            })
            .collect();

        let mut accepted = Vec::new();
        let mut rejected = 0;
        for buffer in &buffers {
            match queue.try_request(|| h.system.readback().request(buffer)) {
                Ok(handle) => accepted.push(handle),
                Err(err) => {
                    assert_eq!(err, ReadbackError::QueueFull { capacity: 8 });
                    rejected += 1;
                }
            }
        }
        assert_eq!(accepted.len(), 8);
        assert_eq!(rejected, 2);
        assert!(queue.is_full());
        // 被拒绝的请求没有发起
        assert_eq!(h.system.in_flight(), 8);

        let mut results = Vec::new();
        for _ in 0..common::MAX_FRAMES {
            queue.drain_ready::<i32>(|request, data| {
                results.push((request.handle(), data.and_then(|view| view.to_vec())));
            });
            if queue.is_empty() {
                break;
            }
            h.next_frame();
        }
        assert!(queue.is_empty());

        // 按提交顺序取出，数据互不干扰
        assert_eq!(results.len(), 8);
        for (i, (handle, data)) in results.into_iter().enumerate() {
            assert_eq!(handle, accepted[i]);
            assert_eq!(data.unwrap(), EXPECTED.map(|v| v + i as i32));
        }
    }
}

#[test]
fn test_push_rejects_when_full() {
    let mut h = FrameHarness::new(readback_core::BackendKind::Custom);
    let buffer = h.gpu.create_buffer(4, 4);
    let mut queue = RequestQueue::new(2);

    for _ in 0..2 {
        queue.push(h.system.readback().request(&buffer).unwrap()).unwrap();
    }
    let extra = h.system.readback().request(&buffer).unwrap();
    assert_eq!(queue.push(extra.clone()), Err(ReadbackError::QueueFull { capacity: 2 }));
    assert_eq!(queue.len(), 2);

    // 被拒绝的请求照常完成和回收
    h.poll_until_done(&extra);
    assert!(!extra.has_error());
    h.next_frame();
    assert!(!extra.valid());
}

#[test]
fn test_drain_reports_errors_in_order() {
    for backend in both_backends() {
        let mut h = FrameHarness::new(backend);
        let good = h.gpu.create_texture(2, 2, TextureFormat::R8, 1);
        good.fill(0, 7);
        let bad = h.gpu.create_texture(2, 2, TextureFormat::Rgb5, 1);

        let mut queue = RequestQueue::new(4);
        queue.try_request(|| h.system.readback().request(&bad)).unwrap();
        queue.try_request(|| h.system.readback().request(&good)).unwrap();

        let mut outcomes = Vec::new();
        for _ in 0..common::MAX_FRAMES {
            queue.drain_ready::<u8>(|_, data| outcomes.push(data.and_then(|view| view.to_vec())));
            if queue.is_empty() {
                break;
            }
            h.next_frame();
        }

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0], Err(ReadbackError::ReadbackFailed));
        assert_eq!(outcomes[1], Ok(vec![7u8; 4]));
    }
}
