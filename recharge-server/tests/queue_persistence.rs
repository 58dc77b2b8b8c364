//! 任务队列落盘与重启恢复测试

use recharge_server::queue::TaskQueue;

#[test]
fn queue_survives_reopen_and_recovers_reserved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("task_queue.redb");

    {
        let queue = TaskQueue::open(&path).unwrap();
        queue.push(101).unwrap();
        queue.push(102).unwrap();
        // 101 领取后未 ack，模拟处理中途进程退出
        assert_eq!(queue.reserve().unwrap(), Some(101));
    }

    let queue = TaskQueue::open(&path).unwrap();
    assert_eq!(queue.ready_len().unwrap(), 1);

    let recovered = queue.recover_reserved().unwrap();
    assert_eq!(recovered, 1);

    // 102 仍在队头，101 恢复到队尾
    assert_eq!(queue.reserve().unwrap(), Some(102));
    assert_eq!(queue.reserve().unwrap(), Some(101));
    assert_eq!(queue.reserve().unwrap(), None);
}
