use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::{PlayerError, Result};

/// 队列元素 - 解码帧或流结束标记
///
/// EOS 作为带内标记在队列中流动，消费端统一处理，
/// 避免额外的跨线程结束标志。
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUnit<T> {
    Frame(T),
    EndOfStream,
}

/// 有界阻塞队列 - 解码线程与消费线程之间唯一的共享缓冲
///
/// FIFO，固定容量。队列满时 `push` 阻塞生产者（背压），
/// 队列空时 `pop_timeout` 阻塞消费者直到超时。
/// `close` 幂等，唤醒所有阻塞方；关闭后 push/pop 都返回 `QueueClosed`。
pub struct BoundedQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

struct State<T> {
    items: VecDeque<StreamUnit<T>>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "队列容量必须大于 0");
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
                capacity,
            }),
        }
    }

    /// 入队，队列满时阻塞直到有空位或队列被关闭
    pub fn push(&self, unit: StreamUnit<T>) -> Result<()> {
        let mut state = self.shared.state.lock();
        while state.items.len() >= self.shared.capacity && !state.closed {
            self.shared.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(PlayerError::QueueClosed);
        }
        state.items.push_back(unit);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// 出队，队列空时阻塞直到有元素、超时（返回 None）或队列被关闭
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Option<StreamUnit<T>>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return Err(PlayerError::QueueClosed);
            }
            if let Some(unit) = state.items.pop_front() {
                self.shared.not_full.notify_one();
                return Ok(Some(unit));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            if self
                .shared
                .not_empty
                .wait_for(&mut state, deadline - now)
                .timed_out()
            {
                // 超时后再查一眼，避免错过唤醒与超时同时发生的情况
                continue;
            }
        }
    }

    /// 非阻塞出队 - 音频实时回调专用，绝不等待
    pub fn try_pop(&self) -> Result<Option<StreamUnit<T>>> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(PlayerError::QueueClosed);
        }
        match state.items.pop_front() {
            Some(unit) => {
                self.shared.not_full.notify_one();
                Ok(Some(unit))
            }
            None => Ok(None),
        }
    }

    /// 关闭队列 - 幂等，唤醒所有阻塞的生产者和消费者
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if !state.closed {
            state.closed = true;
            self.shared.not_full.notify_all();
            self.shared.not_empty.notify_all();
        }
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fifo_order_within_capacity() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(8);
        for i in 0..8 {
            queue.push(StreamUnit::Frame(i)).unwrap();
        }
        for i in 0..8 {
            assert_eq!(
                queue.pop_timeout(Duration::from_millis(10)).unwrap(),
                Some(StreamUnit::Frame(i))
            );
        }
        // 队列空：超时返回 None
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn eos_marker_flows_through() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(4);
        queue.push(StreamUnit::Frame(1)).unwrap();
        queue.push(StreamUnit::EndOfStream).unwrap();

        assert_eq!(queue.try_pop().unwrap(), Some(StreamUnit::Frame(1)));
        assert_eq!(queue.try_pop().unwrap(), Some(StreamUnit::EndOfStream));
        assert_eq!(queue.try_pop().unwrap(), None);
    }

    #[test]
    fn push_blocks_until_pop_frees_capacity() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(2);
        queue.push(StreamUnit::Frame(1)).unwrap();
        queue.push(StreamUnit::Frame(2)).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                // 队列已满，这里会阻塞到主线程 pop
                queue.push(StreamUnit::Frame(3)).unwrap();
            })
        };

        // 给生产者一点时间进入阻塞
        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.len(), 2, "满队列上的 push 不应完成");

        assert_eq!(
            queue.pop_timeout(Duration::from_millis(100)).unwrap(),
            Some(StreamUnit::Frame(1))
        );
        producer.join().unwrap();

        assert_eq!(
            queue.pop_timeout(Duration::from_millis(100)).unwrap(),
            Some(StreamUnit::Frame(2))
        );
        assert_eq!(
            queue.pop_timeout(Duration::from_millis(100)).unwrap(),
            Some(StreamUnit::Frame(3))
        );
    }

    #[test]
    fn close_wakes_blocked_producer() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(1);
        queue.push(StreamUnit::Frame(1)).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push(StreamUnit::Frame(2)))
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        let result = producer.join().unwrap();
        assert!(matches!(result, Err(PlayerError::QueueClosed)));
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(1);

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop_timeout(Duration::from_secs(10)))
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        let result = consumer.join().unwrap();
        assert!(matches!(result, Err(PlayerError::QueueClosed)));
    }

    #[test]
    fn closed_queue_rejects_all_operations() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(4);
        queue.push(StreamUnit::Frame(1)).unwrap();
        queue.close();
        // 幂等
        queue.close();

        assert!(matches!(
            queue.push(StreamUnit::Frame(2)),
            Err(PlayerError::QueueClosed)
        ));
        assert!(matches!(queue.try_pop(), Err(PlayerError::QueueClosed)));
        assert!(matches!(
            queue.pop_timeout(Duration::from_millis(10)),
            Err(PlayerError::QueueClosed)
        ));
    }
}
