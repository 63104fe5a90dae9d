use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use parago::{Scheduler, TaskRecord, plan};
use parking_lot::Mutex;

// 宽而深的图：每层 width 个任务，依赖上一层全部任务
fn layered(layers: usize, width: usize) -> Vec<TaskRecord> {
    let mut records = Vec::new();
    for layer in 0..layers {
        for i in 0..width {
            let deps: Vec<String> = if layer == 0 {
                Vec::new()
            } else {
                (0..width).map(|j| format!("l{}_{}", layer - 1, j)).collect()
            };
            records.push(TaskRecord::new(format!("l{layer}_{i}"), "true", deps));
        }
    }
    records
}

fn assert_dispatched_once(log: &Mutex<HashMap<String, usize>>, expected: usize) {
    let log = log.lock();
    assert_eq!(log.len(), expected);
    assert!(log.values().all(|&n| n == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_workers_share_one_scheduler() {
    let records = layered(6, 5);
    let scheduler = Arc::new(plan(&records).unwrap());
    let log = Arc::new(Mutex::new(HashMap::<String, usize>::new()));

    let mut workers = Vec::new();
    for _ in 0..4 {
        let scheduler = Arc::clone(&scheduler);
        let log = Arc::clone(&log);
        workers.push(tokio::spawn(async move {
            loop {
                scheduler.wait_for_work().await;
                if scheduler.is_settled() {
                    break;
                }
                // 每次只取一个，其余留给其它 worker
                let Some(id) = scheduler.ready().into_iter().next() else {
                    continue;
                };
                if scheduler.mark_dispatched(&id).is_err() {
                    continue;
                }
                *log.lock().entry(id.clone()).or_default() += 1;
                tokio::task::yield_now().await;
                scheduler.mark_completed(&id).unwrap();
            }
        }));
    }

    for worker in workers {
        worker.await.unwrap();
    }

    assert!(scheduler.is_finished());
    assert_dispatched_once(&log, records.len());
}

#[test]
fn threads_polling_take_ready() {
    let records = layered(5, 8);
    let scheduler: Arc<Scheduler> = Arc::new(plan(&records).unwrap());
    let log = Arc::new(Mutex::new(HashMap::<String, usize>::new()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            let log = Arc::clone(&log);
            thread::spawn(move || {
                while !scheduler.is_settled() {
                    let batch = scheduler.take_ready();
                    if batch.is_empty() {
                        thread::yield_now();
                        continue;
                    }
                    for task in batch {
                        *log.lock().entry(task.id.clone()).or_default() += 1;
                        scheduler.mark_completed(&task.id).unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(scheduler.is_finished());
    assert_dispatched_once(&log, records.len());
}
