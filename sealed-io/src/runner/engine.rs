use std::any::Any;

use tracing::error;

use crate::error::{Error, Result};

/// How a phase's workers are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    /// One scoped OS thread per worker.
    #[default]
    Std,
    /// `spawn_blocking` tasks on a dedicated tokio runtime whose blocking
    /// pool is sized to the worker cap.
    TokioSpawnBlocking,
}

pub(crate) type Task<T> = Box<dyn FnOnce() -> T + Send + 'static>;

pub(crate) enum Engine {
    Std,
    TokioSpawnBlocking { rt: tokio::runtime::Runtime },
}

impl Engine {
    pub(crate) fn new(kind: EngineKind, worker_cap: usize) -> Result<Self> {
        Ok(match kind {
            EngineKind::Std => Engine::Std,
            EngineKind::TokioSpawnBlocking => {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .max_blocking_threads(worker_cap)
                    .thread_name("sealed-io-blocking")
                    .build()
                    .map_err(Error::Spawn)?;
                Engine::TokioSpawnBlocking { rt }
            }
        })
    }

    /// Runs every task on its own worker and returns once all of them have
    /// finished, with one value per task in task order.
    ///
    /// Workers report through a channel with one slot per worker. A worker
    /// that never reports (it panicked, or could not be spawned) is replaced
    /// by `on_lost(index, error)`; the others are unaffected.
    ///
    /// Must not be called from within an async context.
    pub(crate) fn fan_out<T, F>(&self, tasks: Vec<Task<T>>, on_lost: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(usize, Error) -> T,
    {
        let n = tasks.len();
        let (reported, lost) = match self {
            Engine::Std => fan_out_std(tasks),
            Engine::TokioSpawnBlocking { rt } => rt.block_on(fan_out_tokio(tasks)),
        };

        let mut slots: Vec<Option<T>> = (0..n).map(|_| None).collect();
        for (index, value) in reported {
            slots[index] = Some(value);
        }
        for (index, e) in lost {
            error!(worker = index, error = %e, "worker did not report");
            if slots[index].is_none() {
                slots[index] = Some(on_lost(index, e));
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    on_lost(
                        index,
                        Error::Panicked("worker exited without reporting".to_owned()),
                    )
                })
            })
            .collect()
    }
}

type FanOut<T> = (Vec<(usize, T)>, Vec<(usize, Error)>);

fn fan_out_std<T: Send + 'static>(tasks: Vec<Task<T>>) -> FanOut<T> {
    let (tx, rx) = std::sync::mpsc::sync_channel(tasks.len());
    let mut lost = Vec::new();
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.into_iter().enumerate() {
            let tx = tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("sealed-io-worker-{index}"))
                .spawn_scoped(scope, move || {
                    let value = task();
                    // one slot per worker, so this cannot be full
                    let _ = tx.try_send((index, value));
                });
            match spawned {
                Ok(handle) => handles.push((index, handle)),
                Err(e) => lost.push((index, Error::Spawn(e))),
            }
        }
        for (index, handle) in handles {
            if let Err(payload) = handle.join() {
                lost.push((index, Error::Panicked(panic_message(payload))));
            }
        }
    });
    drop(tx);
    (rx.try_iter().collect(), lost)
}

async fn fan_out_tokio<T: Send + 'static>(tasks: Vec<Task<T>>) -> FanOut<T> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(tasks.len().max(1));
    let handles: Vec<_> = tasks
        .into_iter()
        .enumerate()
        .map(|(index, task)| {
            let tx = tx.clone();
            tokio::task::spawn_blocking(move || {
                let value = task();
                // one slot per worker, so this cannot be full
                let _ = tx.try_send((index, value));
            })
        })
        .collect();
    drop(tx);

    let mut lost = Vec::new();
    for (index, res) in futures::future::join_all(handles)
        .await
        .into_iter()
        .enumerate()
    {
        if let Err(e) = res {
            let e = if e.is_panic() {
                Error::Panicked(panic_message(e.into_panic()))
            } else {
                Error::Panicked(e.to_string())
            };
            lost.push((index, e));
        }
    }

    let mut reported = Vec::new();
    while let Some(msg) = rx.recv().await {
        reported.push(msg);
    }
    (reported, lost)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engines() -> Vec<Engine> {
        vec![
            Engine::new(EngineKind::Std, 4).unwrap(),
            Engine::new(EngineKind::TokioSpawnBlocking, 4).unwrap(),
        ]
    }

    #[test]
    fn results_come_back_in_task_order() {
        for engine in engines() {
            let tasks: Vec<Task<usize>> = (0..4usize)
                .map(|i| {
                    Box::new(move || {
                        std::thread::sleep(std::time::Duration::from_millis(10 * (4 - i) as u64));
                        i * 10
                    }) as Task<usize>
                })
                .collect();
            let out = engine.fan_out(tasks, |_, _| usize::MAX);
            assert_eq!(out, vec![0, 10, 20, 30]);
        }
    }

    #[test]
    fn panicking_worker_does_not_block_the_others() {
        for engine in engines() {
            let tasks: Vec<Task<Result<usize>>> = (0..4usize)
                .map(|i| {
                    Box::new(move || {
                        if i == 2 {
                            panic!("worker {i} blew up");
                        }
                        Ok(i)
                    }) as Task<Result<usize>>
                })
                .collect();
            let out = engine.fan_out(tasks, |_, e| Err(e));
            assert_eq!(out.len(), 4);
            for (i, res) in out.iter().enumerate() {
                match res {
                    Ok(v) => assert_eq!(*v, i),
                    Err(Error::Panicked(msg)) => {
                        assert_eq!(i, 2);
                        assert!(msg.contains("worker 2 blew up"), "{msg}");
                    }
                    Err(e) => panic!("unexpected error {e}"),
                }
            }
        }
    }

    #[test]
    fn no_tasks() {
        for engine in engines() {
            let out: Vec<u8> = engine.fan_out(Vec::new(), |_, _| 0);
            assert!(out.is_empty());
        }
    }
}
