use std::io;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An object that can run a task, possibly on another thread.
///
/// The reactor submits one exchange per task; whether that runs inline or
/// on a pool is the caller's choice.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Runs every task on the calling thread. The default.
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Fixed-size worker pool fed through a channel.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> io::Result<Self> {
        let (sender, receiver) = channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(size.max(1));
        for index in 0..size.max(1) {
            let receiver = receiver.clone();
            let worker = std::thread::Builder::new()
                .name(format!("hearth-worker-{}", index))
                .spawn(move || worker_loop(receiver))?;
            workers.push(worker);
        }

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Task>>>) {
    loop {
        let task = {
            let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.recv()
        };
        match task {
            Ok(task) => task(),
            // Channel closed: the pool is shutting down.
            Err(_) => break,
        }
    }
}

impl Executor for WorkerPool {
    fn execute(&self, task: Task) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = sender.as_ref() {
            if sender.send(task).is_err() {
                tracing::warn!("Worker pool is shut down; task dropped");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Dropping the sender closes the channel and lets the workers drain.
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            let _ = worker.join();
        }
    }
}
