//! Background reader thread for the threaded tail strategy.

use std::{
    io,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use log::warn;

use super::{FileTail, LineBatch, TailStatus};

/// Messages sent from tail workers to the event loop.
#[derive(Debug)]
pub enum TailEvent {
    /// Lines read in one poll, in file order.
    Lines { id: u64, lines: Vec<String> },
    /// The tail hit an unrecoverable error and its worker has exited.
    Failed { id: u64, error: io::Error },
}

/// Handle to a running tail worker. Dropping it stops the thread.
#[derive(Debug)]
pub struct TailWorker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// Start polling `tail` every `interval` on a dedicated thread.
pub fn spawn_worker(
    id: u64,
    tail: FileTail,
    interval: Duration,
    events: Sender<TailEvent>,
) -> io::Result<TailWorker> {
    let (stop_tx, stop_rx) = bounded(1);
    let handle = thread::Builder::new()
        .name(format!("tail-{id}"))
        .spawn(move || worker_loop(id, tail, interval, stop_rx, events))?;
    Ok(TailWorker {
        stop: Some(stop_tx),
        handle: Some(handle),
    })
}

fn worker_loop(
    id: u64,
    mut tail: FileTail,
    interval: Duration,
    stop: Receiver<()>,
    events: Sender<TailEvent>,
) {
    let mut batch = LineBatch::new();
    loop {
        let status = tail.poll(&mut batch);
        let lines = batch.take_lines();
        if !lines.is_empty() && events.send(TailEvent::Lines { id, lines }).is_err() {
            return;
        }
        if status == TailStatus::Stopped {
            let error = batch
                .take_error()
                .unwrap_or_else(|| io::Error::other("tail stopped"));
            let _ = events.send(TailEvent::Failed { id, error });
            return;
        }
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

impl TailWorker {
    /// Signal the worker and wait for it to exit.
    pub fn stop(&mut self) {
        drop(self.stop.take());
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.join().is_err() {
            warn!("tail worker thread panicked");
        }
    }
}

impl Drop for TailWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
