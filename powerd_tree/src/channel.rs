//! A minimal `GroupChannel` abstraction and one in-process implementation.
//!
//! The real tree transport is an external collaborator (§1); this trait is
//! the seam this core tests against, backed here by `std::sync::mpsc`.

use crate::error::{Error, Result};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};

/// One directed endpoint of a hierarchical group communicator. An endpoint
/// is unidirectional: a sender implements `send` and a no-op `try_recv`, a
/// receiver the reverse. This matches how `TreeComm` uses each endpoint.
pub trait GroupChannel: Send {
    fn send(&mut self, message: Vec<f64>) -> Result<()>;
    /// Returns the most recent unread message, or `None` if none has
    /// arrived since the last call. Never blocks.
    fn try_recv(&mut self) -> Result<Option<Vec<f64>>>;
}

struct MpscSender(Sender<Vec<f64>>);

impl GroupChannel for MpscSender {
    fn send(&mut self, message: Vec<f64>) -> Result<()> {
        self.0.send(message).map_err(|_| Error::Ordering("peer channel endpoint dropped".into()))
    }

    fn try_recv(&mut self) -> Result<Option<Vec<f64>>> {
        Ok(None)
    }
}

struct MpscReceiver(Receiver<Vec<f64>>);

impl GroupChannel for MpscReceiver {
    fn send(&mut self, _message: Vec<f64>) -> Result<()> {
        Err(Error::Ordering("cannot send on a receive-only channel endpoint".into()))
    }

    /// Drains the channel and keeps only the most recent message, matching
    /// "receive_down/receive_up reflects at most the most recent send."
    fn try_recv(&mut self) -> Result<Option<Vec<f64>>> {
        let mut latest = None;
        loop {
            match self.0.try_recv() {
                Ok(msg) => latest = Some(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(latest)
    }
}

/// Builds one unidirectional channel: `(sender, receiver)`.
pub fn mpsc_pair() -> (Box<dyn GroupChannel>, Box<dyn GroupChannel>) {
    let (tx, rx) = std::sync::mpsc::channel();
    (Box::new(MpscSender(tx)), Box::new(MpscReceiver(rx)))
}
