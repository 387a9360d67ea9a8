/// Mesh radio collaborator and the shared handle around it.
///
/// Broadcasts come from the scan-callback context while the control loop
/// polls for inbound frames, so the transceiver sits behind a
/// critical-section mutex. A send holds the lock for one bounded transmit;
/// nothing inside ever waits on the other context.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::error::RadioError;
use crate::protocol::{MeshMessage, WIRE_SIZE};

/// Single-hop broadcast transceiver. No queueing, no retries.
pub trait MeshRadio {
    /// Broadcast one encoded frame.
    fn send(&mut self, frame: &[u8; WIRE_SIZE]) -> Result<(), RadioError>;

    /// Non-blocking poll. Copies a pending frame into `buf` and returns its
    /// length, or `Ok(None)` when nothing is waiting.
    fn try_receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RadioError>;
}

/// Radio handle shared by both execution contexts. `None` inside means the
/// transceiver failed to initialize and the mesh is off for the session.
pub struct SharedRadio<R> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Option<R>>>,
}

impl<R: MeshRadio> SharedRadio<R> {
    pub const fn new(radio: R) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Some(radio))),
        }
    }

    pub const fn unavailable() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.lock(|r| r.borrow().is_some())
    }

    /// Encode and transmit `msg` once.
    pub fn broadcast(&self, msg: &MeshMessage) -> Result<(), RadioError> {
        let frame = msg.encode();
        self.inner.lock(|r| match r.borrow_mut().as_mut() {
            Some(radio) => radio.send(&frame),
            None => Err(RadioError::Unavailable),
        })
    }

    /// Poll for one inbound frame. An absent radio never has one.
    pub fn try_receive(&self, buf: &mut [u8]) -> Result<Option<usize>, RadioError> {
        self.inner.lock(|r| match r.borrow_mut().as_mut() {
            Some(radio) => radio.try_receive(buf),
            None => Ok(None),
        })
    }

    /// Run `f` against the transceiver, if there is one.
    pub fn with<T>(&self, f: impl FnOnce(&mut R) -> T) -> Option<T> {
        self.inner.lock(|r| r.borrow_mut().as_mut().map(f))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory radio for host tests.
    use std::collections::VecDeque;
    use std::vec::Vec;

    use super::*;

    #[derive(Default)]
    pub struct LoopbackRadio {
        pub sent: Vec<[u8; WIRE_SIZE]>,
        pub inbound: VecDeque<Vec<u8>>,
        pub fail_sends: bool,
        pub fail_receive: bool,
    }

    impl MeshRadio for LoopbackRadio {
        fn send(&mut self, frame: &[u8; WIRE_SIZE]) -> Result<(), RadioError> {
            if self.fail_sends {
                return Err(RadioError::Send(-2));
            }
            self.sent.push(*frame);
            Ok(())
        }

        fn try_receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RadioError> {
            if self.fail_receive {
                return Err(RadioError::Receive(-1));
            }
            match self.inbound.pop_front() {
                Some(frame) => {
                    let len = frame.len().min(buf.len());
                    buf[..len].copy_from_slice(&frame[..len]);
                    Ok(Some(len))
                }
                None => Ok(None),
            }
        }
    }
}
