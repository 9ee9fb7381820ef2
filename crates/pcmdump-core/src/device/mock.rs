//! Scripted device for testing engine logic without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{Device, DeviceError, TimeoutScenario, VpwSpeed};
use crate::protocol::Message;

/// One scripted inbound event.
#[derive(Debug, Clone)]
enum Scripted {
    /// A frame the "bus" delivers.
    Frame(Vec<u8>),
    /// A read window that elapses with nothing on the bus.
    Silence,
    /// A transport fault.
    Fault(String),
}

#[derive(Debug)]
struct Inner {
    script: VecDeque<Scripted>,
    sent: Vec<Vec<u8>>,
    clear_calls: usize,
    receive_calls: usize,
    timeouts: Vec<TimeoutScenario>,
    speeds: Vec<VpwSpeed>,
    supports_4x: bool,
    max_send_size: u16,
    max_receive_size: u16,
    fail_sends: bool,
}

/// Mock device for unit testing engine sequences.
///
/// Clones share state, so a test can keep a handle for scripting and
/// inspection while the engine owns the device.
#[derive(Clone)]
pub struct MockDevice {
    inner: Arc<Mutex<Inner>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                script: VecDeque::new(),
                sent: Vec::new(),
                clear_calls: 0,
                receive_calls: 0,
                timeouts: Vec::new(),
                speeds: Vec::new(),
                supports_4x: true,
                max_send_size: 1024,
                max_receive_size: 1024,
                fail_sends: false,
            })),
        }
    }

    pub fn with_capabilities(supports_4x: bool, max_send: u16, max_receive: u16) -> Self {
        let mock = Self::new();
        {
            let mut inner = mock.inner.lock().unwrap();
            inner.supports_4x = supports_4x;
            inner.max_send_size = max_send;
            inner.max_receive_size = max_receive;
        }
        mock
    }

    /// Queue a frame to be delivered on a future read.
    pub fn queue_frame(&self, bytes: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .script
            .push_back(Scripted::Frame(bytes.to_vec()));
    }

    /// Queue an empty read window.
    pub fn queue_silence(&self) {
        self.inner.lock().unwrap().script.push_back(Scripted::Silence);
    }

    /// Queue a transport fault.
    pub fn queue_fault(&self, reason: &str) {
        self.inner
            .lock()
            .unwrap()
            .script
            .push_back(Scripted::Fault(reason.to_string()));
    }

    /// Make every send fail until cleared.
    pub fn fail_sends(&self, fail: bool) {
        self.inner.lock().unwrap().fail_sends = fail;
    }

    /// All frames the engine transmitted, in order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// How many times the inbound queue was drained.
    pub fn clear_calls(&self) -> usize {
        self.inner.lock().unwrap().clear_calls
    }

    /// How many read windows the engine consumed.
    pub fn receive_calls(&self) -> usize {
        self.inner.lock().unwrap().receive_calls
    }

    /// Every timeout scenario the engine selected, in order.
    pub fn timeout_log(&self) -> Vec<TimeoutScenario> {
        self.inner.lock().unwrap().timeouts.clone()
    }

    /// Every electrical speed change the engine requested, in order.
    pub fn speed_log(&self) -> Vec<VpwSpeed> {
        self.inner.lock().unwrap().speeds.clone()
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for MockDevice {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn send_message(&mut self, message: &Message) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_sends {
            return Err(DeviceError::SendFailed("scripted failure".into()));
        }
        inner.sent.push(message.as_bytes().to_vec());
        Ok(())
    }

    fn receive_message(&mut self) -> Result<Option<Message>, DeviceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.receive_calls += 1;
        match inner.script.pop_front() {
            Some(Scripted::Frame(bytes)) => Ok(Some(Message::new(bytes))),
            Some(Scripted::Silence) | None => Ok(None),
            Some(Scripted::Fault(reason)) => Err(DeviceError::ReceiveFailed(reason)),
        }
    }

    // Counts drains but leaves the script in place, so a test can pre-load
    // an entire conversation before handing the device to the engine.
    fn clear_message_queue(&mut self) {
        self.inner.lock().unwrap().clear_calls += 1;
    }

    fn set_timeout(&mut self, scenario: TimeoutScenario) {
        self.inner.lock().unwrap().timeouts.push(scenario);
    }

    fn set_vpw_speed(&mut self, speed: VpwSpeed) -> Result<(), DeviceError> {
        self.inner.lock().unwrap().speeds.push(speed);
        Ok(())
    }

    fn supports_4x(&self) -> bool {
        self.inner.lock().unwrap().supports_4x
    }

    fn max_send_size(&self) -> u16 {
        self.inner.lock().unwrap().max_send_size
    }

    fn max_receive_size(&self) -> u16 {
        self.inner.lock().unwrap().max_receive_size
    }

    fn description(&self) -> &str {
        "mock device"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_and_silence() {
        let mock = MockDevice::new();
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x7C]);
        mock.queue_silence();
        mock.queue_frame(&[0x6C, 0xF0, 0x10, 0x67]);

        let mut device = mock.clone();
        assert_eq!(
            device.receive_message().unwrap().unwrap().as_bytes(),
            &[0x6C, 0xF0, 0x10, 0x7C]
        );
        assert!(device.receive_message().unwrap().is_none());
        assert_eq!(
            device.receive_message().unwrap().unwrap().as_bytes(),
            &[0x6C, 0xF0, 0x10, 0x67]
        );
        // Script exhausted: reads time out.
        assert!(device.receive_message().unwrap().is_none());
    }

    #[test]
    fn send_capture_and_fault() {
        let mock = MockDevice::new();
        let mut device = mock.clone();

        device.send_message(&Message::from(&[0x6C, 0x10, 0xF0, 0x3C, 0x01][..])).unwrap();
        assert_eq!(mock.sent_frames(), vec![vec![0x6C, 0x10, 0xF0, 0x3C, 0x01]]);

        mock.fail_sends(true);
        assert!(device.send_message(&Message::from(&[0x6C][..])).is_err());

        mock.queue_fault("unplugged");
        assert!(device.receive_message().is_err());
    }

    #[test]
    fn clear_is_counted_but_script_survives() {
        let mock = MockDevice::new();
        mock.queue_frame(&[0x01]);
        let mut device = mock.clone();
        device.clear_message_queue();
        assert_eq!(mock.clear_calls(), 1);
        assert!(device.receive_message().unwrap().is_some());
    }
}
