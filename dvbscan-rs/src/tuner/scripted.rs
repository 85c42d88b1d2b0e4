//! Frontend that locks according to a script.
//!
//! Lock is reported for a frequency once it has been polled a configured
//! number of times. A tune hook lets a test switch the demux content to the
//! multiplex on the new frequency.

use std::collections::{HashMap, HashSet};
use std::io;

use dvbscan_si::DeliveryKind;

use super::Frontend;
use crate::error::TunerError;
use crate::model::Transponder;

pub struct ScriptedFrontend {
    kind: DeliveryKind,
    lock_after: HashMap<u32, u32>,
    polls: HashMap<u32, u32>,
    rejected: HashSet<u32>,
    current: Option<u32>,
    tuned: Vec<u32>,
    on_tune: Option<Box<dyn FnMut(u32)>>,
}

impl ScriptedFrontend {
    pub fn new(kind: DeliveryKind) -> Self {
        Self {
            kind,
            lock_after: HashMap::new(),
            polls: HashMap::new(),
            rejected: HashSet::new(),
            current: None,
            tuned: Vec::new(),
            on_tune: None,
        }
    }

    /// Lock on `frequency` at the first poll.
    pub fn lock(&mut self, frequency: u32) {
        self.lock_after(frequency, 1);
    }

    /// Lock on `frequency` once it has been polled `polls` times in total.
    pub fn lock_after(&mut self, frequency: u32, polls: u32) {
        self.lock_after.insert(frequency, polls);
    }

    /// Setting `frequency` fails like a refused ioctl.
    pub fn reject(&mut self, frequency: u32) {
        self.rejected.insert(frequency);
    }

    /// Called with the frequency after every successful set.
    pub fn on_tune(&mut self, hook: impl FnMut(u32) + 'static) {
        self.on_tune = Some(Box::new(hook));
    }

    /// Every frequency set so far, in order.
    pub fn tuned(&self) -> Vec<u32> {
        self.tuned.clone()
    }
}

impl Frontend for ScriptedFrontend {
    fn kind(&self) -> DeliveryKind {
        self.kind
    }

    fn set_frontend(&mut self, tp: &Transponder) -> Result<(), TunerError> {
        self.tuned.push(tp.frequency);
        if self.rejected.contains(&tp.frequency) {
            self.current = None;
            return Err(TunerError::Ioctl {
                op: "FE_SET_FRONTEND",
                source: io::Error::from(io::ErrorKind::InvalidInput),
            });
        }
        self.current = Some(tp.frequency);
        if let Some(hook) = self.on_tune.as_mut() {
            hook(tp.frequency);
        }
        Ok(())
    }

    fn has_lock(&mut self) -> Result<bool, TunerError> {
        let Some(frequency) = self.current else {
            return Ok(false);
        };
        let polls = self.polls.entry(frequency).or_insert(0);
        *polls += 1;
        Ok(self
            .lock_after
            .get(&frequency)
            .map_or(false, |needed| *polls >= *needed))
    }
}
