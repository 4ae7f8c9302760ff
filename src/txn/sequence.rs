use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use tracing::debug;

use crate::core::errors::StrataError;
use crate::core::name::TableName;

use super::TxnId;

/// Source of sequence values for transactions.
pub trait SequenceManager: Send + Sync + fmt::Debug {
    fn next_value(&self, txn: TxnId, name: &TableName) -> Result<i64, StrataError>;

    fn set_value(&self, txn: TxnId, name: &TableName, value: i64) -> Result<(), StrataError>;

    /// Drop any cached generator state for `name` so it is reloaded on next use.
    fn flush_generator(&self, name: &TableName);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceInfo {
    pub start: i64,
    pub increment: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub cycle: bool,
}

impl Default for SequenceInfo {
    fn default() -> Self {
        Self {
            start: 1,
            increment: 1,
            min_value: 1,
            max_value: i64::MAX,
            cycle: false,
        }
    }
}

impl SequenceInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, start: i64) -> Self {
        self.start = start;
        self
    }

    pub fn increment(mut self, increment: i64) -> Self {
        self.increment = increment;
        self
    }

    pub fn min_value(mut self, min_value: i64) -> Self {
        self.min_value = min_value;
        self
    }

    pub fn max_value(mut self, max_value: i64) -> Self {
        self.max_value = max_value;
        self
    }

    pub fn cycle(mut self, cycle: bool) -> Self {
        self.cycle = cycle;
        self
    }

    fn validate(&self, name: &TableName) -> Result<(), StrataError> {
        if self.increment == 0 {
            return Err(StrataError::InvalidState(format!("sequence {name} has a zero increment")));
        }
        if self.min_value > self.max_value || !(self.min_value..=self.max_value).contains(&self.start) {
            return Err(StrataError::InvalidState(format!(
                "sequence {name} starts outside [{}, {}]",
                self.min_value, self.max_value
            )));
        }
        Ok(())
    }

    fn contains(&self, value: i64) -> bool {
        (self.min_value..=self.max_value).contains(&value)
    }
}

#[derive(Debug)]
struct Generator {
    info: SequenceInfo,
    last: Option<i64>,
}

impl Generator {
    fn advance(&mut self, name: &TableName) -> Result<i64, StrataError> {
        let next = match self.last {
            None => self.info.start,
            Some(last) => match last.checked_add(self.info.increment) {
                Some(next) if self.info.contains(next) => next,
                _ if self.info.cycle => {
                    if self.info.increment > 0 {
                        self.info.min_value
                    } else {
                        self.info.max_value
                    }
                }
                _ => return Err(StrataError::SequenceExhausted(name.clone())),
            },
        };
        self.last = Some(next);
        Ok(next)
    }
}

/// Sequences held entirely in memory. Values are not transactional: a value
/// handed out is consumed even if the transaction rolls back.
#[derive(Debug, Default)]
pub struct InMemorySequences {
    generators: Mutex<HashMap<TableName, Generator>>,
}

impl InMemorySequences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_sequence(&self, name: TableName, info: SequenceInfo) -> Result<(), StrataError> {
        info.validate(&name)?;
        let mut generators = self.generators.lock();
        if generators.contains_key(&name) {
            return Err(StrataError::TableAlreadyExists(name));
        }
        generators.insert(name, Generator { info, last: None });
        Ok(())
    }

    pub fn drop_sequence(&self, name: &TableName) -> Result<(), StrataError> {
        self.generators
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StrataError::SequenceNotFound(name.clone()))
    }

    pub fn sequence_exists(&self, name: &TableName) -> bool {
        self.generators.lock().contains_key(name)
    }
}

impl SequenceManager for InMemorySequences {
    fn next_value(&self, txn: TxnId, name: &TableName) -> Result<i64, StrataError> {
        let mut generators = self.generators.lock();
        let generator = generators
            .get_mut(name)
            .ok_or_else(|| StrataError::SequenceNotFound(name.clone()))?;
        let value = generator.advance(name)?;
        debug!(txn_id = txn, sequence = %name, value, "sequence advanced");
        Ok(value)
    }

    fn set_value(&self, _txn: TxnId, name: &TableName, value: i64) -> Result<(), StrataError> {
        let mut generators = self.generators.lock();
        let generator = generators
            .get_mut(name)
            .ok_or_else(|| StrataError::SequenceNotFound(name.clone()))?;
        if !generator.info.contains(value) {
            return Err(StrataError::InvalidState(format!(
                "value {value} is outside the range of sequence {name}"
            )));
        }
        generator.last = Some(value);
        Ok(())
    }

    fn flush_generator(&self, name: &TableName) {
        // Generators live only in memory; there is no backing store to reload from.
        debug!(sequence = %name, "flush requested for in-memory sequence");
    }
}
