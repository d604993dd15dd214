use std::{fmt, marker::PhantomData};

use serde::{Deserialize, Serialize};

/// Identifies a student across the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(pub u64);

/// Identifies a supervisor across the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupervisorId(pub u64);

impl From<u64> for StudentId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<u64> for SupervisorId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "student-{}", self.0)
    }
}

impl fmt::Display for SupervisorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "supervisor-{}", self.0)
    }
}

/// Hands out strictly increasing ids, never reusing one.
#[derive(Debug)]
pub struct IdCounter<T> {
    next: u64,
    _id: PhantomData<T>,
}

impl<T: From<u64>> IdCounter<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            _id: PhantomData,
        }
    }

    /// Returns a fresh id.
    pub fn next_id(&mut self) -> T {
        let id = self.next;
        self.next += 1;
        T::from(id)
    }

    /// Returns how many ids have been handed out.
    pub fn issued(&self) -> u64 {
        self.next
    }
}

impl<T: From<u64>> Default for IdCounter<T> {
    fn default() -> Self {
        Self::new()
    }
}
