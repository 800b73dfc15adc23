use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::value::Value;

/// How a block finished, as reported by the block executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Normal completion with a value.
    Return(Value),
    /// A `break` aimed at a loop in some enclosing call stack.
    Break(Value),
    /// A managed exception escaped the block.
    Raise(Value),
}

/// Why a thread's block did not complete normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The block raised this exception object.
    Raised(Value),
    /// The block tried to break out to a frame on another OS thread.
    StrayBreak(Value),
    /// The executor itself panicked.
    Panicked(String),
}

impl Termination {
    /// The managed value carried by the termination, if any.
    pub fn value(&self) -> Option<Value> {
        match self {
            Termination::Raised(value) | Termination::StrayBreak(value) => Some(*value),
            Termination::Panicked(_) => None,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Raised(exception) => write!(f, "raised {}", exception),
            Termination::StrayBreak(value) => {
                write!(f, "break from proc-closure ({}) cannot cross a thread boundary", value)
            }
            Termination::Panicked(message) => write!(f, "panicked: {}", message),
        }
    }
}

/// The outcome that crosses the OS-thread boundary at join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Normal(Value),
    Abnormal(Termination),
}

impl Completion {
    pub fn is_normal(&self) -> bool {
        matches!(self, Completion::Normal(_))
    }

    /// The produced value of a normal completion.
    pub fn value(&self) -> Option<Value> {
        match self {
            Completion::Normal(value) => Some(*value),
            Completion::Abnormal(_) => None,
        }
    }

    pub fn termination(&self) -> Option<&Termination> {
        match self {
            Completion::Normal(_) => None,
            Completion::Abnormal(termination) => Some(termination),
        }
    }

    pub fn into_result(self) -> Result<Value, Termination> {
        match self {
            Completion::Normal(value) => Ok(value),
            Completion::Abnormal(termination) => Err(termination),
        }
    }
}

impl From<Flow> for Completion {
    fn from(flow: Flow) -> Self {
        match flow {
            Flow::Return(value) => Completion::Normal(value),
            Flow::Raise(exception) => Completion::Abnormal(Termination::Raised(exception)),
            Flow::Break(value) => Completion::Abnormal(Termination::StrayBreak(value)),
        }
    }
}

/// A runtime closure: invoked once, with no arguments, on the thread it was
/// handed to.
pub trait Block: Send + 'static {
    fn call(self: Box<Self>) -> Flow;
}

impl<F> Block for F
where
    F: FnOnce() -> Flow + Send + 'static,
{
    fn call(self: Box<Self>) -> Flow {
        (*self)()
    }
}

pub type BoxedBlock = Box<dyn Block>;

/// Runs `block` to completion, converting whatever it does into a [`Completion`].
pub(crate) fn run_block(block: BoxedBlock) -> Completion {
    match panic::catch_unwind(AssertUnwindSafe(move || block.call())) {
        Ok(flow) => Completion::from(flow),
        Err(payload) => Completion::Abnormal(Termination::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
