//! Reflected methods, invoked with [`Variant`] arguments.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use log::warn;
use thiserror::Error;

use crate::types::{Describe, Type};
use crate::variant::Variant;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("expected {expected} arguments, got {found}")]
    Arity { expected: usize, found: usize },
    #[error("argument {index} should be {expected}, got {found}")]
    Argument {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("receiver does not match the slot's class")]
    Receiver,
}

pub(crate) trait Invoker {
    fn signature(&self) -> Vec<Type>;

    fn call(&self, receiver: &mut dyn Any, args: &[Variant]) -> Result<(), SlotError>;
}

/// Adapts a Rust closure taking the receiver and up to four described
/// arguments to a [`Slot`].
pub trait SlotFn<T, Args>: 'static {
    #[doc(hidden)]
    fn signature() -> Vec<Type>;

    #[doc(hidden)]
    fn apply(&self, receiver: &mut T, args: &[Variant]) -> Result<(), SlotError>;
}

fn argument<A: Describe>(args: &[Variant], index: usize) -> Result<A, SlotError> {
    args[index].get::<A>().ok_or_else(|| SlotError::Argument {
        index,
        expected: A::type_name().into_owned(),
        found: args[index].type_name().into_owned(),
    })
}

macro_rules! slot_fns {
    ($($count:literal => ($($arg:ident: $index:tt),*);)*) => {$(
        impl<T, F, $($arg: Describe),*> SlotFn<T, ($($arg,)*)> for F
        where
            F: Fn(&mut T, $($arg),*) + 'static,
        {
            fn signature() -> Vec<Type> {
                vec![$($arg::TYPE),*]
            }

            #[allow(non_snake_case)]
            fn apply(&self, receiver: &mut T, args: &[Variant]) -> Result<(), SlotError> {
                if args.len() != $count {
                    return Err(SlotError::Arity {
                        expected: $count,
                        found: args.len(),
                    });
                }
                $(let $arg = argument::<$arg>(args, $index)?;)*
                self(receiver, $($arg),*);
                Ok(())
            }
        }
    )*};
}

slot_fns! {
    0 => ();
    1 => (A: 0);
    2 => (A: 0, B: 1);
    3 => (A: 0, B: 1, C: 2);
    4 => (A: 0, B: 1, C: 2, D: 3);
}

struct Bound<T, Args, F> {
    f: F,
    _marker: PhantomData<fn(&mut T, Args)>,
}

impl<T: 'static, Args: 'static, F: SlotFn<T, Args>> Invoker for Bound<T, Args, F> {
    fn signature(&self) -> Vec<Type> {
        F::signature()
    }

    fn call(&self, receiver: &mut dyn Any, args: &[Variant]) -> Result<(), SlotError> {
        let receiver = receiver.downcast_mut::<T>().ok_or(SlotError::Receiver)?;
        self.f.apply(receiver, args)
    }
}

pub struct Slot {
    name: String,
    signature: Vec<Type>,
    invoker: Box<dyn Invoker>,
}

impl Slot {
    pub(crate) fn new<T: 'static, Args: 'static>(name: String, f: impl SlotFn<T, Args>) -> Self {
        let invoker = Box::new(Bound {
            f,
            _marker: PhantomData,
        });
        Slot {
            name,
            signature: invoker.signature(),
            invoker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &[Type] {
        &self.signature
    }

    /// Calls the method with `args`, which must match the signature exactly.
    pub fn try_invoke(&self, receiver: &mut dyn Any, args: &[Variant]) -> Result<(), SlotError> {
        self.invoker.call(receiver, args)
    }

    /// Like [`try_invoke`](Self::try_invoke), logging the failure instead of
    /// returning it.
    pub fn invoke(&self, receiver: &mut dyn Any, args: &[Variant]) -> bool {
        match self.try_invoke(receiver, args) {
            Ok(()) => true,
            Err(err) => {
                warn!("slot `{}`: {err}", self.name);
                false
            }
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<_> = self.signature.iter().map(|ty| ty.name()).collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}
