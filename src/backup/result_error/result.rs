use crate::backup::result_error::error::Error;
use crate::backup::result_error::failure::{Failure, FailureCategory};
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use std::fmt::Debug;

pub type Result<T> = std::result::Result<T, Error>;

impl<S: Into<String>, O: Debug + Send + 'static, R> WithDebugObjectAndFnName<S, O> for Result<R> {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        self.map_err(|e| e.with_debug_object_and_fn_name(obj, fn_name))
    }
}

impl<R, S: Into<String>> WithMsg<S> for Result<R> {
    fn with_msg(self, msg: S) -> Self {
        self.map_err(|e| e.with_msg(msg))
    }
}

/// Shorthand for returning an escalation from a step.
pub fn escalate<T, D1: Into<String>, D2: Into<String>>(
    category: FailureCategory,
    description: D1,
    detail: D2,
) -> Result<T> {
    Err(Failure::new(category, description, detail).into())
}
