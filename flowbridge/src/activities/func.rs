use crate::fault::Fault;
use crate::runtime::{Activity, ActivityContext, ActivityRef};
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Synchronous activity backed by a closure
///
/// The closure's return value becomes the activity result; return `()` for
/// activities that only have side effects.
pub struct FuncActivity<F, R> {
    display_name: String,
    func: F,
    _output: PhantomData<fn() -> R>,
}

impl<F, R> FuncActivity<F, R>
where
    F: Fn(&mut ActivityContext<'_>) -> Result<R, Fault> + Send + Sync + 'static,
    R: Any + Send,
{
    /// Create a code activity
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            display_name: name.into(),
            func,
            _output: PhantomData,
        }
    }
}

impl<F, R> Activity for FuncActivity<F, R>
where
    F: Fn(&mut ActivityContext<'_>) -> Result<R, Fault> + Send + Sync + 'static,
    R: Any + Send,
{
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), Fault> {
        let value = (self.func)(ctx)?;
        ctx.set_result(value);
        Ok(())
    }
}

/// Build a code activity from a closure
pub fn code<F, R>(name: impl Into<String>, func: F) -> ActivityRef
where
    F: Fn(&mut ActivityContext<'_>) -> Result<R, Fault> + Send + Sync + 'static,
    R: Any + Send,
{
    Arc::new(FuncActivity::new(name, func))
}
