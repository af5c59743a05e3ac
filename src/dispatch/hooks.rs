//! Task hooks run just before a task is scheduled.
//!
//! A hook receives the task and returns it (possibly decorated) or `None`
//! to veto the request.

use crate::scheduler::task::RequestTask;

pub trait RequestTaskHook: Send + Sync {
    fn apply(&self, task: RequestTask) -> Option<RequestTask>;
}

impl<F> RequestTaskHook for F
where
    F: Fn(RequestTask) -> Option<RequestTask> + Send + Sync,
{
    fn apply(&self, task: RequestTask) -> Option<RequestTask> {
        self(task)
    }
}
