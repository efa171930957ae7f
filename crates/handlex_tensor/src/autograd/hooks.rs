use crate::Tensor;
use handlex_core::error::{Error, Result};
use std::sync::Arc;

/// A gradient hook after type erasure. `Ok(None)` passes the gradient through.
pub type Hook = Arc<dyn Fn(&Tensor) -> Result<Option<Tensor>> + Send + Sync>;

/// Return types a hook closure may use.
pub trait HookOutput {
    fn into_replacement(self) -> Result<Option<Tensor>>;
}

impl HookOutput for () {
    fn into_replacement(self) -> Result<Option<Tensor>> {
        Ok(None)
    }
}

impl HookOutput for Tensor {
    fn into_replacement(self) -> Result<Option<Tensor>> {
        Ok(Some(self))
    }
}

impl HookOutput for Option<Tensor> {
    fn into_replacement(self) -> Result<Option<Tensor>> {
        Ok(self)
    }
}

impl HookOutput for Result<Tensor> {
    fn into_replacement(self) -> Result<Option<Tensor>> {
        self.map(Some)
    }
}

impl HookOutput for Result<Option<Tensor>> {
    fn into_replacement(self) -> Result<Option<Tensor>> {
        self
    }
}

pub(crate) fn erase<F, R>(hook: F) -> Hook
where
    F: Fn(&Tensor) -> R + Send + Sync + 'static,
    R: HookOutput,
{
    Arc::new(move |grad: &Tensor| hook(grad).into_replacement())
}

/// Ordered hooks keyed by the id handed out at registration.
///
/// Ids are never reused, so a removed id stays invalid.
#[derive(Default)]
pub struct HookList {
    entries: Vec<(usize, Hook)>,
    next_id: usize,
}

impl HookList {
    pub fn push(&mut self, hook: Hook) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, hook));
        id
    }

    pub fn remove(&mut self, id: usize) -> Result<()> {
        // ids are pushed in increasing order
        match self.entries.binary_search_by_key(&id, |(entry_id, _)| *entry_id) {
            Ok(pos) => {
                self.entries.remove(pos);
                Ok(())
            },
            Err(_) => Err(Error::InvalidHook { id }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The live hooks in registration order, cloned so they can run without the lock.
    pub fn snapshot(&self) -> Vec<Hook> {
        self.entries.iter().map(|(_, hook)| hook.clone()).collect()
    }
}

/// Feeds `grad` through `hooks` in order; each hook sees the previous one's output.
///
/// An undefined gradient skips every hook. A replacement must keep the gradient's shape
/// and dtype.
pub(crate) fn run_hooks(hooks: &[Hook], mut grad: Tensor) -> Result<Tensor> {
    if !grad.is_defined() {
        return Ok(grad);
    }
    for (i, hook) in hooks.iter().enumerate() {
        if let Some(replacement) = hook(&grad)? {
            if !replacement.is_defined() {
                return Err(Error::RequiresGrad(format!("hook {} returned an undefined gradient", i)));
            }
            if replacement.sizes() != grad.sizes() {
                return Err(Error::IncompatibleShape(format!(
                    "hook {} changed the gradient shape from {:?} to {:?}",
                    i,
                    grad.sizes(),
                    replacement.sizes()
                )));
            }
            if replacement.dtype() != grad.dtype() {
                return Err(Error::DTypeMismatch {
                    expected: grad.dtype(),
                    got: replacement.dtype(),
                });
            }
            grad = replacement;
        }
    }
    Ok(grad)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Hook {
        erase(|_: &Tensor| ())
    }

    #[test]
    fn ids_stay_stable_after_removal() {
        let mut list = HookList::default();
        let a = list.push(noop());
        let b = list.push(noop());
        let c = list.push(noop());
        assert_eq!((a, b, c), (0, 1, 2));

        list.remove(b).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.snapshot().len(), 2);
        assert_eq!(list.push(noop()), 3);
    }

    #[test]
    fn removal_frees_the_entry() {
        let mut list = HookList::default();
        for _ in 0..1000 {
            let id = list.push(noop());
            list.remove(id).unwrap();
        }
        assert!(list.is_empty());
        assert!(list.entries.capacity() < 8);
        assert_eq!(list.push(noop()), 1000);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn removing_twice_is_an_error() {
        let mut list = HookList::default();
        let id = list.push(noop());
        list.remove(id).unwrap();
        assert!(matches!(list.remove(id), Err(Error::InvalidHook { id: 0 })));
        assert!(matches!(list.remove(7), Err(Error::InvalidHook { id: 7 })));
    }

    #[test]
    fn undefined_gradient_skips_hooks() {
        let hook: Hook = Arc::new(|_: &Tensor| -> Result<Option<Tensor>> { panic!("must not run") });
        let out = run_hooks(&[hook], Tensor::default()).unwrap();
        assert!(!out.is_defined());
    }
}
