use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use core::mem;
use parking_lot::Mutex;

use crate::{any::Instance, descriptor::Descriptor, injector::WeakInjector, resource::PendingResource};

#[derive(Clone)]
pub(crate) enum Slot {
    Shared(Instance),
    /// Injector registered in its own frame, held weakly so it never keeps itself alive.
    Injector { handle: WeakInjector, as_ref: bool },
}

impl Slot {
    fn instance(self) -> Option<Instance> {
        match self {
            Slot::Shared(instance) => Some(instance),
            Slot::Injector { handle, as_ref } => handle.upgrade().map(|injector| injector.into_instance(as_ref)),
        }
    }
}

#[derive(Default)]
pub(crate) struct Cache {
    pub(crate) map: BTreeMap<Descriptor, Slot>,
    pub(crate) pending: Vec<PendingResource>,
}

pub(crate) struct Frame {
    parent: Option<Arc<Frame>>,
    cache: Mutex<Cache>,
}

/// Chain of frames, the current one first. The last frame is the root.
#[derive(Clone)]
pub(crate) struct InstancePool {
    frame: Arc<Frame>,
}

impl InstancePool {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            frame: Arc::new(Frame {
                parent: None,
                cache: Mutex::new(Cache::default()),
            }),
        }
    }

    /// Pushes a new frame on top of this chain.
    #[must_use]
    pub(crate) fn child(&self) -> Self {
        Self {
            frame: Arc::new(Frame {
                parent: Some(self.frame.clone()),
                cache: Mutex::new(Cache::default()),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn is_root(&self) -> bool {
        self.frame.parent.is_none()
    }

    fn frames(&self) -> impl Iterator<Item = &Frame> {
        let mut next = Some(&*self.frame);
        core::iter::from_fn(move || {
            let frame = next?;
            next = frame.parent.as_deref();
            Some(frame)
        })
    }

    fn root(&self) -> &Frame {
        self.frames().last().unwrap_or(&*self.frame)
    }

    #[inline]
    fn target(&self, root: bool) -> &Frame {
        if root {
            self.root()
        } else {
            &self.frame
        }
    }

    /// Looks the descriptor up from the current frame down to the root.
    #[must_use]
    pub(crate) fn get(&self, descriptor: &Descriptor) -> Option<Instance> {
        for frame in self.frames() {
            let slot = frame.cache.lock().map.get(descriptor).cloned();
            if let Some(slot) = slot {
                return slot.instance();
            }
        }
        None
    }

    #[inline]
    #[must_use]
    pub(crate) fn contains(&self, descriptor: &Descriptor) -> bool {
        self.get(descriptor).is_some()
    }

    pub(crate) fn insert(&self, descriptor: Descriptor, instance: Instance, root: bool) {
        self.target(root).cache.lock().map.insert(descriptor, Slot::Shared(instance));
    }

    pub(crate) fn insert_injector(&self, descriptor: Descriptor, handle: WeakInjector, as_ref: bool) {
        self.frame.cache.lock().map.insert(descriptor, Slot::Injector { handle, as_ref });
    }

    pub(crate) fn push_pending(&self, resource: PendingResource, root: bool) {
        self.target(root).cache.lock().pending.push(resource);
    }

    /// Pending resources of the current frame, in the order they were opened.
    #[must_use]
    pub(crate) fn take_pending(&self) -> Vec<PendingResource> {
        mem::take(&mut self.frame.cache.lock().pending)
    }

    #[must_use]
    pub(crate) fn pending_len(&self) -> usize {
        self.frame.cache.lock().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::InstancePool;
    use crate::{any::Instance, descriptor::Descriptor};

    #[test]
    fn test_lookup_walks_to_root() {
        let root = InstancePool::new();
        let child = root.child();
        let grandchild = child.child();

        root.insert(Descriptor::of::<u8>(), Arc::new(1_u8), true);
        child.insert(Descriptor::of::<u16>(), Arc::new(2_u16), false);

        assert!(grandchild.contains(&Descriptor::of::<u8>()));
        assert!(grandchild.contains(&Descriptor::of::<u16>()));
        assert!(!root.contains(&Descriptor::of::<u16>()));
        assert!(root.is_root());
        assert!(!grandchild.is_root());
    }

    #[test]
    fn test_root_insert_from_child() {
        let root = InstancePool::new();
        let child = root.child();

        let instance: Instance = Arc::new(1_u8);
        child.insert(Descriptor::of::<u8>(), instance.clone(), true);

        let found = root.get(&Descriptor::of::<u8>()).unwrap();
        assert!(Arc::ptr_eq(&found, &instance));
    }

    #[test]
    fn test_child_shadows_parent() {
        let root = InstancePool::new();
        let child = root.child();

        root.insert(Descriptor::of::<u8>(), Arc::new(1_u8), true);
        child.insert(Descriptor::of::<u8>(), Arc::new(2_u8), false);

        assert_eq!(*child.get(&Descriptor::of::<u8>()).unwrap().downcast::<u8>().unwrap(), 2);
        assert_eq!(*root.get(&Descriptor::of::<u8>()).unwrap().downcast::<u8>().unwrap(), 1);
    }
}
