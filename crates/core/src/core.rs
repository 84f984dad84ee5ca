// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The framework core: module list, registry, properties and packet pool.
//!
//! [`Core`] is a cheap cloneable handle. Streams, modules and nodes all hold
//! clones of the same core, which is how ids registered by one module become
//! visible to the others.

use crate::error::{Result, TuneKitError};
use crate::key_manager::{KeyManager, KeyManagerHandle, KEY_MANAGER_PROPERTY};
use crate::media::MediaType;
use crate::module::{MediaNodeConstructor, Module, ModuleInfo};
use crate::node::MediaNode;
use crate::packet::MediaPacket;
use crate::packet_pool::PacketPool;
use crate::properties::{Properties, PropertyValue};
use crate::registry::Registry;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;

struct CoreInner {
    modules: RwLock<Vec<Arc<dyn Module>>>,
    registry: Mutex<Registry>,
    properties: Properties,
    packet_pool: PacketPool,
}

#[derive(Clone)]
pub struct Core {
    inner: Arc<CoreInner>,
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.inner.modules.read().iter().map(|m| m.name()).collect();
        f.debug_struct("Core").field("modules", &names).finish_non_exhaustive()
    }
}

impl Core {
    pub fn new() -> Self {
        Self::with_packet_pool(PacketPool::default())
    }

    pub fn with_packet_pool(packet_pool: PacketPool) -> Self {
        Self {
            inner: Arc::new(CoreInner {
                modules: RwLock::new(Vec::new()),
                registry: Mutex::new(Registry::new()),
                properties: Properties::new(),
                packet_pool,
            }),
        }
    }

    /// Adds `module` to the end of the probe order and attaches it.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` if a module with the same name is registered, or
    /// whatever `attach` returns. A failed attach leaves the module list unchanged.
    pub fn register_module(&self, module: Arc<dyn Module>) -> Result<()> {
        let name = module.name();
        {
            let mut modules = self.inner.modules.write();
            if modules.iter().any(|m| m.name() == name) {
                return Err(TuneKitError::InvalidParameters(format!(
                    "module '{name}' is already registered"
                )));
            }
            modules.push(Arc::clone(&module));
        }

        // attach may call back into the core, so no lock is held here
        if let Err(e) = module.attach(self) {
            tracing::warn!(module = %name, error = %e, "module attach failed, unregistering");
            self.inner.modules.write().retain(|m| !Arc::ptr_eq(m, &module));
            return Err(e);
        }
        tracing::debug!(module = %name, "module registered");
        Ok(())
    }

    /// # Errors
    ///
    /// `NoSuchName` if no module has that name.
    pub fn unregister_module(&self, name: &str) -> Result<()> {
        let mut modules = self.inner.modules.write();
        let index = modules
            .iter()
            .position(|m| m.name() == name)
            .ok_or_else(|| TuneKitError::NoSuchName(name.to_string()))?;
        modules.remove(index);
        tracing::debug!(module = %name, "module unregistered");
        Ok(())
    }

    /// Registered modules in probe order.
    pub fn modules(&self) -> Vec<ModuleInfo> {
        self.inner.modules.read().iter().map(|m| m.info()).collect()
    }

    pub fn module_by_name(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.inner.modules.read().iter().find(|m| m.name() == name).cloned()
    }

    /// Creates a node from the module that best matches `constructor`.
    ///
    /// Every module is probed in registration order. The strictly highest
    /// score wins, so on a tie the first registered module is kept.
    ///
    /// # Errors
    ///
    /// `NoMatchingModule` if no module accepts the constructor, or the
    /// winner's `create_instance` error.
    pub fn create_compatible_node(
        &self,
        constructor: &MediaNodeConstructor,
    ) -> Result<Box<dyn MediaNode>> {
        let modules: Vec<Arc<dyn Module>> = self.inner.modules.read().clone();

        let mut best: Option<(u8, &Arc<dyn Module>)> = None;
        for module in &modules {
            match module.probe(self, constructor) {
                Ok(score) => {
                    tracing::trace!(module = %module.name(), score, "probe matched");
                    if best.is_none_or(|(best_score, _)| score > best_score) {
                        best = Some((score, module));
                    }
                },
                Err(e) => {
                    tracing::trace!(module = %module.name(), reason = %e, "probe rejected");
                },
            }
        }

        let Some((score, module)) = best else {
            tracing::debug!(
                name = ?constructor.name,
                input = %constructor.spec.input.protocol,
                output = %constructor.spec.output.protocol,
                "no module matches constructor"
            );
            return Err(TuneKitError::NoMatchingModule);
        };
        tracing::debug!(module = %module.name(), score, name = ?constructor.name, "creating node");
        module.create_instance(self, constructor)
    }

    /// Exclusive access to the registry. Do not hold the guard across calls into modules.
    pub fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock()
    }

    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    pub fn packet_pool(&self) -> &PacketPool {
        &self.inner.packet_pool
    }

    /// A packet with room for `size` payload bytes and an empty payload.
    pub fn create_media_packet(&self, size: usize, media_type: MediaType) -> MediaPacket {
        MediaPacket::new(self.inner.packet_pool.get(size), media_type)
    }

    /// Publishes `manager` as this core's key manager.
    pub fn set_key_manager(&self, manager: Arc<dyn KeyManager>) {
        self.inner
            .properties
            .set(KEY_MANAGER_PROPERTY, PropertyValue::Opaque(Arc::new(KeyManagerHandle(manager))));
    }

    pub fn key_manager(&self) -> Option<Arc<dyn KeyManager>> {
        self.inner
            .properties
            .get_opaque::<KeyManagerHandle>(KEY_MANAGER_PROPERTY)
            .map(|handle| Arc::clone(&handle.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_manager::StaticKeyManager;
    use crate::module::{ModuleId, ProbeMatch};
    use crate::node::MediaNodeInfo;
    use crate::port::{MediaPort, MediaPortInterfaceSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScoredNode(&'static str);

    impl MediaNode for ScoredNode {
        fn info(&self) -> MediaNodeInfo {
            MediaNodeInfo { module: self.0.to_string(), name: None }
        }

        fn ports(&self) -> Vec<MediaPort> {
            Vec::new()
        }
    }

    struct Scored {
        name: &'static str,
        score: Option<u8>,
        fail_attach: bool,
        created: AtomicUsize,
    }

    impl Scored {
        fn new(name: &'static str, score: Option<u8>) -> Arc<Self> {
            Arc::new(Self { name, score, fail_attach: false, created: AtomicUsize::new(0) })
        }
    }

    impl Module for Scored {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new(self.name, ModuleId::from_tag(self.name))
        }

        fn attach(&self, core: &Core) -> Result<()> {
            if self.fail_attach {
                return Err(TuneKitError::Failure("attach refused".into()));
            }
            core.registry().register_media_type("audio/x-test")?;
            Ok(())
        }

        fn probe(&self, _core: &Core, _constructor: &MediaNodeConstructor) -> Result<u8> {
            self.score.ok_or(TuneKitError::NotSupported)
        }

        fn create_instance(
            &self,
            _core: &Core,
            _constructor: &MediaNodeConstructor,
        ) -> Result<Box<dyn MediaNode>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScoredNode(self.name)))
        }
    }

    fn any_ctor() -> MediaNodeConstructor {
        MediaNodeConstructor::new(
            None,
            MediaPortInterfaceSpec::any(),
            MediaPortInterfaceSpec::any(),
        )
    }

    #[test]
    fn test_highest_score_wins() {
        let core = Core::new();
        let low = Scored::new("Low", Some(64));
        let high = Scored::new("High", Some(192));
        core.register_module(low.clone()).unwrap();
        core.register_module(high.clone()).unwrap();
        core.register_module(Scored::new("Refuses", None)).unwrap();

        let node = core.create_compatible_node(&any_ctor()).unwrap();
        assert_eq!(node.info().module, "High");
        assert_eq!(low.created.load(Ordering::SeqCst), 0);
        assert_eq!(high.created.load(Ordering::SeqCst), 1);
    }

    /// Only answers constructors that name it.
    struct Named;

    impl Module for Named {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new("Foo", ModuleId::from_tag("foo"))
        }

        fn probe(&self, _core: &Core, constructor: &MediaNodeConstructor) -> Result<u8> {
            match constructor.name() {
                Some("Foo") => Ok(ProbeMatch::EXACT),
                _ => Err(TuneKitError::NotSupported),
            }
        }

        fn create_instance(
            &self,
            _core: &Core,
            _constructor: &MediaNodeConstructor,
        ) -> Result<Box<dyn MediaNode>> {
            Ok(Box::new(ScoredNode("Foo")))
        }
    }

    #[test]
    fn test_name_beats_score() {
        let core = Core::new();
        core.register_module(Arc::new(Named)).unwrap();
        core.register_module(Scored::new("Generic", Some(200))).unwrap();

        let named = MediaNodeConstructor::new(
            Some("Foo"),
            MediaPortInterfaceSpec::any(),
            MediaPortInterfaceSpec::any(),
        );
        assert_eq!(core.create_compatible_node(&named).unwrap().info().module, "Foo");
        assert_eq!(core.create_compatible_node(&any_ctor()).unwrap().info().module, "Generic");
    }

    #[test]
    fn test_tie_keeps_first_registered() {
        let core = Core::new();
        core.register_module(Scored::new("First", Some(0))).unwrap();
        core.register_module(Scored::new("Second", Some(0))).unwrap();
        assert_eq!(core.create_compatible_node(&any_ctor()).unwrap().info().module, "First");
    }

    #[test]
    fn test_no_match() {
        let core = Core::new();
        assert!(matches!(
            core.create_compatible_node(&any_ctor()),
            Err(TuneKitError::NoMatchingModule)
        ));
        core.register_module(Scored::new("Refuses", None)).unwrap();
        assert!(matches!(
            core.create_compatible_node(&any_ctor()),
            Err(TuneKitError::NoMatchingModule)
        ));
    }

    #[test]
    fn test_register_attach_and_rollback() {
        let core = Core::new();
        core.register_module(Scored::new("A", Some(1))).unwrap();
        let category = crate::registry::RegistryCategory::MediaTypeIds;
        assert!(core.registry().id_for_name(&category, "audio/x-test").is_ok());
        assert!(matches!(
            core.register_module(Scored::new("A", Some(1))),
            Err(TuneKitError::InvalidParameters(_))
        ));

        let broken = Arc::new(Scored {
            name: "Broken",
            score: Some(255),
            fail_attach: true,
            created: AtomicUsize::new(0),
        });
        assert!(core.register_module(broken).is_err());
        assert_eq!(core.modules().len(), 1);
        assert!(core.module_by_name("Broken").is_none());

        core.unregister_module("A").unwrap();
        assert!(core.modules().is_empty());
        assert!(matches!(core.unregister_module("A"), Err(TuneKitError::NoSuchName(_))));
    }

    #[test]
    fn test_key_manager_property() {
        let core = Core::new();
        assert!(core.key_manager().is_none());
        core.set_key_manager(Arc::new(StaticKeyManager::new().with_key("k", vec![1, 2])));
        let mut key = [0u8; 4];
        assert_eq!(core.key_manager().unwrap().key_by_name("k", &mut key).unwrap(), 2);
    }

    #[test]
    fn test_create_media_packet_uses_pool() {
        let core = Core::new();
        let packet = core.create_media_packet(2048, MediaType::unknown());
        assert_eq!(packet.payload_size(), 0);
        assert!(packet.capacity() >= 2048);
        assert_eq!(core.packet_pool().stats().outstanding, 1);
        drop(packet);
        assert_eq!(core.packet_pool().stats().outstanding, 0);
    }
}
